// TurboLink client - Library root

pub mod account;
pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod links;
pub mod models;
pub mod redirect;
