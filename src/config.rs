use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};

use crate::http_client::DEFAULT_REQUEST_TIMEOUT_MS;

/// Public site that serves short links
pub const DEFAULT_FRONTEND_URL: &str = "https://turbolink.superstuff.online";

/// TurboLink command-line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL (the `/api` prefix is added automatically)
    #[arg(short = 'b', long, env = "TURBOLINK_BACKEND_URL")]
    pub backend_url: String,

    /// Frontend URL used to display short links
    #[arg(long, env = "TURBOLINK_FRONTEND_URL", default_value = DEFAULT_FRONTEND_URL)]
    pub frontend_url: String,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "TURBOLINK_REQUEST_TIMEOUT_MS", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Account email used to log in
    #[arg(short, long, env = "TURBOLINK_EMAIL")]
    pub email: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Shorten a URL
    Shorten { url: String },

    /// List your links
    Links,

    /// Show one link
    Show { alias: String },

    /// Edit a link
    Update {
        alias: String,

        /// New destination URL
        #[arg(long)]
        url: Option<String>,

        /// New short alias
        #[arg(long)]
        new_alias: Option<String>,

        /// Protect the link with this password
        #[arg(long, conflicts_with = "remove_password")]
        password: Option<String>,

        /// Remove password protection
        #[arg(long)]
        remove_password: bool,

        #[arg(long)]
        max_clicks: Option<u64>,

        /// Expiry as RFC 3339, e.g. 2025-01-31T00:00:00Z
        #[arg(long, value_parser = parse_expiry)]
        expires_at: Option<DateTime<Utc>>,
    },

    /// Delete a link
    Delete { alias: String },

    /// Re-activate a link
    Enable { alias: String },

    /// Deactivate a link without deleting it
    Disable { alias: String },

    /// Show click analytics for a link
    Analytics { alias: String },

    /// Resolve a short link the way a visitor would
    Resolve {
        alias: String,

        /// Password for protected links
        #[arg(long)]
        password: Option<String>,

        /// Referrer to record with the click
        #[arg(long)]
        referrer: Option<String>,
    },

    /// Show the logged-in account
    Profile,

    /// Change your avatar
    Avatar {
        /// Image file to upload (5 MB max), or an http(s) URL
        source: String,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        username: String,
    },

    /// Request a password reset mail
    ForgotPassword { email: String },

    /// Set a new password with the token from the reset mail
    ResetPassword { token: String },

    /// Confirm an email address
    VerifyEmail { token: Option<String> },
}

impl Command {
    /// Whether the command needs a logged-in session
    pub fn requires_login(&self) -> bool {
        !matches!(
            self,
            Command::Resolve { .. }
                | Command::Signup { .. }
                | Command::ForgotPassword { .. }
                | Command::ResetPassword { .. }
                | Command::VerifyEmail { .. }
        )
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Endpoints
    pub backend_url: String,
    pub frontend_url: String,

    // HTTP client
    pub request_timeout_ms: u64,

    // Logging
    pub log_level: String,

    // Credentials
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<(Self, Command)> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args), command))
    }

    pub fn from_args(args: CliArgs) -> Self {
        Config {
            backend_url: args.backend_url.trim().trim_end_matches('/').to_string(),
            frontend_url: args.frontend_url.trim().trim_end_matches('/').to_string(),
            request_timeout_ms: args.timeout_ms,
            log_level: args.log_level,
            email: args.email.filter(|e| !e.trim().is_empty()),
            // Env only, never a flag
            password: std::env::var("TURBOLINK_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        check_http_url("TURBOLINK_BACKEND_URL", &self.backend_url)?;
        check_http_url("TURBOLINK_FRONTEND_URL", &self.frontend_url)?;

        if self.request_timeout_ms == 0 {
            anyhow::bail!("TURBOLINK_REQUEST_TIMEOUT_MS must be greater than zero");
        }

        Ok(())
    }

    /// Public URL of a short link
    pub fn short_link(&self, alias: &str) -> String {
        format!("{}/{}", self.frontend_url, alias)
    }
}

fn check_http_url(name: &str, value: &str) -> Result<()> {
    let url = reqwest::Url::parse(value)
        .with_context(|| format!("{} is not a valid URL: {}", name, value))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("{} must use http or https, got {}", name, other),
    }
}

/// Parse an RFC 3339 timestamp from the command line
fn parse_expiry(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 timestamp: {}", e))
}

// === Interactive prompts ===

/// Email and password, prompting for whatever the configuration lacks
pub fn prompt_credentials(config: &Config) -> Result<(String, String)> {
    let email = match &config.email {
        Some(email) => email.clone(),
        None => Input::new()
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };

    let password = match &config.password {
        Some(password) => password.clone(),
        None => prompt_password("Password")?,
    };

    if email.trim().is_empty() || password.is_empty() {
        anyhow::bail!("Email and password are required");
    }

    Ok((email.trim().to_string(), password))
}

pub fn prompt_password(prompt: &str) -> Result<String> {
    Password::new()
        .with_prompt(prompt)
        .interact()
        .with_context(|| format!("Failed to read {}", prompt.to_lowercase()))
}

/// New password typed twice; the match is checked by the reset call
pub fn prompt_new_password() -> Result<(String, String)> {
    let password = prompt_password("New password")?;
    let confirmation = prompt_password("Confirm new password")?;
    Ok((password, confirmation))
}

pub fn prompt_device_code() -> Result<String> {
    println!("A verification code was sent to your email to confirm this device.");
    let code: String = Input::new()
        .with_prompt("Verification code")
        .interact_text()
        .context("Failed to read verification code")?;
    Ok(code.trim().to_string())
}
