// Token refresh coordination
// At most one refresh runs at a time; every 401 that lands meanwhile waits on it

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use super::token::{redact, TokenStore};

/// Why a refresh could not produce a new access token
///
/// Cloneable so the same outcome can be handed to every queued request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("refresh rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh endpoint returned no access token")]
    MissingToken,

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("refresh task ended before settling")]
    Abandoned,

    #[error("signed out while the token was being refreshed")]
    SignedOut,
}

impl From<reqwest::Error> for RefreshError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RefreshError::InvalidResponse(e.to_string())
        } else {
            RefreshError::Network(e.to_string())
        }
    }
}

pub type RefreshOutcome = Result<String, RefreshError>;

/// Observable coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

type Waiter = oneshot::Sender<RefreshOutcome>;

enum Phase {
    Idle,
    Refreshing(Vec<Waiter>),
}

/// Last refresh that failed, keyed by the token it tried to replace
struct FailedRefresh {
    replaced: String,
    error: RefreshError,
}

struct Shared {
    phase: Phase,
    last_failure: Option<FailedRefresh>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-flight refresh coordinator
///
/// The first request to see a 401 starts the refresh; later ones queue up
/// behind it. The refresh runs on its own task, so a caller giving up does
/// not cancel it or strand the queue. When it settles the token store is
/// updated first, then every waiter gets the same outcome exactly once.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Mutex<Shared>>,
    tokens: TokenStore,
    started: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(tokens: TokenStore) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                phase: Phase::Idle,
                last_failure: None,
            })),
            tokens,
            started: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> RefreshState {
        match lock(&self.shared).phase {
            Phase::Idle => RefreshState::Idle,
            Phase::Refreshing(_) => RefreshState::Refreshing,
        }
    }

    /// Number of callers waiting on the in-flight refresh (leader included)
    pub fn waiting(&self) -> usize {
        match &lock(&self.shared).phase {
            Phase::Idle => 0,
            Phase::Refreshing(waiters) => waiters.len(),
        }
    }

    /// Total refresh calls started since creation
    pub fn refresh_count(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Get a token to replay a request that was rejected with 401
    ///
    /// `sent_with` is the token the rejected request carried. If the store
    /// already holds a different token the request is stale and is replayed
    /// with it directly. If the refresh that replaced `sent_with` already
    /// failed, its error is returned without another attempt. Otherwise the
    /// caller joins the in-flight refresh, or starts one with `refresh`.
    pub async fn recover<F, Fut>(&self, sent_with: Option<&str>, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let generation = {
            let mut guard = lock(&self.shared);
            let shared = &mut *guard;

            if let Phase::Refreshing(waiters) = &mut shared.phase {
                waiters.push(tx);
                tracing::debug!(queued = waiters.len(), "Refresh already in flight, queueing request");
                None
            } else {
                if let Some(current) = self.tokens.get() {
                    if sent_with != Some(current.as_str()) {
                        tracing::debug!("Access token rotated while request was in flight, replaying");
                        return Ok(current);
                    }
                }

                if let (Some(sent), Some(failed)) = (sent_with, &shared.last_failure) {
                    if failed.replaced == sent {
                        tracing::debug!("Refresh for this token already failed, rejecting");
                        return Err(failed.error.clone());
                    }
                }

                shared.phase = Phase::Refreshing(vec![tx]);
                Some(self.tokens.generation())
            }
        };

        if let Some(generation) = generation {
            self.started.fetch_add(1, Ordering::Relaxed);
            tracing::info!("Access token rejected, refreshing");

            let settle = Settle {
                shared: Arc::clone(&self.shared),
                tokens: self.tokens.clone(),
                generation,
                replaced: sent_with.map(str::to_string),
                done: false,
            };
            let pending = refresh();

            tokio::spawn(async move {
                let outcome = pending.await;
                settle.finish(outcome);
            });
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}

/// Settles the in-flight refresh; drains the queue even if the task dies
struct Settle {
    shared: Arc<Mutex<Shared>>,
    tokens: TokenStore,
    generation: u64,
    replaced: Option<String>,
    done: bool,
}

impl Settle {
    fn finish(mut self, outcome: RefreshOutcome) {
        match &outcome {
            Ok(token) => tracing::info!(token = %redact(token), "Access token refreshed"),
            Err(e) => tracing::warn!(error = %e, "Token refresh failed, clearing access token"),
        }

        let token = outcome.as_ref().ok().cloned();
        let outcome = if self.tokens.set_if_unchanged(self.generation, token) {
            outcome
        } else {
            // Queued requests follow the login or logout that landed meanwhile
            tracing::debug!("Access token was set during refresh, keeping the newer value");
            self.tokens.get().ok_or(RefreshError::SignedOut)
        };

        let waiters = self.drain(outcome.as_ref().err().cloned());
        self.done = true;

        tracing::debug!(waiters = waiters.len(), "Releasing queued requests");
        for waiter in waiters {
            // A waiter whose caller went away has nothing to deliver to
            let _ = waiter.send(outcome.clone());
        }
    }

    fn drain(&self, failure: Option<RefreshError>) -> Vec<Waiter> {
        let mut shared = lock(&self.shared);

        shared.last_failure = match (failure, &self.replaced) {
            (Some(error), Some(replaced)) => Some(FailedRefresh {
                replaced: replaced.clone(),
                error,
            }),
            _ => None,
        };

        match std::mem::replace(&mut shared.phase, Phase::Idle) {
            Phase::Refreshing(waiters) => waiters,
            Phase::Idle => Vec::new(),
        }
    }
}

impl Drop for Settle {
    fn drop(&mut self) {
        if !self.done {
            tracing::error!("Token refresh task ended without settling");
            // Dropping the senders wakes every waiter with Abandoned
            drop(self.drain(None));
        }
    }
}
