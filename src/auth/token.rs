// In-memory access token store
// The token never touches disk; it lives only as long as the process

use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct Slot {
    token: Option<String>,
    generation: u64,
}

/// Shared holder for the current access token
///
/// Every write bumps a generation counter so a refresh that started before
/// a login/logout can tell that its result is no longer wanted.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Slot>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token. Empty strings clear it.
    pub fn set(&self, token: Option<String>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.token = token.filter(|t| !t.is_empty());
        slot.generation += 1;
    }

    /// Replace the token only if nobody else wrote it since `generation`
    pub fn set_if_unchanged(&self, generation: u64, token: Option<String>) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            return false;
        }
        slot.token = token.filter(|t| !t.is_empty());
        slot.generation += 1;
        true
    }

    pub fn get(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .is_some()
    }

    /// `Authorization` header value for the current token
    pub fn bearer(&self) -> Option<String> {
        self.get().map(|t| format!("Bearer {}", t))
    }
}

/// Shorten a token for log output
pub(crate) fn redact(token: &str) -> String {
    format!("{}...", &token[..token.char_indices().nth(8).map_or(token.len(), |(i, _)| i)])
}
