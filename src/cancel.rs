//! Tag-keyed store of cancellation tokens.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// Thread-safe `tag -> CancellationToken` map.
///
/// Lets a control loop be told to stop without the caller holding the loop's
/// own token.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `token` under `tag`, cancelling any token it displaces.
    pub fn set(&self, tag: impl Into<String>, token: CancellationToken) {
        let displaced = self.lock().insert(tag.into(), token);
        if let Some(old) = displaced {
            old.cancel();
        }
    }

    /// Get the token stored under `tag`.
    pub fn get(&self, tag: &str) -> Option<CancellationToken> {
        self.lock().get(tag).cloned()
    }

    /// Check whether `tag` has a token.
    pub fn exists(&self, tag: &str) -> bool {
        self.lock().contains_key(tag)
    }

    /// Remove the entry without cancelling it.
    pub fn delete(&self, tag: &str) {
        self.lock().remove(tag);
    }

    /// Cancel and remove one entry. Returns whether an entry existed.
    pub fn cancel(&self, tag: &str) -> bool {
        let token = self.lock().remove(tag);
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of stored tokens.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancel every held token, then clear the registry.
    pub fn destroy(&self) {
        let drained: Vec<CancellationToken> = self.lock().drain().map(|(_, t)| t).collect();
        for token in drained {
            token.cancel();
        }
    }
}
