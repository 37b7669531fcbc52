use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// Caller-chosen id to cancellation handle. Entries live from just before a
/// spawn until the process exits or is aborted.
#[derive(Default)]
pub struct AbortRegistry {
    entries: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

/// Token for one registration. Dropping it releases the id unless a newer
/// registration took it over.
pub struct AbortRegistration<'a> {
    registry: &'a AbortRegistry,
    id: String,
    generation: u64,
    token: CancellationToken,
}

impl AbortRegistration<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for AbortRegistration<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.id, self.generation);
    }
}

impl AbortRegistry {
    pub fn register(&self, id: &str) -> AbortRegistration<'_> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id.to_string(), (generation, token.clone()));
        }

        AbortRegistration {
            registry: self,
            id: id.to_string(),
            generation,
            token,
        }
    }

    /// Cancels the execution registered under `id`. Returns `false` when
    /// nothing is registered, including a second call for the same id.
    pub fn abort(&self, id: &str) -> bool {
        let entry = match self.entries.lock() {
            Ok(mut entries) => entries.remove(id),
            Err(_) => None,
        };

        match entry {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(id))
            .unwrap_or(false)
    }

    fn release(&self, id: &str, generation: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.get(id).is_some_and(|(current, _)| *current == generation) {
                entries.remove(id);
            }
        }
    }
}
