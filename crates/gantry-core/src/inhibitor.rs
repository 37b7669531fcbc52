use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;

use crate::observability::EventLog;
use crate::ports::DisplayInhibitor;

/// Reference-counted display-sleep inhibition shared by every running title.
/// The first lease inhibits, the last one released lifts it.
pub struct SharedInhibitor {
    port: Arc<dyn DisplayInhibitor>,
    holders: Mutex<usize>,
}

/// Held while a title is running. Releases on drop.
pub struct InhibitorLease<'a> {
    owner: &'a SharedInhibitor,
    counted: bool,
}

impl SharedInhibitor {
    pub fn new(port: Arc<dyn DisplayInhibitor>) -> Self {
        Self {
            port,
            holders: Mutex::new(0),
        }
    }

    pub fn acquire(&self, log: &EventLog) -> InhibitorLease<'_> {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);

        if *holders == 0 {
            if let Err(reason) = self.port.inhibit() {
                log.warn(
                    "inhibitor",
                    "GT-IN-020",
                    "display_inhibit_failed",
                    json!({ "reason": reason }),
                );
                return InhibitorLease {
                    owner: self,
                    counted: false,
                };
            }
            log.info("inhibitor", "GT-IN-010", "display_inhibited", json!({}));
        }

        *holders += 1;
        InhibitorLease {
            owner: self,
            counted: true,
        }
    }

    pub fn holders(&self) -> usize {
        *self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            self.port.uninhibit();
        }
    }
}

impl Drop for InhibitorLease<'_> {
    fn drop(&mut self) {
        if self.counted {
            self.owner.release();
        }
    }
}

/// Inhibitor for hosts without a sleep-inhibit facility.
pub struct NoopInhibitor;

impl DisplayInhibitor for NoopInhibitor {
    fn inhibit(&self) -> Result<(), String> {
        Ok(())
    }

    fn uninhibit(&self) {}
}
