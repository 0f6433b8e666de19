//! Per-record enhancement lock
//!
//! A record may have at most one active (queued or processing) queue item.
//! The lock table is plain data; the queue manager keeps it behind the same
//! mutex as the queue itself so acquire/release are atomic with enqueue.

use crate::modules::enhancement::domain::{LockDecision, QueueItemId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub item_id: QueueItemId,
    pub user_id: String,
}

#[derive(Debug, Default)]
pub struct EnhancementLock {
    holders: HashMap<String, LockHolder>,
}

impl EnhancementLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decision for `record_id` without taking the lock
    pub fn check(&self, record_id: &str) -> LockDecision {
        match self.holders.get(record_id) {
            Some(holder) => LockDecision::Blocked {
                held_by_user_id: holder.user_id.clone(),
                item_id: holder.item_id,
            },
            None => LockDecision::Granted,
        }
    }

    /// Take the lock for `item_id` if nobody holds it
    pub fn try_acquire(
        &mut self,
        record_id: &str,
        user_id: &str,
        item_id: QueueItemId,
    ) -> LockDecision {
        match self.check(record_id) {
            LockDecision::Granted => {
                self.holders.insert(
                    record_id.to_string(),
                    LockHolder {
                        item_id,
                        user_id: user_id.to_string(),
                    },
                );
                LockDecision::Granted
            }
            blocked => blocked,
        }
    }

    /// Release the lock held by `item_id`. Idempotent; a lock taken over by
    /// a different item is left alone.
    pub fn release(&mut self, record_id: &str, item_id: QueueItemId) -> bool {
        match self.holders.get(record_id) {
            Some(holder) if holder.item_id == item_id => {
                self.holders.remove(record_id);
                true
            }
            _ => false,
        }
    }

    pub fn holder(&self, record_id: &str) -> Option<&LockHolder> {
        self.holders.get(record_id)
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
