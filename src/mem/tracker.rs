use crate::OError;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// hierarchical byte accountant. a tracker charges itself and every
// ancestor; a node with limit < 0 never rejects. the tree is the one
// object shared with the outside world, so it is atomics all the way.
pub struct MemTracker {
    label: String,
    limit: i64,
    consumption: AtomicI64,
    parent: Option<Arc<MemTracker>>,
}

impl MemTracker {
    pub fn root(limit: i64, label: &str) -> Arc<MemTracker> {
        Arc::new(MemTracker {
            label: label.to_string(),
            limit,
            consumption: AtomicI64::new(0),
            parent: None,
        })
    }

    pub fn child_of(parent: &Arc<MemTracker>, limit: i64, label: &str) -> Arc<MemTracker> {
        Arc::new(MemTracker {
            label: label.to_string(),
            limit,
            consumption: AtomicI64::new(0),
            parent: Some(parent.clone()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn consumption(&self) -> i64 {
        self.consumption.load(Ordering::Relaxed)
    }

    fn over_limit(&self) -> bool {
        self.limit >= 0 && self.consumption() > self.limit
    }

    // charge the whole ancestor chain, undoing everything if any node
    // ends up over its limit
    pub fn try_consume(&self, bytes: i64) -> Result<(), OError> {
        if bytes <= 0 {
            return Ok(());
        }
        let mut charged: Vec<&MemTracker> = vec![];
        let mut cur = Some(self);
        while let Some(t) = cur {
            t.consumption.fetch_add(bytes, Ordering::Relaxed);
            charged.push(t);
            if t.over_limit() {
                let msg = format!(
                    "mem limit exceeded on tracker '{}': limit={} consumed={} request={}",
                    t.label,
                    t.limit,
                    t.consumption(),
                    bytes
                );
                for c in charged {
                    c.consumption.fetch_sub(bytes, Ordering::Relaxed);
                }
                return Err(OError::MemLimitExceeded(msg));
            }
            cur = t.parent.as_deref();
        }
        Ok(())
    }

    // unchecked variant, for callers that already hold a reservation
    pub fn consume(&self, bytes: i64) {
        let mut cur = Some(self);
        while let Some(t) = cur {
            t.consumption.fetch_add(bytes, Ordering::Relaxed);
            cur = t.parent.as_deref();
        }
    }

    pub fn release(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut cur = Some(self);
        while let Some(t) = cur {
            t.consumption.fetch_sub(bytes, Ordering::Relaxed);
            cur = t.parent.as_deref();
        }
    }
}
