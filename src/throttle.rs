use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Global request pacer: successive `acquire` calls return at least `spacing` apart,
/// no matter how many tasks share the handle.
#[derive(Clone, Debug)]
pub struct Throttle {
    spacing: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn acquire(&self) {
        // Holding the lock across the sleep serializes waiters in arrival order.
        let mut slot = self.next_slot.lock().await;
        let now = Instant::now();
        if let Some(at) = *slot {
            if at > now {
                tokio::time::sleep_until(at).await;
            }
        }
        *slot = Some(Instant::now() + self.spacing);
    }
}
