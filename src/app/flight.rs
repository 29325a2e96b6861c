use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// At most one holder per key. Acquisition never blocks.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<Mutex<HashSet<i64>>>,
}

impl SingleFlight {
    pub fn try_acquire(&self, key: i64) -> Option<FlightGuard> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(key) {
            return None;
        }

        Some(FlightGuard {
            key,
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self, key: i64) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }
}

#[derive(Debug)]
pub struct FlightGuard {
    key: i64,
    running: Arc<Mutex<HashSet<i64>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
