//! A minimal async equivalent of Go's `sync.WaitGroup`, used by [`crate::Logger`]
//! to track in-flight sends and running worker tasks so `close` can wait for
//! both to finish before tearing down the queue and bus connection.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::Notify;

pub struct WaitGroup {
    count: AtomicI64,
    notify: Notify,
}

impl WaitGroup {
    pub fn new() -> Self {
        WaitGroup {
            count: AtomicI64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn add(&self, n: i64) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn done(&self) {
        let prev = self.count.fetch_sub(1, Ordering::SeqCst);
        if prev - 1 <= 0 {
            self.notify.notify_waiters();
        }
    }

    /// Waits until the count reaches zero. Registers interest before
    /// re-checking the count so a `done()` that races with this call can't
    /// produce a missed wakeup.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) <= 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_returns_immediately_when_empty() {
        let wg = WaitGroup::new();
        wg.wait().await;
    }

    #[tokio::test]
    async fn wait_blocks_until_done_called() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(1);
        let waiter = {
            let wg = Arc::clone(&wg);
            tokio::spawn(async move {
                wg.wait().await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        wg.done();
        waiter.await.unwrap();
    }
}
