use std::sync::Arc;

use tokio::sync::watch;

/// Number of queued-or-running book analyses, observable through [`ProcessingCounter::subscribe`].
///
/// Clones share the same count.
#[derive(Debug, Clone)]
pub struct ProcessingCounter {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for ProcessingCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0usize);
        Self { tx: Arc::new(tx) }
    }

    pub fn add(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.tx.send_modify(|count| *count = count.saturating_add(n));
    }

    /// 1件完了ごとに減らす（0未満にはならない）
    pub fn complete_one(&self) {
        self.release(1);
    }

    pub(crate) fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.tx.send_modify(|count| *count = count.saturating_sub(n));
    }

    pub fn current(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    /// Resolves once the count is zero. Returns immediately when nothing is queued.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
