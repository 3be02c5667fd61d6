use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// Unbounded FIFO shared by a pool of consumer tasks.
///
/// Each item is handed to exactly one consumer; `pop` parks the caller
/// while the queue is empty.
#[derive(Debug)]
pub struct WorkQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn push(&self, item: T) {
        // The receiver is owned by `self`, so the channel stays open.
        if self.tx.send(item).is_err() {
            tracing::error!("Work queue closed, item dropped");
        }
    }

    pub async fn pop(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking pop, used by tests and diagnostics.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn fifo_order_single_consumer() {
        let queue = WorkQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        for i in 0..5 {
            assert_eq!(queue.pop().await, Some(i));
        }
        assert_eq!(queue.try_pop(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_consumed_once() {
        let queue = WorkQueue::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        for _ in 0..4 {
            let queue = queue.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                while let Some(item) = queue.pop().await {
                    let _ = done_tx.send(item);
                }
            });
        }
        for i in 0..200u32 {
            queue.push(i);
        }

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let item = done_rx.recv().await.unwrap();
            assert!(seen.insert(item), "item {} consumed twice", item);
        }
        assert_eq!(seen.len(), 200);
    }
}
