use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Blocking FIFO that hands ownership of one item at a time from a producer
/// thread to a consumer thread.
///
/// Cloning yields another handle to the same queue. Because every handle
/// owns both ends of the channel, the queue stays connected for as long as
/// any handle is alive, so `pop` only returns `None` after teardown.
///
/// The queue imposes no capacity limit; the orchestrator bounds the number
/// of frames in flight instead, which keeps sentinel pushes from ever
/// blocking during shutdown.
pub struct HandoffQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T: Send> HandoffQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Moves `item` into the queue and wakes one waiting consumer.
    pub fn push(&self, item: T) {
        // Cannot fail: this handle keeps a receiver alive.
        let _ = self.tx.send(item);
    }

    /// Blocks until an item is available and returns the oldest one.
    pub fn pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn try_pop(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    ///
    /// Only the control thread uses this; worker stages always block.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T: Send> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_single_thread() {
        let queue = HandoffQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_across_threads() {
        let queue = HandoffQueue::new();
        let producer = queue.clone();

        let handle = thread::spawn(move || {
            for item in ["A", "B", "C"] {
                producer.push(item.to_string());
            }
        });

        let received: Vec<String> = (0..3).filter_map(|_| queue.pop()).collect();
        handle.join().unwrap();
        assert_eq!(received, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_large_sequence_preserves_order() {
        let queue = HandoffQueue::new();
        let producer = queue.clone();
        let handle = thread::spawn(move || {
            for i in 0..10_000u32 {
                producer.push(i);
            }
        });

        for expected in 0..10_000u32 {
            assert_eq!(queue.pop(), Some(expected));
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue: HandoffQueue<u32> = HandoffQueue::new();
        let consumer = queue.clone();

        let handle = thread::spawn(move || consumer.pop());
        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        let start = Instant::now();
        queue.push(7);
        assert_eq!(handle.join().unwrap(), Some(7));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_try_pop_on_empty_returns_none() {
        let queue: HandoffQueue<u8> = HandoffQueue::new();
        assert_eq!(queue.try_pop(), None);
        queue.push(9);
        assert_eq!(queue.try_pop(), Some(9));
    }

    #[test]
    fn test_pop_timeout_expires() {
        let queue: HandoffQueue<u8> = HandoffQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_moved_item_is_not_duplicated() {
        let queue = HandoffQueue::new();
        queue.push(vec![1u8; 1024]);
        let buffer = queue.pop().unwrap();
        assert_eq!(buffer.len(), 1024);
        assert_eq!(queue.try_pop(), None);
    }
}
