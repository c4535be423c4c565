// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded producer/consumer command queue

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel as chan;
use thiserror::Error;

/// Default number of buffered commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 9;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("command queue is closed")]
pub struct QueueClosed;

/// Fixed-capacity FIFO shared by one producer and many consumers.
///
/// `push` blocks while the queue is full and `pop` while it is empty. After
/// [`CommandQueue::close`], consumers drain what is left and then receive
/// `None`.
pub struct CommandQueue<T> {
    // Dropped on close; the channel disconnects once no push holds a clone
    sender: Mutex<Option<chan::Sender<T>>>,
    receiver: chan::Receiver<T>,
    capacity: usize,
}

impl<T> CommandQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = chan::bounded(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    fn sender(&self) -> MutexGuard<'_, Option<chan::Sender<T>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let sender = self.sender().clone().ok_or(QueueClosed)?;
        sender.send(item).map_err(|_| QueueClosed)
    }

    pub fn pop(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Refuse further pushes; consumers end once the queue is drained
    pub fn close(&self) {
        self.sender().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = CommandQueue::new(3);
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!((queue.pop(), queue.pop(), queue.pop()), (Some(0), Some(1), Some(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_blocks_while_full() {
        let queue = Arc::new(CommandQueue::new(1));
        queue.push(1).unwrap();

        let (tx, rx) = mpsc::channel();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.push(2).unwrap();
                tx.send(()).unwrap();
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(queue.pop(), Some(1));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_close_drains_then_ends() {
        let queue = Arc::new(CommandQueue::new(4));
        queue.push("a").unwrap();
        queue.close();
        assert_eq!(queue.push("b"), Err(QueueClosed));
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), None);

        let waiting = Arc::new(CommandQueue::<u8>::new(1));
        let consumer = {
            let waiting = Arc::clone(&waiting);
            thread::spawn(move || waiting.pop())
        };
        thread::sleep(Duration::from_millis(20));
        waiting.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_consumers_share_every_item_once() {
        let queue = Arc::new(CommandQueue::new(2));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.pop() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();
        for i in 0..50 {
            queue.push(i).unwrap();
        }
        queue.close();

        let mut all: Vec<i32> = consumers
            .into_iter()
            .flat_map(|consumer| consumer.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }
}
