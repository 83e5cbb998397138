//! Bounded FIFO queue observers subscribe to. Producers push under the core
//! lock and never block; consumers wait on their own task and are woken by
//! `stop()` with a cancellation error.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue was stopped")]
    Stopped,
    #[error("queue is full")]
    Full,
}

struct QueueInner<T> {
    messages: VecDeque<T>,
    stopped: bool,
}

pub struct MessageQueue<T> {
    inner: Mutex<QueueInner<T>>,
    wakeup: Condvar,
    capacity: usize,
}

impl<T: Clone> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        MessageQueue {
            inner: Mutex::new(QueueInner {
                messages: VecDeque::new(),
                stopped: false,
            }),
            wakeup: Condvar::new(),
            capacity,
        }
    }

    /// Non-blocking append; refused once the queue is full or stopped.
    pub fn push(&self, message: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return Err(QueueError::Stopped);
        }
        if inner.messages.len() == self.capacity {
            return Err(QueueError::Full);
        }
        inner.messages.push_back(message);
        self.wakeup.notify_all();
        Ok(())
    }

    /// Blocks until a message is available, returning a copy of the front.
    pub fn front(&self) -> Result<T, QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(message) = inner.messages.front() {
                return Ok(message.clone());
            }
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            self.wakeup.wait(&mut inner);
        }
    }

    /// Blocks until a message is available and removes it.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(message) = inner.messages.pop_front() {
                return Ok(message);
            }
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            self.wakeup.wait(&mut inner);
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    /// Wakes every waiter with a cancellation error. Messages already queued
    /// stay readable through `try_pop`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        self.wakeup.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageQueue, QueueError};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_front_pop_in_order() {
        let queue = MessageQueue::new(8);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();

        assert_eq!(queue.front(), Ok(1));
        assert_eq!(queue.pop(), Ok(1));
        assert_eq!(queue.pop(), Ok(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let queue = MessageQueue::new(2);
        queue.push(1u32).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(QueueError::Full));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn stop_wakes_blocked_consumer() {
        let queue = Arc::new(MessageQueue::<u32>::new(4));
        let waiter = queue.clone();
        let handle = thread::spawn(move || waiter.front());

        thread::sleep(Duration::from_millis(50));
        queue.stop();
        assert_eq!(handle.join().unwrap(), Err(QueueError::Stopped));

        // pushes after stop are refused
        assert_eq!(queue.push(1), Err(QueueError::Stopped));
    }

    #[test]
    fn queued_messages_survive_stop() {
        let queue = MessageQueue::new(4);
        queue.push(9u32).unwrap();
        queue.stop();
        assert_eq!(queue.try_pop(), Some(9));
        assert_eq!(queue.try_pop(), None);
    }
}
