use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use parley_protocol::ChatMessage;

/// Bounded log of recent chat messages, oldest first.
///
/// Kept for diagnostics and tests; clients never receive a replay.
#[derive(Debug)]
pub struct MessageHistory {
    messages: Mutex<VecDeque<ChatMessage>>,
    capacity: usize,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn messages(&self) -> MutexGuard<'_, VecDeque<ChatMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `message`, returning the entry evicted to stay within capacity.
    pub fn append(&self, message: ChatMessage) -> Option<ChatMessage> {
        let mut messages = self.messages();
        messages.push_back(message);
        if messages.len() > self.capacity {
            messages.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages().iter().cloned().collect()
    }
}
