//! Bounded message store with oldest-first eviction

use std::collections::{HashMap, VecDeque};

use relay_core::{Message, Snowflake};

pub(crate) struct MessageStore {
    entries: HashMap<Snowflake, Message>,
    order: VecDeque<Snowflake>,
    capacity: usize,
}

impl MessageStore {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, id: &Snowflake) -> Option<&Message> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &Snowflake) -> Option<&mut Message> {
        self.entries.get_mut(id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert a new message, evicting the oldest ones past capacity
    ///
    /// Returns the number of evicted messages.
    pub(crate) fn insert(&mut self, message: Message) -> usize {
        let id = message.id;
        if self.entries.insert(id, message).is_none() {
            self.order.push_back(id);
        }

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    pub(crate) fn remove(&mut self, id: &Snowflake) -> Option<Message> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(removed)
    }

    /// Keep only messages matching the predicate
    pub(crate) fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Message) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|_, message| keep(message));
        let entries = &self.entries;
        self.order.retain(|id| entries.contains_key(id));
        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
