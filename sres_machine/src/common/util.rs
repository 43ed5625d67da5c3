//! General utility functions and types.
use std::collections::vec_deque::Iter;
use std::collections::VecDeque;

/// Keeps the `N` most recently pushed items, newest first.
#[derive(Clone, Debug)]
pub struct RingBuffer<T, const N: usize> {
    pub stack: VecDeque<T>,
}

impl<T, const N: usize> RingBuffer<T, N> {
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.stack.len() == N
    }

    pub fn pop(&mut self) -> Option<T> {
        self.stack.pop_front()
    }

    pub fn push(&mut self, data: T) {
        self.stack.push_front(data);
        self.stack.truncate(N);
    }

    /// Iterates newest first.
    pub fn iter(&self) -> Iter<'_, T> {
        self.stack.iter()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Removes all items, returning them oldest first.
    pub fn drain_oldest_first(&mut self) -> impl Iterator<Item = T> + '_ {
        self.stack.drain(..).rev()
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self {
            stack: Default::default(),
        }
    }
}
