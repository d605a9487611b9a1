//! Order-preserving chunking of ID sequences.
//!
//! Every batching stage of the requester goes through [`chunked`]. Groups are
//! produced lazily in a single forward pass, so the source iterator is never
//! materialized as a whole.

use std::num::NonZeroUsize;

/// What to do with an empty trailing group.
///
/// An empty group appears when the input is empty or its length is an exact
/// multiple of the chunk size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailPolicy {
    /// Never emit an empty group. Empty input yields no groups at all.
    #[default]
    Skip,
    /// Always finish with one group of size `< K`, even if it is empty.
    Emit,
}

/// Lazy chunking iterator returned by [`chunked`].
#[derive(Debug, Clone)]
pub struct Chunks<I> {
    iter: I,
    size: usize,
    tail: TailPolicy,
    done: bool,
}

/// Split `items` into consecutive groups of at most `size` items.
pub fn chunked<T>(items: T, size: NonZeroUsize) -> Chunks<T::IntoIter>
where
    T: IntoIterator,
{
    Chunks {
        iter: items.into_iter(),
        size: size.get(),
        tail: TailPolicy::default(),
        done: false,
    }
}

impl<I> Chunks<I> {
    /// Set the tail policy.
    pub fn with_tail(mut self, tail: TailPolicy) -> Self {
        self.tail = tail;
        self
    }
}

impl<I: Iterator> Iterator for Chunks<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let group: Vec<I::Item> = self.iter.by_ref().take(self.size).collect();

        if group.len() < self.size {
            // A short group means the source is exhausted.
            self.done = true;
            if group.is_empty() && self.tail == TailPolicy::Skip {
                return None;
            }
        }

        Some(group)
    }
}
