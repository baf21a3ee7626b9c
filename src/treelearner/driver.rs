//! Expansion order of candidate nodes.
//!
//! Depth-wise growth resolves a whole level before the next one and pops the
//! level as one batch. Loss-guided growth always pops the single entry with
//! the highest gain. The driver also counts leaves, so it decides when the
//! tree has reached `max_leaves`.

use crate::config::TrainParam;
use crate::core::constants::K_RT_EPS;
use crate::core::types::GrowPolicy;
use crate::treelearner::expand_entry::ExpandEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Queued<E> {
    entry: E,
    timestamp: u64,
    policy: GrowPolicy,
}

impl<E: ExpandEntry> Queued<E> {
    /// Ordering for a max-heap: `Greater` pops first.
    fn priority(&self, other: &Self) -> Ordering {
        match self.policy {
            GrowPolicy::DepthWise => other
                .entry
                .depth()
                .cmp(&self.entry.depth())
                .then_with(|| other.timestamp.cmp(&self.timestamp)),
            GrowPolicy::LossGuide => self
                .entry
                .loss_change()
                .total_cmp(&other.entry.loss_change())
                .then_with(|| other.entry.node_id().cmp(&self.entry.node_id()))
                .then_with(|| other.timestamp.cmp(&self.timestamp)),
        }
    }
}

impl<E: ExpandEntry> PartialEq for Queued<E> {
    fn eq(&self, other: &Self) -> bool {
        self.priority(other) == Ordering::Equal
    }
}

impl<E: ExpandEntry> Eq for Queued<E> {}

impl<E: ExpandEntry> PartialOrd for Queued<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E: ExpandEntry> Ord for Queued<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority(other)
    }
}

/// Priority queue of expandable nodes.
#[derive(Debug)]
pub struct Driver<E: ExpandEntry> {
    param: TrainParam,
    queue: BinaryHeap<Queued<E>>,
    timestamp: u64,
    num_leaves: usize,
}

impl<E: ExpandEntry> Driver<E> {
    /// Creates an empty driver; a fresh tree has one leaf.
    pub fn new(param: &TrainParam) -> Self {
        Driver {
            param: param.clone(),
            queue: BinaryHeap::new(),
            timestamp: 0,
            num_leaves: 1,
        }
    }

    /// Queues `entry` if its split reduces the loss.
    pub fn push(&mut self, entry: E) {
        if entry.loss_change() > K_RT_EPS {
            self.queue.push(Queued {
                entry,
                timestamp: self.timestamp,
                policy: self.param.grow_policy,
            });
            self.timestamp += 1;
        }
    }

    /// Queues every entry of `entries`.
    pub fn push_all<I: IntoIterator<Item = E>>(&mut self, entries: I) {
        for entry in entries {
            self.push(entry);
        }
    }

    /// Removes the next batch to expand.
    ///
    /// Entries that may no longer be split are dropped from the queue and
    /// stay leaves; the returned batch can therefore be empty while the queue
    /// still holds entries.
    pub fn pop(&mut self) -> Vec<E> {
        let mut batch = Vec::new();
        let level = match self.queue.peek() {
            Some(top) => top.entry.depth(),
            None => return batch,
        };

        match self.param.grow_policy {
            GrowPolicy::LossGuide => {
                if let Some(top) = self.queue.pop() {
                    if top.entry.is_valid(&self.param, self.num_leaves) {
                        self.num_leaves += 1;
                        batch.push(top.entry);
                    }
                }
            }
            GrowPolicy::DepthWise => {
                while batch.len() < self.param.max_node_batch_size {
                    match self.queue.peek() {
                        Some(top) if top.entry.depth() == level => {}
                        _ => break,
                    }
                    if let Some(top) = self.queue.pop() {
                        if top.entry.is_valid(&self.param, self.num_leaves) {
                            self.num_leaves += 1;
                            batch.push(top.entry);
                        }
                    }
                }
            }
        }
        batch
    }

    /// Whether the children of `parent` could themselves be split.
    pub fn is_child_valid(&self, parent: &E) -> bool {
        if parent.depth() + 1 >= self.param.max_depth {
            return false;
        }
        self.param.max_leaves == 0 || self.num_leaves < self.param.max_leaves as usize
    }

    /// Leaves of the tree once every popped entry is split.
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Whether no entry is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
