//! Visit marks for one graph traversal at a time.
//!
//! Each slot stores the epoch in which its node was last reached; starting a
//! traversal bumps the epoch, so nothing is zeroed between searches. The mark
//! array follows the size of the graph being walked: it grows on demand and is
//! released down to the graph size when it has become much larger, which
//! happens after compaction or when a worker thread moves from a large index
//! to a small one.

/// Marks are kept if they exceed the graph by at most this factor.
const SHRINK_FACTOR: usize = 4;

/// Below this many slots the array is never shrunk.
const MIN_RETAINED_SLOTS: usize = 4096;

#[derive(Debug, Default)]
pub struct VisitedSet {
    marks: Vec<u16>,
    epoch: u16,
}

impl VisitedSet {
    /// Start a traversal over a graph with `node_count` arena slots.
    /// Every node reads as unvisited afterwards.
    pub fn begin(&mut self, node_count: usize) {
        if self.marks.len() < node_count {
            self.marks.resize(node_count, 0);
        } else if self.marks.len() > MIN_RETAINED_SLOTS
            && self.marks.len() > node_count.saturating_mul(SHRINK_FACTOR)
        {
            self.marks.truncate(node_count);
            self.marks.shrink_to_fit();
        }

        match self.epoch.checked_add(1) {
            Some(next) => self.epoch = next,
            None => {
                self.marks.fill(0);
                self.epoch = 1;
            }
        }
    }

    /// Mark `node` reached. Returns `true` the first time in this traversal.
    #[inline]
    pub fn visit(&mut self, node: u32) -> bool {
        let mark = &mut self.marks[node as usize];
        if *mark == self.epoch {
            return false;
        }
        *mark = self.epoch;
        true
    }
}
