//! Round-robin cursor.
//!
//! Lives inside the fleet lock, so it is a plain counter rather than an
//! atomic. The routable list is recomputed on every selection and may
//! grow or shrink between calls.

/// Round-robin index selection over a list whose length can change.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Select the next index into a list of `count` items.
    ///
    /// Returns `None` if count is zero. A cursor left past the end by a
    /// shrinking list restarts at zero.
    pub fn next(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        if self.cursor >= count {
            self.cursor = 0;
        }
        let idx = self.cursor;
        self.cursor = (idx + 1) % count;
        Some(idx)
    }
}
