//! Corner-Block-List representation and the per-die packing state.
//!
//! A CBL is three parallel sequences `(S, L, T)`: which block, which
//! insertion direction, how many T-junctions it covers. A full layout is one
//! CBL per die plus, per die, two insertion stacks (`Hi`, `Vi`) and a
//! progress pointer into the CBL — together the mutable state the packer
//! threads through while it walks the sequence.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Insertion direction of a CBL tuple: onto the `Hi` (HORIZONTAL) or `Vi`
/// (VERTICAL) stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Horizontal,
    Vertical,
}

impl Direction {
    pub fn toggle(self) -> Self {
        match self {
            Direction::Horizontal => Direction::Vertical,
            Direction::Vertical => Direction::Horizontal,
        }
    }
}

/// One `(S, L, T)` tuple: a block (by numerical id), its insertion
/// direction, and the number of T-junctions (previously-placed neighbours)
/// it covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tuple {
    pub block: usize,
    pub dir: Direction,
    pub junctions: u32,
}

/// Corner-Block-List for a single die: three parallel sequences of equal
/// length. Mutated only through the operator methods described in the
/// layout-operators component; snapshotted before each SA move for revert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cbl {
    pub tuples: Vec<Tuple>,
}

impl Cbl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn push(&mut self, tuple: Tuple) {
        self.tuples.push(tuple);
    }

    pub fn tuple_string(&self, index: usize) -> String {
        let t = &self.tuples[index];
        format!(
            "tuple {} : ( {} {} {} )",
            index,
            t.block,
            match t.dir {
                Direction::Horizontal => 0,
                Direction::Vertical => 1,
            },
            t.junctions
        )
    }

    pub fn cbl_string(&self) -> String {
        (0..self.len()).map(|i| self.tuple_string(i) + "; ").collect()
    }
}

/// Per-die packing state: the two insertion stacks plus a progress index
/// into the die's CBL. Implemented as ordered deques (front = stack top) per
/// the reference design note: they look like stacks but `rebuild` sorts
/// them, so a double-ended container is the right shape.
#[derive(Debug, Clone, Default)]
pub struct DiePackingState {
    pub hi: VecDeque<usize>,
    pub vi: VecDeque<usize>,
    pub pi: usize,
}

impl DiePackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.hi.clear();
        self.vi.clear();
        self.pi = 0;
    }

    /// `Hi.front() == Vi.front()`, the corner-block invariant that must hold
    /// after every legal insertion (testable property #4).
    pub fn corner_block_consistent(&self) -> bool {
        match (self.hi.front(), self.vi.front()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_string_formats_fields() {
        let mut cbl = Cbl::new();
        cbl.push(Tuple {
            block: 2,
            dir: Direction::Horizontal,
            junctions: 1,
        });
        assert_eq!(cbl.tuple_string(0), "tuple 0 : ( 2 0 1 )");
    }

    #[test]
    fn direction_toggle_round_trips() {
        assert_eq!(Direction::Horizontal.toggle(), Direction::Vertical);
        assert_eq!(Direction::Vertical.toggle().toggle(), Direction::Vertical);
    }

    #[test]
    fn corner_block_invariant_holds_when_both_empty() {
        let state = DiePackingState::new();
        assert!(state.corner_block_consistent());
    }

    #[test]
    fn corner_block_invariant_detects_mismatch() {
        let mut state = DiePackingState::new();
        state.hi.push_front(1);
        state.vi.push_front(2);
        assert!(!state.corner_block_consistent());
    }
}
