//! The top-level owning container: all blocks, one [`packer::Die`] per
//! layer, and the alignment requests between them. Cross-references
//! (CBL tuple -> block, request -> block pair, block -> assigned module) are
//! plain indices into these vectors, per the design note on avoiding
//! circular back-references.

use fp_core::{AlignmentRequest, Block, Rect};

use crate::alignment;
use crate::packer::{self, Die};

#[derive(Debug, Clone)]
pub struct Floorplan {
    pub blocks: Vec<Block>,
    pub dies: Vec<Die>,
    pub alignment_requests: Vec<AlignmentRequest>,
    pub outline: Rect,
}

impl Floorplan {
    pub fn new(layers: usize) -> Self {
        Self {
            blocks: Vec::new(),
            dies: vec![Die::new(); layers],
            alignment_requests: Vec::new(),
            outline: Rect::empty(),
        }
    }

    /// Swap the blocks referenced by two CBL tuples (possibly across dies).
    pub fn swap_tuples(&mut self, die1: usize, tuple1: usize, die2: usize, tuple2: usize) {
        if die1 == die2 {
            self.dies[die1].cbl.tuples.swap(tuple1, tuple2);
        } else {
            let b1 = self.dies[die1].cbl.tuples[tuple1].block;
            let b2 = self.dies[die2].cbl.tuples[tuple2].block;
            self.dies[die1].cbl.tuples[tuple1].block = b2;
            self.dies[die2].cbl.tuples[tuple2].block = b1;
        }
    }

    /// Move the tuple at `(die1, tuple1)` to position `tuple2` of `die2`.
    pub fn move_tuple(&mut self, die1: usize, die2: usize, tuple1: usize, tuple2: usize) {
        if die1 == die2 {
            let t = self.dies[die1].cbl.tuples.remove(tuple1);
            let insert_at = tuple2.min(self.dies[die1].cbl.tuples.len());
            self.dies[die1].cbl.tuples.insert(insert_at, t);
        } else {
            let t = self.dies[die1].cbl.tuples.remove(tuple1);
            let insert_at = tuple2.min(self.dies[die2].cbl.tuples.len());
            self.dies[die2].cbl.tuples.insert(insert_at, t);
        }
    }

    /// Reset every die's packing state and every block's `placed` flag
    /// ahead of a fresh layout generation pass.
    pub fn reset_packing(&mut self) {
        for die in &mut self.dies {
            die.reset();
        }
        for block in &mut self.blocks {
            block.placed = false;
        }
    }

    /// Regenerate concrete coordinates for every die from scratch: reset
    /// packing state, then walk each die's CBL from its first tuple,
    /// placing one block at a time. With `alignment_enabled`, a
    /// about-to-be-placed block that's the target of an active request is
    /// shifted into alignment (and the stacks rebuilt) before it commits.
    pub fn pack_all_dies(&mut self, alignment_enabled: bool) {
        self.reset_packing();
        for die in &mut self.dies {
            while die.state.pi < die.cbl.len() {
                let tuple = die.cbl.tuples[die.state.pi];
                packer::place_current_block(die, &mut self.blocks, alignment_enabled);
                if alignment_enabled {
                    if let Some(req) = alignment::active_request_for(&mut self.alignment_requests, tuple.block, &self.blocks) {
                        alignment::shift_current_block(req, die, &mut self.blocks, tuple.dir);
                    }
                }
                die.state.pi += 1;
            }
        }
        if alignment_enabled {
            for req in &mut self.alignment_requests {
                alignment::evaluate(req, &mut self.blocks);
            }
        }
    }

    /// Bounding box of all placed blocks across all dies; used when shrinking
    /// the fixed outline to the current best solution.
    pub fn placed_blocks_bounding_box(&self) -> Rect {
        let rects: Vec<Rect> = self.blocks.iter().filter(|b| b.placed).map(|b| b.bb).collect();
        Rect::bounding_box_many(&rects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{Direction, Tuple};

    #[test]
    fn swap_tuples_across_dies_exchanges_block_refs() {
        let mut fp = Floorplan::new(2);
        fp.dies[0].cbl.push(Tuple {
            block: 0,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        fp.dies[1].cbl.push(Tuple {
            block: 1,
            dir: Direction::Horizontal,
            junctions: 0,
        });

        fp.swap_tuples(0, 0, 1, 0);

        assert_eq!(fp.dies[0].cbl.tuples[0].block, 1);
        assert_eq!(fp.dies[1].cbl.tuples[0].block, 0);
    }

    #[test]
    fn move_tuple_relocates_between_dies() {
        let mut fp = Floorplan::new(2);
        fp.dies[0].cbl.push(Tuple {
            block: 0,
            dir: Direction::Horizontal,
            junctions: 0,
        });

        fp.move_tuple(0, 1, 0, 0);

        assert!(fp.dies[0].cbl.is_empty());
        assert_eq!(fp.dies[1].cbl.tuples[0].block, 0);
    }
}
