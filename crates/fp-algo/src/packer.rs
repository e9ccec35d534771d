//! Per-die layout generator: turns one die's CBL into concrete block
//! coordinates using the two insertion stacks `Hi`/`Vi`.
//!
//! Grounded on the reference floorplanner's die-packing pass
//! (`placeCurrentBlock`/`popRelevantBlocks`/`updatePlacementStacks`/
//! `rebuildPlacementStacks`): blocks are addressed by index into a shared
//! `blocks` slice rather than by pointer, per the indices-not-pointers design
//! note for cross-references.

use fp_core::{Block, Cbl, DiePackingState, Direction, Rect};
use tracing::trace;

/// One die: its CBL plus packing stacks. Blocks themselves live in the
/// floorplanner's shared block vector; tuples reference them by
/// `numerical_id`.
#[derive(Debug, Clone, Default)]
pub struct Die {
    pub cbl: Cbl,
    pub state: DiePackingState,
}

impl Die {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}

/// Coordinate axis a placement step determines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Place the tuple at the die's current progress pointer `pi`, updating the
/// block's `bb` and the placement stacks. No-op if the block is already
/// placed (can happen when earlier alignment processing placed it).
pub fn place_current_block(die: &mut Die, blocks: &mut [Block], alignment_enabled: bool) {
    let tuple = die.cbl.tuples[die.state.pi];
    if blocks[tuple.block].placed {
        return;
    }

    let relevant = pop_relevant_blocks(die, tuple.dir, tuple.junctions);

    match tuple.dir {
        Direction::Horizontal => {
            determ_current_block_coords(blocks, tuple.block, tuple.dir, Axis::Y, &relevant, false);
            determ_current_block_coords(blocks, tuple.block, tuple.dir, Axis::X, &relevant, alignment_enabled);
        }
        Direction::Vertical => {
            determ_current_block_coords(blocks, tuple.block, tuple.dir, Axis::X, &relevant, false);
            determ_current_block_coords(blocks, tuple.block, tuple.dir, Axis::Y, &relevant, alignment_enabled);
        }
    }

    update_placement_stacks(die, blocks, tuple.block, tuple.dir, &relevant);

    blocks[tuple.block].placed = true;
    trace!(block = tuple.block, "placed current block");
}

/// Pop `min(T+1, |stack|)` blocks from the front of the stack matching this
/// tuple's insertion direction.
fn pop_relevant_blocks(die: &mut Die, dir: Direction, junctions: u32) -> Vec<usize> {
    let stack = match dir {
        Direction::Horizontal => &mut die.state.hi,
        Direction::Vertical => &mut die.state.vi,
    };
    let count = (junctions as usize + 1).min(stack.len());
    let mut ret = Vec::with_capacity(count);
    for _ in 0..count {
        ret.push(stack.pop_front().unwrap());
    }
    ret
}

fn determ_current_block_coords(
    blocks: &mut [Block],
    cur: usize,
    cur_dir: Direction,
    axis: Axis,
    relevant: &[usize],
    extended_check: bool,
) {
    let cur_bb = blocks[cur].bb;

    let value = match axis {
        Axis::X => {
            if cur_dir == Direction::Vertical {
                // x is the first (independent) coordinate for vertical insertion:
                // all columns covered (stack emptied by the pop) -> die's left edge
                if relevant.is_empty() {
                    0.0
                } else {
                    relevant.iter().map(|&b| blocks[b].bb.ll.x).fold(f64::INFINITY, f64::min)
                }
            } else {
                // x depends on y for horizontal insertion
                let mut x = 0.0_f64;
                if extended_check {
                    for b in 0..blocks.len() {
                        if !blocks[b].placed {
                            break;
                        }
                        if Rect::intersect_vertical(&cur_bb, &blocks[b].bb) {
                            x = x.max(blocks[b].bb.ur.x);
                        }
                    }
                } else {
                    for &b in relevant {
                        if Rect::intersect_vertical(&cur_bb, &blocks[b].bb) {
                            x = x.max(blocks[b].bb.ur.x);
                        }
                    }
                }
                x
            }
        }
        Axis::Y => {
            if cur_dir == Direction::Horizontal {
                if relevant.is_empty() {
                    0.0
                } else {
                    relevant.iter().map(|&b| blocks[b].bb.ll.y).fold(f64::INFINITY, f64::min)
                }
            } else {
                let mut y = 0.0_f64;
                if extended_check {
                    for b in 0..blocks.len() {
                        if !blocks[b].placed {
                            break;
                        }
                        if Rect::intersect_horizontal(&cur_bb, &blocks[b].bb) {
                            y = y.max(blocks[b].bb.ur.y);
                        }
                    }
                } else {
                    for &b in relevant {
                        if Rect::intersect_horizontal(&cur_bb, &blocks[b].bb) {
                            y = y.max(blocks[b].bb.ur.y);
                        }
                    }
                }
                y
            }
        }
    };

    let value = if value.is_finite() { value } else { 0.0 };

    let b = &mut blocks[cur];
    match axis {
        Axis::X => {
            b.bb.ll.x = value;
            b.bb.ur.x = value + b.bb.w;
        }
        Axis::Y => {
            b.bb.ll.y = value;
            b.bb.ur.y = value + b.bb.h;
        }
    }
}

fn update_placement_stacks(die: &mut Die, blocks: &[Block], cur: usize, cur_dir: Direction, relevant: &[usize]) {
    let cur_bb = blocks[cur].bb;

    match cur_dir {
        Direction::Horizontal => {
            let add_to_vi = !relevant.iter().any(|&b| Rect::below(&cur_bb, &blocks[b].bb, false));
            if add_to_vi {
                die.state.vi.push_front(cur);
            }

            die.state.hi.push_front(cur);
            for &b in relevant.iter().rev() {
                if !Rect::left_of(&blocks[b].bb, &cur_bb, true) {
                    die.state.hi.push_front(b);
                }
            }
        }
        Direction::Vertical => {
            let add_to_hi = !relevant.iter().any(|&b| Rect::left_of(&cur_bb, &blocks[b].bb, false));
            if add_to_hi {
                die.state.hi.push_front(cur);
            }

            die.state.vi.push_front(cur);
            for &b in relevant.iter().rev() {
                if !Rect::below(&blocks[b].bb, &cur_bb, true) {
                    die.state.vi.push_front(b);
                }
            }
        }
    }
}

/// Rebuild both stacks from scratch after an alignment-driven shift, since
/// the insertion order assumption no longer holds. Drops now-covered blocks,
/// re-adds the relevant blocks and the current block, then sorts each stack
/// by its orthogonal coordinate descending. Finally repairs a
/// `Hi.front() != Vi.front()` mismatch by popping from one stack (and, if
/// that empties it, the other) until the fronts agree again.
pub fn rebuild_placement_stacks(die: &mut Die, blocks: &[Block], cur: usize, cur_dir: Direction, relevant: &[usize]) {
    let cur_bb = blocks[cur].bb;

    die.state.hi.retain(|&b| !Rect::left_of(&blocks[b].bb, &cur_bb, true));
    if cur_dir == Direction::Horizontal {
        for &b in relevant {
            if !Rect::left_of(&blocks[b].bb, &cur_bb, true) {
                die.state.hi.push_front(b);
            }
        }
    }
    let covered = placed_blocks_prefix(blocks).any(|b| Rect::left_of(&cur_bb, &blocks[b].bb, true));
    if !covered {
        die.state.hi.push_back(cur);
    }
    die.state
        .hi
        .make_contiguous()
        .sort_by(|&b1, &b2| blocks[b2].bb.ll.y.partial_cmp(&blocks[b1].bb.ll.y).unwrap());

    die.state.vi.retain(|&b| !Rect::below(&blocks[b].bb, &cur_bb, true));
    if cur_dir == Direction::Vertical {
        for &b in relevant {
            if !Rect::below(&blocks[b].bb, &cur_bb, true) {
                die.state.vi.push_front(b);
            }
        }
    }
    let covered = placed_blocks_prefix(blocks).any(|b| Rect::below(&cur_bb, &blocks[b].bb, true));
    if !covered {
        die.state.vi.push_back(cur);
    }
    die.state
        .vi
        .make_contiguous()
        .sort_by(|&b1, &b2| blocks[b2].bb.ll.x.partial_cmp(&blocks[b1].bb.ll.x).unwrap());

    if !die.state.corner_block_consistent() {
        let hi_backup = die.state.hi.clone();
        while !die.state.corner_block_consistent() {
            if die.state.hi.is_empty() {
                break;
            }
            die.state.hi.pop_front();
        }
        if die.state.hi.is_empty() {
            die.state.hi = hi_backup;
            let vi_backup = die.state.vi.clone();
            while !die.state.corner_block_consistent() {
                if die.state.vi.is_empty() {
                    break;
                }
                die.state.vi.pop_front();
            }
            if die.state.vi.is_empty() {
                die.state.vi = vi_backup;
                trace!("differing corner blocks on Hi, Vi; stack fixing failed");
            }
        }
    }
}

/// Blocks in CBL-S order, up to (but excluding) the first not-yet-placed
/// block; placed blocks always form a prefix per packing order.
fn placed_blocks_prefix(blocks: &[Block]) -> impl Iterator<Item = usize> + '_ {
    (0..blocks.len()).take_while(|&b| blocks[b].placed)
}

/// Post-packing compaction: slide each not-`SUCCESS`-aligned block against
/// its already-processed predecessors, axis by axis, for `iterations` passes.
/// Blocks pinned by a fulfilled alignment keep their position.
pub fn compact_die(die: &Die, blocks: &mut [Block], iterations: usize) {
    for _ in 0..iterations {
        compact_axis(die, blocks, Axis::X);
        compact_axis(die, blocks, Axis::Y);
    }
}

fn compact_axis(die: &Die, blocks: &mut [Block], axis: Axis) {
    use fp_core::AlignmentStatus;

    let mut order: Vec<usize> = die.cbl.tuples.iter().map(|t| t.block).collect();
    match axis {
        Axis::X => order.sort_by(|&a, &b| {
            blocks[a]
                .bb
                .ll
                .x
                .partial_cmp(&blocks[b].bb.ll.x)
                .unwrap()
                .then(blocks[a].bb.w.partial_cmp(&blocks[b].bb.w).unwrap())
                .then(blocks[a].bb.ll.y.partial_cmp(&blocks[b].bb.ll.y).unwrap())
        }),
        Axis::Y => order.sort_by(|&a, &b| {
            blocks[a]
                .bb
                .ll
                .y
                .partial_cmp(&blocks[b].bb.ll.y)
                .unwrap()
                .then(blocks[a].bb.h.partial_cmp(&blocks[b].bb.h).unwrap())
                .then(blocks[a].bb.ll.x.partial_cmp(&blocks[b].bb.ll.x).unwrap())
        }),
    }

    for (idx, &cur) in order.iter().enumerate() {
        if blocks[cur].alignment_status == AlignmentStatus::Success {
            continue;
        }

        let cur_bb = blocks[cur].bb;
        let mut front = 0.0_f64;
        let mut covered_len = 0.0_f64;
        let extent = match axis {
            Axis::X => cur_bb.h,
            Axis::Y => cur_bb.w,
        };

        for &prev in order[..idx].iter().rev() {
            if covered_len >= extent - fp_core::EPSILON {
                break;
            }
            let prev_bb = blocks[prev].bb;
            let overlaps = match axis {
                Axis::X => Rect::intersect_vertical(&cur_bb, &prev_bb),
                Axis::Y => Rect::intersect_horizontal(&cur_bb, &prev_bb),
            };
            if !overlaps {
                continue;
            }
            front = match axis {
                Axis::X => front.max(prev_bb.ur.x),
                Axis::Y => front.max(prev_bb.ur.y),
            };
            let lo = match axis {
                Axis::X => cur_bb.ll.y.max(prev_bb.ll.y),
                Axis::Y => cur_bb.ll.x.max(prev_bb.ll.x),
            };
            let hi = match axis {
                Axis::X => cur_bb.ur.y.min(prev_bb.ur.y),
                Axis::Y => cur_bb.ur.x.min(prev_bb.ur.x),
            };
            covered_len += (hi - lo).max(0.0);
        }

        let b = &mut blocks[cur];
        match axis {
            Axis::X => {
                b.bb.ll.x = front;
                b.bb.ur.x = front + b.bb.w;
            }
            Axis::Y => {
                b.bb.ll.y = front;
                b.bb.ur.y = front + b.bb.h;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{Point, Tuple};

    fn block(id: usize, w: f64, h: f64) -> Block {
        let mut b = Block::new(format!("B{id}"), id, w * h, 0.1, 10.0);
        b.bb = Rect::from_ll_dims(Point::new(0.0, 0.0), w, h);
        b
    }

    #[test]
    fn first_block_is_placed_at_origin() {
        let mut die = Die::new();
        die.cbl.push(Tuple {
            block: 0,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        let mut blocks = vec![block(0, 4.0, 2.0)];

        place_current_block(&mut die, &mut blocks, false);

        assert_eq!(blocks[0].bb.ll, Point::new(0.0, 0.0));
        assert!(die.state.corner_block_consistent());
    }

    #[test]
    fn second_horizontal_block_sits_right_of_first() {
        let mut die = Die::new();
        die.cbl.push(Tuple {
            block: 0,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        die.cbl.push(Tuple {
            block: 1,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        let mut blocks = vec![block(0, 4.0, 2.0), block(1, 3.0, 3.0)];

        place_current_block(&mut die, &mut blocks, false);
        die.state.pi = 1;
        place_current_block(&mut die, &mut blocks, false);

        assert_eq!(blocks[1].bb.ll.x, 4.0);
        assert_eq!(blocks[1].bb.ll.y, 0.0);
        assert!(!Rect::rects_intersect(&blocks[0].bb, &blocks[1].bb));
    }

    #[test]
    fn compaction_preserves_aligned_blocks() {
        use fp_core::AlignmentStatus;

        let mut die = Die::new();
        die.cbl.push(Tuple {
            block: 0,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        die.cbl.push(Tuple {
            block: 1,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        let mut blocks = vec![block(0, 4.0, 2.0), block(1, 3.0, 3.0)];
        blocks[1].bb.ll.x = 10.0;
        blocks[1].bb.ur.x = 13.0;
        blocks[1].alignment_status = AlignmentStatus::Success;

        compact_die(&die, &mut blocks, 1);

        assert_eq!(blocks[1].bb.ll.x, 10.0);
    }
}
