//! The seven layout-mutation operators the SA driver applies to a floorplan,
//! plus alignment-guided operator selection.
//!
//! Grounded on the reference floorplanner's `LayoutOperations`: each
//! operator takes explicit `(die, tuple)` coordinates (random when `-1`,
//! i.e. `None` here), records what it did so the SA driver can call it again
//! in revert mode with the exact same coordinates, and returns whether it
//! actually applied (sanity checks can reject a draw without it counting as
//! an SA step).

use fp_core::{AlignmentRequest, Block, Direction};
use rand::Rng;

use crate::floorplan::Floorplan;

/// Operator op-codes, in the order the spec numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    SwapBlocks,
    MoveTuple,
    SwitchInsertionDir,
    SwitchTupleJunctions,
    RotateOrShapeBlock,
    SwapBlocksEnforce,
    SwapAlignmentCoordinates,
}

/// Coordinates of the last applied operator, recorded so a reject can be
/// reverted by re-invoking the same operator with `revert = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastOp {
    pub op: Option<OpCode>,
    pub die1: usize,
    pub die2: usize,
    pub tuple1: usize,
    pub tuple2: usize,
    pub juncts_increment: i32,
}

/// Apply a random draw of `op` to `fp`, recording it in `last`. Returns
/// `false` if the draw failed a sanity check (empty die, identical same-die
/// tuple, power-aware/floorplacement rejection) — such a draw does not count
/// as an SA step and the caller should simply try again.
pub fn apply(op: OpCode, fp: &mut Floorplan, rng: &mut impl Rng, sa_phase_one: bool, power_aware: bool, floorplacement: bool, last: &mut LastOp) -> bool {
    match op {
        OpCode::SwapBlocks | OpCode::SwapBlocksEnforce => swap_blocks(fp, rng, op == OpCode::SwapBlocksEnforce, sa_phase_one, power_aware, floorplacement, last),
        OpCode::MoveTuple => move_tuple(fp, rng, last),
        OpCode::SwitchInsertionDir => switch_insertion_dir(fp, rng, last),
        OpCode::SwitchTupleJunctions => switch_tuple_junctions(fp, rng, last),
        OpCode::RotateOrShapeBlock => rotate_or_shape_block(fp, rng, last),
        OpCode::SwapAlignmentCoordinates => false, // requires an explicit request; use apply_swap_alignment_coordinates
    }
}

/// Like [`apply`], but for `SwapBlocksEnforce`/`MoveTuple` with `(die1,
/// tuple1)` forced to `forced` rather than drawn at random — the force-fit
/// path taken when this step's layout-fit counter is zero, so the
/// worst-exceeding block (per [`exceeding_block`]) is guaranteed to be
/// the one moved or swapped.
pub fn apply_forced(op: OpCode, fp: &mut Floorplan, rng: &mut impl Rng, forced: (usize, usize), sa_phase_one: bool, floorplacement: bool, last: &mut LastOp) -> bool {
    match op {
        OpCode::SwapBlocksEnforce => swap_blocks_forced(fp, rng, forced, sa_phase_one, floorplacement, last),
        OpCode::MoveTuple => move_tuple_forced(fp, rng, forced, last),
        _ => apply(op, fp, rng, sa_phase_one, true, floorplacement, last),
    }
}

/// Revert the operator recorded in `last` (a no-op if nothing was recorded).
pub fn revert(fp: &mut Floorplan, last: &LastOp) {
    let Some(op) = last.op else { return };
    match op {
        OpCode::SwapBlocks | OpCode::SwapBlocksEnforce => {
            fp.swap_tuples(last.die1, last.tuple1, last.die2, last.tuple2);
        }
        OpCode::MoveTuple => {
            fp.move_tuple(last.die2, last.die1, last.tuple2, last.tuple1);
        }
        OpCode::SwitchInsertionDir => {
            fp.dies[last.die1].cbl.tuples[last.tuple1].dir = fp.dies[last.die1].cbl.tuples[last.tuple1].dir.toggle();
        }
        OpCode::SwitchTupleJunctions => {
            let t = &mut fp.dies[last.die1].cbl.tuples[last.tuple1];
            t.junctions = (t.junctions as i32 - last.juncts_increment).max(0) as u32;
        }
        OpCode::RotateOrShapeBlock => {
            let block = fp.dies[last.die1].cbl.tuples[last.tuple1].block;
            fp.blocks[block].restore_bb();
        }
        OpCode::SwapAlignmentCoordinates => {
            // self-inverse: re-swapping the same request's X/Y constraints
            // restores the original; `last.tuple1` holds the request index
            if let Some(req) = fp.alignment_requests.get_mut(last.tuple1) {
                apply_swap_alignment_coordinates(req);
            }
        }
    }
}

fn swap_blocks(
    fp: &mut Floorplan,
    rng: &mut impl Rng,
    enforce: bool,
    sa_phase_one: bool,
    power_aware: bool,
    floorplacement: bool,
    last: &mut LastOp,
) -> bool {
    let layers = fp.dies.len();
    let die1 = rng.gen_range(0..layers);
    let die2 = rng.gen_range(0..layers);

    if fp.dies[die1].cbl.is_empty() || fp.dies[die2].cbl.is_empty() {
        return false;
    }

    let mut tuple1 = rng.gen_range(0..fp.dies[die1].cbl.len());
    let mut tuple2 = rng.gen_range(0..fp.dies[die2].cbl.len());
    if die1 == die2 {
        if fp.dies[die1].cbl.len() < 2 {
            return false;
        }
        while tuple1 == tuple2 {
            tuple2 = rng.gen_range(0..fp.dies[die1].cbl.len());
        }
    }

    let b1 = fp.dies[die1].cbl.tuples[tuple1].block;
    let b2 = fp.dies[die2].cbl.tuples[tuple2].block;

    if power_aware && !enforce {
        let pd1 = fp.blocks[b1].power_density();
        let pd2 = fp.blocks[b2].power_density();
        if (die1 < die2 && pd1 < pd2) || (die2 < die1 && pd2 < pd1) {
            return false;
        }
    }

    if floorplacement && sa_phase_one && (fp.blocks[b1].floorplacement || fp.blocks[b2].floorplacement) {
        return false;
    }

    fp.swap_tuples(die1, tuple1, die2, tuple2);

    *last = LastOp {
        op: Some(if enforce { OpCode::SwapBlocksEnforce } else { OpCode::SwapBlocks }),
        die1,
        die2,
        tuple1,
        tuple2,
        juncts_increment: 0,
    };
    true
}

/// Like [`swap_blocks`] with `enforce = true`, but `(die1, tuple1)` is
/// fixed rather than drawn at random; `die2`/`tuple2` are still drawn. The
/// power-aware ordering check is skipped, same as a random enforce draw.
fn swap_blocks_forced(fp: &mut Floorplan, rng: &mut impl Rng, (die1, tuple1): (usize, usize), sa_phase_one: bool, floorplacement: bool, last: &mut LastOp) -> bool {
    let layers = fp.dies.len();
    let die2 = rng.gen_range(0..layers);

    if fp.dies[die1].cbl.is_empty() || fp.dies[die2].cbl.is_empty() {
        return false;
    }

    let mut tuple2 = rng.gen_range(0..fp.dies[die2].cbl.len());
    if die1 == die2 {
        if fp.dies[die1].cbl.len() < 2 {
            return false;
        }
        while tuple2 == tuple1 {
            tuple2 = rng.gen_range(0..fp.dies[die1].cbl.len());
        }
    }

    let b1 = fp.dies[die1].cbl.tuples[tuple1].block;
    let b2 = fp.dies[die2].cbl.tuples[tuple2].block;

    if floorplacement && sa_phase_one && (fp.blocks[b1].floorplacement || fp.blocks[b2].floorplacement) {
        return false;
    }

    fp.swap_tuples(die1, tuple1, die2, tuple2);

    *last = LastOp {
        op: Some(OpCode::SwapBlocksEnforce),
        die1,
        die2,
        tuple1,
        tuple2,
        juncts_increment: 0,
    };
    true
}

/// Like [`move_tuple`], but `(die1, tuple1)` is fixed rather than drawn at
/// random; the destination die is still drawn and the tuple is appended.
fn move_tuple_forced(fp: &mut Floorplan, rng: &mut impl Rng, (die1, tuple1): (usize, usize), last: &mut LastOp) -> bool {
    let layers = fp.dies.len();
    let die2 = rng.gen_range(0..layers);

    if fp.dies[die1].cbl.is_empty() {
        return false;
    }

    let tuple2 = fp.dies[die2].cbl.len();
    fp.move_tuple(die1, die2, tuple1, tuple2);

    *last = LastOp {
        op: Some(OpCode::MoveTuple),
        die1,
        die2,
        tuple1,
        tuple2,
        juncts_increment: 0,
    };
    true
}

fn move_tuple(fp: &mut Floorplan, rng: &mut impl Rng, last: &mut LastOp) -> bool {
    let layers = fp.dies.len();
    let die1 = rng.gen_range(0..layers);
    let die2 = rng.gen_range(0..layers);

    if fp.dies[die1].cbl.is_empty() {
        return false;
    }

    let tuple1 = rng.gen_range(0..fp.dies[die1].cbl.len());
    let tuple2 = fp.dies[die2].cbl.len();

    fp.move_tuple(die1, die2, tuple1, tuple2);

    *last = LastOp {
        op: Some(OpCode::MoveTuple),
        die1,
        die2,
        tuple1,
        tuple2,
        juncts_increment: 0,
    };
    true
}

fn switch_insertion_dir(fp: &mut Floorplan, rng: &mut impl Rng, last: &mut LastOp) -> bool {
    let layers = fp.dies.len();
    let die1 = rng.gen_range(0..layers);
    if fp.dies[die1].cbl.is_empty() {
        return false;
    }
    let tuple1 = rng.gen_range(0..fp.dies[die1].cbl.len());
    fp.dies[die1].cbl.tuples[tuple1].dir = fp.dies[die1].cbl.tuples[tuple1].dir.toggle();

    *last = LastOp {
        op: Some(OpCode::SwitchInsertionDir),
        die1,
        die2: die1,
        tuple1,
        tuple2: tuple1,
        juncts_increment: 0,
    };
    true
}

fn switch_tuple_junctions(fp: &mut Floorplan, rng: &mut impl Rng, last: &mut LastOp) -> bool {
    let layers = fp.dies.len();
    let die1 = rng.gen_range(0..layers);
    if fp.dies[die1].cbl.is_empty() {
        return false;
    }
    let tuple1 = rng.gen_range(0..fp.dies[die1].cbl.len());
    let increment: i32 = if rng.gen_bool(0.5) { 1 } else { -1 };
    let t = &mut fp.dies[die1].cbl.tuples[tuple1];
    let new_value = (t.junctions as i32 + increment).max(0);
    let applied_increment = new_value - t.junctions as i32;
    if applied_increment == 0 {
        return false;
    }
    t.junctions = new_value as u32;

    *last = LastOp {
        op: Some(OpCode::SwitchTupleJunctions),
        die1,
        die2: die1,
        tuple1,
        tuple2: tuple1,
        juncts_increment: applied_increment,
    };
    true
}

/// Hard blocks: simple rotate (swap w/h) or enhanced rotate (rotate iff the
/// row/column-maximum dimension would not grow), picked with equal odds.
/// Soft blocks: simple AR-random reshape within `[ar_min, ar_max]` or
/// enhanced shape (stretch/shrink one edge to the nearest block's
/// boundary), same odds.
fn rotate_or_shape_block(fp: &mut Floorplan, rng: &mut impl Rng, last: &mut LastOp) -> bool {
    let layers = fp.dies.len();
    let die1 = rng.gen_range(0..layers);
    if fp.dies[die1].cbl.is_empty() {
        return false;
    }
    let tuple1 = rng.gen_range(0..fp.dies[die1].cbl.len());
    let block = fp.dies[die1].cbl.tuples[tuple1].block;

    fp.blocks[block].backup_bb();

    let enhanced = rng.gen_bool(0.5);
    let applied = if fp.blocks[block].soft {
        if enhanced {
            enhanced_shape(fp, die1, block, rng)
        } else {
            let ar_sample = rng.gen_range(fp.blocks[block].ar_min..=fp.blocks[block].ar_max);
            fp.blocks[block].shape_randomly_by_ar(ar_sample)
        }
    } else if enhanced {
        enhanced_rotate(fp, die1, block)
    } else {
        fp.blocks[block].rotate()
    };

    if !applied {
        return false;
    }

    *last = LastOp {
        op: Some(OpCode::RotateOrShapeBlock),
        die1,
        die2: die1,
        tuple1,
        tuple2: tuple1,
        juncts_increment: 0,
    };
    true
}

/// Rotate a hard block only if doing so would not grow the row's (for a
/// horizontal block) or column's (for a vertical block) current maximum
/// dimension — i.e. the gain along the block's long axis outweighs any
/// loss along the row/column it sits in.
fn enhanced_rotate(fp: &mut Floorplan, die1: usize, block: usize) -> bool {
    let bb = fp.blocks[block].bb;

    let (gain, loss) = if bb.w > bb.h {
        let mut row_max_height = bb.h;
        for t in &fp.dies[die1].cbl.tuples {
            let other = &fp.blocks[t.block];
            if fp_core::double_eq(other.bb.ll.y, bb.ll.y, fp_core::EPSILON) {
                row_max_height = row_max_height.max(other.bb.h);
            }
        }
        (bb.w - bb.h, bb.w - row_max_height)
    } else {
        let mut col_max_width = bb.w;
        for t in &fp.dies[die1].cbl.tuples {
            let other = &fp.blocks[t.block];
            if fp_core::double_eq(other.bb.ll.x, bb.ll.x, fp_core::EPSILON) {
                col_max_width = col_max_width.max(other.bb.w);
            }
        }
        (bb.h - bb.w, bb.h - col_max_width)
    };

    if loss < 0.0 || gain > loss {
        fp.blocks[block].rotate()
    } else {
        false
    }
}

/// Stretch or shrink one edge of a soft block to align with the nearest
/// other block's boundary on that edge, preserving area via
/// `shape_by_width_height`. Picks one of the four directions uniformly.
fn enhanced_shape(fp: &mut Floorplan, die1: usize, block: usize, rng: &mut impl Rng) -> bool {
    let bb = fp.blocks[block].bb;

    let (width, height) = match rng.gen_range(0..4) {
        // stretch right front to the nearest right front beyond it
        0 => {
            let mut boundary_x = 2.0 * bb.ur.x;
            for t in &fp.dies[die1].cbl.tuples {
                let other_ur_x = fp.blocks[t.block].bb.ur.x;
                if other_ur_x > bb.ur.x {
                    boundary_x = boundary_x.min(other_ur_x);
                }
            }
            let width = boundary_x - bb.ll.x;
            (width, bb.area / width)
        }
        // stretch top front to the nearest top front beyond it
        1 => {
            let mut boundary_y = 2.0 * bb.ur.y;
            for t in &fp.dies[die1].cbl.tuples {
                let other_ur_y = fp.blocks[t.block].bb.ur.y;
                if other_ur_y > bb.ur.y {
                    boundary_y = boundary_y.min(other_ur_y);
                }
            }
            let height = boundary_y - bb.ll.y;
            (bb.area / height, height)
        }
        // shrink right front to the nearest left front inside it
        2 => {
            let mut boundary_x = 0.0;
            for t in &fp.dies[die1].cbl.tuples {
                let other_ll_x = fp.blocks[t.block].bb.ll.x;
                if other_ll_x < bb.ur.x {
                    boundary_x = f64::max(boundary_x, other_ll_x);
                }
            }
            let width = boundary_x - bb.ll.x;
            (width, bb.area / width)
        }
        // shrink top front to the nearest bottom front inside it
        _ => {
            let mut boundary_y = 0.0;
            for t in &fp.dies[die1].cbl.tuples {
                let other_ll_y = fp.blocks[t.block].bb.ll.y;
                if other_ll_y < bb.ur.y {
                    boundary_y = f64::max(boundary_y, other_ll_y);
                }
            }
            let height = boundary_y - bb.ll.y;
            (bb.area / height, height)
        }
    };

    fp.blocks[block].shape_by_width_height(width, height)
}

/// For a `FLEXIBLE` request, swap its X and Y partial alignment constraints
/// in place; used to steer the search out of a persistently failing
/// alignment by reinterpreting which axis carries the hard constraint.
pub fn apply_swap_alignment_coordinates(req: &mut AlignmentRequest) -> bool {
    if req.handling != fp_core::Handling::Flexible {
        return false;
    }
    std::mem::swap(&mut req.type_x, &mut req.type_y);
    std::mem::swap(&mut req.alignment_x, &mut req.alignment_y);
    true
}

/// Operators 1-5, chosen uniformly at random; used by the default selection
/// policy and as the fallback when op 6/7 don't apply.
pub const RANDOM_POOL: [OpCode; 5] = [
    OpCode::SwapBlocks,
    OpCode::MoveTuple,
    OpCode::SwitchInsertionDir,
    OpCode::SwitchTupleJunctions,
    OpCode::RotateOrShapeBlock,
];

/// Selection policy for one SA step, per the spec's priority order:
/// force-fit the worst-exceeding block first, then phase-three
/// alignment-repair ops, else a uniform draw from ops 1-5.
pub fn select_op(rng: &mut impl Rng, cooling_phase_three: bool, has_failing_alignment: bool) -> OpCode {
    if cooling_phase_three && has_failing_alignment {
        if rng.gen_bool(0.5) {
            OpCode::SwapBlocksEnforce
        } else {
            OpCode::SwapAlignmentCoordinates
        }
    } else {
        RANDOM_POOL[rng.gen_range(0..RANDOM_POOL.len())]
    }
}

/// Direction-only helper for the force-fit coordinate selection: pick the
/// rightmost- or topmost-exceeding block's die/tuple index, used when
/// `layout_fit_counter == 0` this step.
pub fn exceeding_block(fp: &Floorplan, outline_w: f64, outline_h: f64, rng: &mut impl Rng) -> Option<(usize, usize)> {
    let axis_horizontal = rng.gen_bool(0.5);
    let mut best: Option<(usize, usize, f64)> = None;

    for (die_idx, die) in fp.dies.iter().enumerate() {
        for (tuple_idx, tuple) in die.cbl.tuples.iter().enumerate() {
            let b = &fp.blocks[tuple.block];
            let excess = if axis_horizontal { b.bb.ur.x - outline_w } else { b.bb.ur.y - outline_h };
            if excess > 0.0 && best.map_or(true, |(_, _, best_excess)| excess > best_excess) {
                best = Some((die_idx, tuple_idx, excess));
            }
        }
    }

    best.map(|(d, t, _)| (d, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floorplan::Floorplan;
    use fp_core::{Point, Rect, Tuple};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_floorplan() -> Floorplan {
        let mut fp = Floorplan::new(2);
        let mut b0 = Block::new("B0", 0, 4.0, 1.0, 1.0);
        b0.bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 2.0, 2.0);
        let mut b1 = Block::new("B1", 1, 9.0, 1.0, 1.0);
        b1.bb = Rect::from_ll_dims(Point::new(2.0, 0.0), 3.0, 3.0);
        fp.blocks = vec![b0, b1];
        fp.dies[0].cbl.push(Tuple {
            block: 0,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        fp.dies[0].cbl.push(Tuple {
            block: 1,
            dir: Direction::Horizontal,
            junctions: 0,
        });
        fp
    }

    #[test]
    fn switch_insertion_dir_toggles_and_reverts() {
        let mut fp = sample_floorplan();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut last = LastOp::default();

        let before = fp.dies[0].cbl.tuples[0].dir;
        loop {
            if apply(OpCode::SwitchInsertionDir, &mut fp, &mut rng, false, false, false, &mut last) {
                break;
            }
        }
        let after = fp.dies[last.die1].cbl.tuples[last.tuple1].dir;
        assert_ne!(before, after);

        revert(&mut fp, &last);
        assert_eq!(fp.dies[last.die1].cbl.tuples[last.tuple1].dir, before);
    }

    #[test]
    fn swap_blocks_swaps_and_reverts() {
        let mut fp = sample_floorplan();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut last = LastOp::default();

        let b_at_0 = fp.dies[0].cbl.tuples[0].block;
        let b_at_1 = fp.dies[0].cbl.tuples[1].block;

        loop {
            if apply(OpCode::SwapBlocks, &mut fp, &mut rng, false, false, false, &mut last) {
                break;
            }
        }
        assert_eq!(fp.dies[0].cbl.tuples[0].block, b_at_1);
        assert_eq!(fp.dies[0].cbl.tuples[1].block, b_at_0);

        revert(&mut fp, &last);
        assert_eq!(fp.dies[0].cbl.tuples[0].block, b_at_0);
        assert_eq!(fp.dies[0].cbl.tuples[1].block, b_at_1);
    }

    #[test]
    fn swap_alignment_coordinates_only_applies_to_flexible() {
        let mut req = AlignmentRequest::new(
            0,
            fp_core::Handling::Strict,
            1,
            0,
            1,
            fp_core::PartialType::Offset,
            4.0,
            fp_core::PartialType::Undef,
            0.0,
        );
        assert!(!apply_swap_alignment_coordinates(&mut req));

        req.handling = fp_core::Handling::Flexible;
        assert!(apply_swap_alignment_coordinates(&mut req));
        assert_eq!(req.type_y, fp_core::PartialType::Offset);
        assert_eq!(req.alignment_y, 4.0);
    }

    #[test]
    fn enhanced_rotate_rejects_with_no_taller_row_mate() {
        // b0 is 4x1 with no block sharing its row, so rotating to 1x4 would
        // grow the row's max height by exactly the horizontal gain
        let mut fp = sample_floorplan();
        fp.blocks[0].bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 4.0, 1.0);
        fp.blocks[1].bb = Rect::from_ll_dims(Point::new(4.0, 5.0), 2.0, 2.0);
        assert!(!enhanced_rotate(&mut fp, 0, 0));
        assert_eq!(fp.blocks[0].bb.w, 4.0);
    }

    #[test]
    fn enhanced_rotate_applies_with_a_taller_row_mate() {
        // b1 shares b0's row and is already taller, so the row's max height
        // would not grow past its current value
        let mut fp = sample_floorplan();
        fp.blocks[0].bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 4.0, 1.0);
        fp.blocks[1].bb = Rect::from_ll_dims(Point::new(4.0, 0.0), 2.0, 3.0);
        assert!(enhanced_rotate(&mut fp, 0, 0));
        assert_eq!(fp.blocks[0].bb.w, 1.0);
        assert_eq!(fp.blocks[0].bb.h, 4.0);
    }

    #[test]
    fn enhanced_shape_stretches_to_neighbour_boundary() {
        let mut fp = sample_floorplan();
        fp.blocks[0].soft = true;
        fp.blocks[0].ar_min = 0.1;
        fp.blocks[0].ar_max = 10.0;
        fp.blocks[0].bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 2.0, 2.0);
        fp.blocks[1].bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 6.0, 6.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let before_area = fp.blocks[0].bb.area;
        if enhanced_shape(&mut fp, 0, 0, &mut rng) {
            assert!((fp.blocks[0].bb.area - before_area).abs() < 1e-6);
        }
    }

    #[test]
    fn exceeding_block_picks_the_block_past_the_outline() {
        let mut fp = sample_floorplan();
        fp.blocks[0].bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 2.0, 2.0);
        fp.blocks[1].bb = Rect::from_ll_dims(Point::new(2.0, 0.0), 20.0, 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let found = exceeding_block(&fp, 10.0, 10.0, &mut rng);
        // either axis draw finds block 1 exceeding on x; y never exceeds here
        if let Some((die, tuple)) = found {
            assert_eq!(fp.dies[die].cbl.tuples[tuple].block, 1);
        }
    }
}
