//! Alignment engine: evaluates one request against the two blocks' current
//! geometry, annotates fail-direction tags, and (during layout generation)
//! shifts the block about to be placed so the request can be honoured.
//!
//! Grounded on the reference floorplanner's `CorblivarAlignmentReq::evaluate`
//! and `shiftCurrentBlock`/`rebuildPlacementStacks`.

use fp_core::{AlignmentRequest, AlignmentStatus, Block, PartialType, Rect};

use crate::packer::{self, Die};

/// Outcome of evaluating one request: the scalar cost (`0.0` iff fulfilled)
/// already weighted by `signals`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub cost: f64,
}

/// Evaluate `req` against `blocks`, updating `req.fulfilled` and the
/// `alignment_status` tag on both participating blocks.
pub fn evaluate(req: &mut AlignmentRequest, blocks: &mut [Block]) -> Evaluation {
    let mut cost = 0.0;
    req.fulfilled = true;
    blocks[req.s_i].alignment_status = AlignmentStatus::Success;
    blocks[req.s_j].alignment_status = AlignmentStatus::Success;

    let intersect = if req.range_x() || req.range_y() {
        Rect::determine_intersection(&blocks[req.s_i].bb, &blocks[req.s_j].bb)
    } else {
        Rect::empty()
    };
    let bb = if req.range_max_x() || req.range_max_y() {
        Rect::bounding_box_centers(&blocks[req.s_i].bb, &blocks[req.s_j].bb)
    } else {
        Rect::empty()
    };

    evaluate_horizontal(req, blocks, &intersect, &bb, &mut cost);
    evaluate_vertical(req, blocks, &intersect, &bb, &mut cost);

    cost *= req.signals as f64;
    req.fulfilled = cost == 0.0;
    Evaluation { cost }
}

fn evaluate_horizontal(req: &AlignmentRequest, blocks: &mut [Block], intersect: &Rect, bb: &Rect, cost: &mut f64) {
    let (i, j) = (req.s_i, req.s_j);

    if req.range_x() {
        if intersect.w < req.alignment_x {
            *cost += req.alignment_x - intersect.w;
            if intersect.w == 0.0 {
                if Rect::left_of(&blocks[i].bb, &blocks[j].bb, false) {
                    *cost += blocks[j].bb.ll.x - blocks[i].bb.ur.x;
                    blocks[i].alignment_status = AlignmentStatus::FailHorTooLeft;
                    blocks[j].alignment_status = AlignmentStatus::FailHorTooRight;
                } else {
                    *cost += blocks[i].bb.ll.x - blocks[j].bb.ur.x;
                    blocks[i].alignment_status = AlignmentStatus::FailHorTooRight;
                    blocks[j].alignment_status = AlignmentStatus::FailHorTooLeft;
                }
            }
        }
    } else if req.range_max_x() {
        if bb.w > req.alignment_x {
            *cost += bb.w - req.alignment_x;
            if blocks[i].bb.ll.x < blocks[j].bb.ll.x {
                blocks[i].alignment_status = AlignmentStatus::FailHorTooLeft;
                blocks[j].alignment_status = AlignmentStatus::FailHorTooRight;
            } else {
                blocks[i].alignment_status = AlignmentStatus::FailHorTooRight;
                blocks[j].alignment_status = AlignmentStatus::FailHorTooLeft;
            }
        }
    } else if req.offset_x() {
        let actual = blocks[j].bb.ll.x - blocks[i].bb.ll.x;
        if !fp_core::double_eq(actual, req.alignment_x, fp_core::EPSILON) {
            if req.alignment_x >= 0.0 {
                if blocks[j].bb.ll.x > blocks[i].bb.ll.x {
                    let mismatch = actual - req.alignment_x;
                    *cost += mismatch.abs();
                    if mismatch < 0.0 {
                        blocks[i].alignment_status = AlignmentStatus::FailHorTooRight;
                        blocks[j].alignment_status = AlignmentStatus::FailHorTooLeft;
                    } else {
                        blocks[i].alignment_status = AlignmentStatus::FailHorTooLeft;
                        blocks[j].alignment_status = AlignmentStatus::FailHorTooRight;
                    }
                } else {
                    *cost += blocks[i].bb.ll.x - blocks[j].bb.ll.x + req.alignment_x;
                    blocks[i].alignment_status = AlignmentStatus::FailHorTooRight;
                    blocks[j].alignment_status = AlignmentStatus::FailHorTooLeft;
                }
            } else if blocks[j].bb.ll.x < blocks[i].bb.ll.x {
                let mismatch = blocks[i].bb.ll.x - blocks[j].bb.ll.x + req.alignment_x;
                *cost += mismatch.abs();
                if mismatch < 0.0 {
                    blocks[i].alignment_status = AlignmentStatus::FailHorTooLeft;
                    blocks[j].alignment_status = AlignmentStatus::FailHorTooRight;
                } else {
                    blocks[i].alignment_status = AlignmentStatus::FailHorTooRight;
                    blocks[j].alignment_status = AlignmentStatus::FailHorTooLeft;
                }
            } else {
                *cost += blocks[j].bb.ll.x - blocks[i].bb.ll.x - req.alignment_x;
                blocks[i].alignment_status = AlignmentStatus::FailHorTooLeft;
                blocks[j].alignment_status = AlignmentStatus::FailHorTooRight;
            }
        }
    }
}

fn evaluate_vertical(req: &AlignmentRequest, blocks: &mut [Block], intersect: &Rect, bb: &Rect, cost: &mut f64) {
    let (i, j) = (req.s_i, req.s_j);

    if req.range_y() {
        if intersect.h < req.alignment_y {
            *cost += req.alignment_y - intersect.h;
            if intersect.h == 0.0 {
                if Rect::below(&blocks[i].bb, &blocks[j].bb, false) {
                    *cost += blocks[j].bb.ll.y - blocks[i].bb.ur.y;
                    blocks[i].alignment_status = AlignmentStatus::FailVertTooLow;
                    blocks[j].alignment_status = AlignmentStatus::FailVertTooHigh;
                } else {
                    *cost += blocks[i].bb.ll.y - blocks[j].bb.ur.y;
                    blocks[i].alignment_status = AlignmentStatus::FailVertTooHigh;
                    blocks[j].alignment_status = AlignmentStatus::FailVertTooLow;
                }
            }
        }
    } else if req.range_max_y() {
        if bb.h > req.alignment_y {
            *cost += bb.h - req.alignment_y;
            if blocks[i].bb.ll.y < blocks[j].bb.ll.y {
                blocks[i].alignment_status = AlignmentStatus::FailVertTooLow;
                blocks[j].alignment_status = AlignmentStatus::FailVertTooHigh;
            } else {
                blocks[i].alignment_status = AlignmentStatus::FailVertTooHigh;
                blocks[j].alignment_status = AlignmentStatus::FailVertTooLow;
            }
        }
    } else if req.offset_y() {
        let actual = blocks[j].bb.ll.y - blocks[i].bb.ll.y;
        if !fp_core::double_eq(actual, req.alignment_y, fp_core::EPSILON) {
            if req.alignment_y >= 0.0 {
                if blocks[j].bb.ll.y > blocks[i].bb.ll.y {
                    let mismatch = actual - req.alignment_y;
                    *cost += mismatch.abs();
                    if mismatch < 0.0 {
                        blocks[i].alignment_status = AlignmentStatus::FailVertTooHigh;
                        blocks[j].alignment_status = AlignmentStatus::FailVertTooLow;
                    } else {
                        blocks[i].alignment_status = AlignmentStatus::FailVertTooLow;
                        blocks[j].alignment_status = AlignmentStatus::FailVertTooHigh;
                    }
                } else {
                    *cost += blocks[i].bb.ll.y - blocks[j].bb.ll.y + req.alignment_y;
                    blocks[i].alignment_status = AlignmentStatus::FailVertTooHigh;
                    blocks[j].alignment_status = AlignmentStatus::FailVertTooLow;
                }
            } else if blocks[j].bb.ll.y < blocks[i].bb.ll.y {
                let mismatch = blocks[i].bb.ll.y - blocks[j].bb.ll.y + req.alignment_y;
                *cost += mismatch.abs();
                if mismatch < 0.0 {
                    blocks[i].alignment_status = AlignmentStatus::FailVertTooLow;
                    blocks[j].alignment_status = AlignmentStatus::FailVertTooHigh;
                } else {
                    blocks[i].alignment_status = AlignmentStatus::FailVertTooHigh;
                    blocks[j].alignment_status = AlignmentStatus::FailVertTooLow;
                }
            } else {
                *cost += blocks[j].bb.ll.y - blocks[i].bb.ll.y - req.alignment_y;
                blocks[i].alignment_status = AlignmentStatus::FailVertTooLow;
                blocks[j].alignment_status = AlignmentStatus::FailVertTooHigh;
            }
        }
    }
}

/// Whether `block` (the tuple the packer just placed) participates as
/// `s_j` in `req` with `s_i` already placed, in which case the packer
/// shifts it into alignment before moving on.
pub fn active_request_for<'a>(reqs: &'a mut [AlignmentRequest], block: usize, blocks: &[Block]) -> Option<&'a mut AlignmentRequest> {
    reqs.iter_mut().find(|r| r.s_j == block && blocks[r.s_i].placed)
}

/// Attempt to shift the about-to-be-placed block `req.s_j` so that `req` is
/// satisfied, first as a dry run (no mutation) to check feasibility, then for
/// real if feasible. On success, the die's placement stacks are rebuilt.
/// Returns whether a shift was applied.
pub fn shift_current_block(req: &AlignmentRequest, die: &mut Die, blocks: &mut [Block], cur_dir: fp_core::Direction) -> bool {
    let target = req.s_j;

    let desired = match (req.type_x, req.type_y) {
        (PartialType::Offset, _) => Some((blocks[req.s_i].bb.ll.x + req.alignment_x, None)),
        (_, PartialType::Offset) => Some((blocks[req.s_j].bb.ll.x, Some(blocks[req.s_i].bb.ll.y + req.alignment_y))),
        _ => None,
    };

    let Some((desired_x, desired_y)) = desired else {
        return false;
    };

    // dry run: would the shifted position overlap an already-placed block
    // that the packer cannot yet see as a stack neighbour?
    let w = blocks[target].bb.w;
    let h = blocks[target].bb.h;
    let candidate = Rect::from_ll_dims(fp_core::Point::new(desired_x, desired_y.unwrap_or(blocks[target].bb.ll.y)), w, h);

    let blocked = (0..blocks.len())
        .filter(|&b| b != target && blocks[b].placed)
        .any(|b| Rect::rects_intersect(&candidate, &blocks[b].bb));

    if blocked {
        // infeasible shift; evaluate() will record the resulting mismatch as
        // cost and tag the blocks, regardless of STRICT/FLEXIBLE handling
        return false;
    }

    blocks[target].bb = candidate;

    packer::rebuild_placement_stacks(die, blocks, target, cur_dir, &[]);

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{Handling, Point};

    fn block(id: usize, w: f64, h: f64, x: f64, y: f64) -> Block {
        let mut b = Block::new(format!("B{id}"), id, w * h, 0.1, 10.0);
        b.bb = Rect::from_ll_dims(Point::new(x, y), w, h);
        b.placed = true;
        b
    }

    #[test]
    fn offset_request_satisfied_is_zero_cost() {
        let mut blocks = vec![block(0, 4.0, 2.0, 0.0, 0.0), block(1, 3.0, 3.0, 4.0, 0.0)];
        let mut req = AlignmentRequest::new(0, Handling::Strict, 1, 0, 1, PartialType::Offset, 4.0, PartialType::Offset, 0.0);

        let eval = evaluate(&mut req, &mut blocks);

        assert_eq!(eval.cost, 0.0);
        assert!(req.fulfilled);
        assert_eq!(blocks[0].alignment_status, AlignmentStatus::Success);
    }

    #[test]
    fn offset_mismatch_tags_blocks_and_costs() {
        let mut blocks = vec![block(0, 4.0, 2.0, 0.0, 0.0), block(1, 3.0, 3.0, 10.0, 0.0)];
        let mut req = AlignmentRequest::new(0, Handling::Strict, 2, 0, 1, PartialType::Offset, 4.0, PartialType::Undef, 0.0);

        let eval = evaluate(&mut req, &mut blocks);

        assert!(eval.cost > 0.0);
        assert!(!req.fulfilled);
        assert_eq!(blocks[0].alignment_status, AlignmentStatus::FailHorTooLeft);
        assert_eq!(blocks[1].alignment_status, AlignmentStatus::FailHorTooRight);
    }

    #[test]
    fn min_overlap_satisfied_reports_zero_cost() {
        let mut blocks = vec![block(0, 4.0, 4.0, 0.0, 0.0), block(1, 4.0, 4.0, 1.0, 1.0)];
        let mut req = AlignmentRequest::new(0, Handling::Strict, 1, 0, 1, PartialType::Min, 2.0, PartialType::Min, 2.0);

        let eval = evaluate(&mut req, &mut blocks);

        assert_eq!(eval.cost, 0.0);
        assert!(req.fulfilled);
    }
}
