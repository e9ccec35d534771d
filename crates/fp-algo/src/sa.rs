//! Simulated-annealing driver: adaptive three-phase cooling, two-phase
//! cost function, operator dispatch and best-solution retention.
//!
//! Grounded on the reference floorplanner's `performSA`/`updateTemp`/
//! `initSA`/`evaluateLayout` (`FloorPlanner.cpp`).

use rand::Rng;
use tracing::{debug, trace};

use fp_core::Diagnostics;

use crate::floorplan::Floorplan;
use crate::operators::{self, LastOp, OpCode};

/// `SA_REHEAT_COST_SAMPLES` from the reference schedule.
pub const REHEAT_COST_SAMPLES: usize = 3;
/// `SA_REHEAT_STD_DEV_COST_LIMIT` from the reference schedule.
pub const REHEAT_STD_DEV_COST_LIMIT: f64 = 1e-4;
/// `SA_SAMPLING_LOOP_FACTOR` from the reference schedule.
pub const SAMPLING_LOOP_FACTOR: usize = 2;

/// Which of the three cooling phases a temperature-update step landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempPhase {
    Phase1,
    Phase2,
    Phase3,
}

/// Cooling-schedule knobs (technology/SA-weights file contents).
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub temp_factor_phase1: f64,
    pub temp_factor_phase1_limit: f64,
    pub temp_factor_phase2: f64,
    pub temp_factor_phase3: f64,
    pub temp_init_factor: f64,
    pub loop_factor: f64,
    pub loop_limit: usize,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            temp_factor_phase1: 0.98,
            temp_factor_phase1_limit: 0.999,
            temp_factor_phase2: 0.95,
            temp_factor_phase3: 1.05,
            temp_init_factor: 1.5,
            loop_factor: 1.0,
            loop_limit: 1000,
        }
    }
}

/// Per-term weights for the phase-two cost function.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub area_outline: f64,
    pub wirelength: f64,
    pub routing_util: f64,
    pub tsvs: f64,
    pub alignment: f64,
    pub thermal: f64,
    pub voltage_assignment: f64,
    pub timing: f64,
    pub leakage: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            area_outline: 1.0,
            wirelength: 1.0,
            routing_util: 1.0,
            tsvs: 1.0,
            alignment: 1.0,
            thermal: 1.0,
            voltage_assignment: 1.0,
            timing: 1.0,
            leakage: 1.0,
        }
    }
}

/// Raw, un-normalised per-term costs for one layout evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostTerms {
    pub area: f64,
    pub outline: f64,
    pub wirelength: f64,
    pub routing_util: f64,
    pub tsvs: f64,
    pub alignment: f64,
    pub thermal: f64,
    pub voltage_assignment: f64,
    pub timing: f64,
    pub leakage: f64,
}

/// First-sample maxima used to normalise every term after phase one ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostNormalizers {
    pub wirelength: f64,
    pub routing_util: f64,
    pub tsvs: f64,
    pub alignment: f64,
    pub thermal: f64,
    pub voltage_assignment: f64,
    pub timing: f64,
    pub leakage: f64,
}

impl CostNormalizers {
    fn capture(terms: &CostTerms) -> Self {
        Self {
            wirelength: terms.wirelength.max(1e-9),
            routing_util: terms.routing_util.max(1e-9),
            tsvs: terms.tsvs.max(1e-9),
            alignment: terms.alignment.max(1e-9),
            thermal: terms.thermal.max(1e-9),
            voltage_assignment: terms.voltage_assignment.max(1e-9),
            timing: terms.timing.max(1e-9),
            leakage: terms.leakage.max(1e-9),
        }
    }
}

/// Blend the area and outline-mismatch sub-terms the way phase two does:
/// area weighted by `(1+fitting_ratio)/2`, outline mismatch by
/// `(1-fitting_ratio)/2`, both scaled by `weight_area_outline`.
fn area_outline_cost(terms: &CostTerms, weight: f64, fitting_ratio: f64) -> f64 {
    let area_part = terms.area * weight * 0.5 * (1.0 + fitting_ratio);
    let outline_part = terms.outline * weight * 0.5 * (1.0 - fitting_ratio);
    area_part + outline_part
}

/// Total cost of one layout evaluation. Phase one is the area/outline
/// term alone, un-normalised; phase two blends every normalised term.
pub fn total_cost(terms: &CostTerms, weights: &Weights, norm: Option<&CostNormalizers>, fitting_ratio: f64) -> f64 {
    let area_outline = area_outline_cost(terms, weights.area_outline, fitting_ratio);
    let Some(norm) = norm else {
        return area_outline;
    };
    area_outline
        + weights.wirelength * terms.wirelength / norm.wirelength
        + weights.routing_util * terms.routing_util / norm.routing_util
        + weights.tsvs * terms.tsvs / norm.tsvs
        + weights.alignment * terms.alignment / norm.alignment
        + weights.thermal * terms.thermal / norm.thermal
        + weights.voltage_assignment * terms.voltage_assignment / norm.voltage_assignment
        + weights.timing * terms.timing / norm.timing
        + weights.leakage * terms.leakage / norm.leakage
}

/// One entry of the temperature-schedule log: average step cost at that
/// temperature, kept to drive the reheat standard-deviation check.
#[derive(Debug, Clone, Copy)]
pub struct TempScheduleEntry {
    pub temperature: f64,
    pub avg_cost: f64,
    pub phase: TempPhase,
}

fn std_dev(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::INFINITY;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    var.sqrt()
}

/// Which phase a temperature update at `iteration` would land in, without
/// mutating the temperature — used mid-inner-loop to steer operator
/// selection ahead of the outer loop's actual `update_temp` call.
pub fn phase_for(iteration: usize, iteration_first_valid_layout: Option<usize>, schedule: &Schedule, recent_avg_costs: &[f64]) -> TempPhase {
    let std_dev_avg_cost = if recent_avg_costs.len() >= REHEAT_COST_SAMPLES {
        std_dev(&recent_avg_costs[recent_avg_costs.len() - REHEAT_COST_SAMPLES..])
    } else {
        REHEAT_STD_DEV_COST_LIMIT + 1.0
    };

    if std_dev_avg_cost <= REHEAT_STD_DEV_COST_LIMIT {
        TempPhase::Phase3
    } else if iteration_first_valid_layout.is_none() {
        let _ = iteration;
        TempPhase::Phase1
    } else {
        TempPhase::Phase2
    }
}

/// Update `cur_temp` in place per the three-phase schedule and return
/// which phase the update landed in.
pub fn update_temp(cur_temp: &mut f64, iteration: usize, iteration_first_valid_layout: Option<usize>, schedule: &Schedule, recent_avg_costs: &[f64]) -> TempPhase {
    let phase = phase_for(iteration, iteration_first_valid_layout, schedule, recent_avg_costs);

    match phase {
        TempPhase::Phase3 => *cur_temp *= schedule.temp_factor_phase3,
        TempPhase::Phase1 => {
            let loop_factor = (schedule.temp_factor_phase1_limit - schedule.temp_factor_phase1) * (iteration.saturating_sub(1)) as f64 / (schedule.loop_limit as f64 - 1.0).max(1.0);
            *cur_temp *= schedule.temp_factor_phase1 + loop_factor;
        }
        TempPhase::Phase2 => {
            let i_valid = iteration_first_valid_layout.unwrap_or(iteration);
            let remaining = (schedule.loop_limit as f64 - i_valid as f64).max(1.0);
            let loop_factor = 1.0 - (iteration.saturating_sub(i_valid)) as f64 / remaining;
            *cur_temp *= schedule.temp_factor_phase2 * loop_factor;
        }
    }
    phase
}

/// `innerLoopMax = |blocks|^loop_factor`.
pub fn inner_loop_max(block_count: usize, schedule: &Schedule) -> usize {
    (block_count as f64).powf(schedule.loop_factor).round().max(1.0) as usize
}

/// Sample `SA_SAMPLING_LOOP_FACTOR * |blocks|` downhill-only moves at
/// `T = 0` and return `T_0 = stdDev(samples) * temp_init_factor`.
pub fn initial_temperature(fp: &mut Floorplan, rng: &mut impl Rng, weights: &Weights, schedule: &Schedule, cost_fn: &mut impl FnMut(&mut Floorplan) -> CostTerms) -> f64 {
    let samples_target = SAMPLING_LOOP_FACTOR * fp.blocks.len().max(1);
    let mut samples = Vec::with_capacity(samples_target);
    let mut last = LastOp::default();

    fp.pack_all_dies(false);
    let mut cur_cost = total_cost(&cost_fn(fp), weights, None, 0.0);

    let mut taken = 0;
    let mut guard = 0;
    while taken < samples_target && guard < samples_target * 20 {
        guard += 1;
        let op = operators::RANDOM_POOL[rng.gen_range(0..operators::RANDOM_POOL.len())];
        if !operators::apply(op, fp, rng, true, false, false, &mut last) {
            continue;
        }
        fp.pack_all_dies(false);
        let new_cost = total_cost(&cost_fn(fp), weights, None, 0.0);
        if new_cost <= cur_cost {
            cur_cost = new_cost;
            samples.push(new_cost);
        } else {
            operators::revert(fp, &last);
            fp.pack_all_dies(false);
        }
        taken += 1;
    }

    std_dev(&samples) * schedule.temp_init_factor
}

/// Result of one full SA run: whether a fitting layout was ever found, and
/// the best fitting solution's per-die CBLs (already restored into `fp`).
#[derive(Debug, Clone)]
pub struct SaResult {
    pub valid_layout_found: bool,
    pub iteration_first_valid_layout: Option<usize>,
    pub best_cost: f64,
    pub temp_schedule: Vec<TempScheduleEntry>,
    pub diagnostics: Diagnostics,
}

/// Run the annealing outer loop to `schedule.loop_limit` temperature
/// steps. `cost_fn` regenerates cost terms for the floorplan's *current*
/// packed state (caller is expected to have packed it before calling).
pub fn run(
    fp: &mut Floorplan,
    rng: &mut impl Rng,
    weights: &Weights,
    schedule: &Schedule,
    outline_w: f64,
    outline_h: f64,
    mut cost_fn: impl FnMut(&mut Floorplan) -> CostTerms,
) -> SaResult {
    let inner_loop_max = inner_loop_max(fp.blocks.len(), schedule);
    let mut cur_temp = initial_temperature(fp, rng, weights, schedule, &mut cost_fn);

    let mut iteration_first_valid_layout: Option<usize> = None;
    let mut normalizers: Option<CostNormalizers> = None;
    let mut fitting_layouts_ratio = 0.0_f64;
    let mut recent_avg_costs: Vec<f64> = Vec::new();
    let mut best_cost = f64::INFINITY;
    let mut best_cbls: Option<Vec<fp_core::Cbl>> = None;
    let mut temp_schedule: Vec<TempScheduleEntry> = Vec::new();
    let mut diagnostics = Diagnostics::new();

    fp.pack_all_dies(false);
    let mut cur_cost = total_cost(&cost_fn(fp), weights, normalizers.as_ref(), fitting_layouts_ratio);

    let mut iteration = 1usize;
    while iteration <= schedule.loop_limit {
        let mut step_costs = Vec::with_capacity(inner_loop_max);
        let mut layout_fit_counter = 0usize;
        let mut accepted_ops = 0usize;
        let mut ii = 0usize;

        while ii <= inner_loop_max {
            let phase_three = phase_for(iteration, iteration_first_valid_layout, schedule, &recent_avg_costs) == TempPhase::Phase3;

            let has_failing_alignment = fp.alignment_requests.iter().any(|r| !r.fulfilled);
            let op = if layout_fit_counter == 0 {
                if rng.gen_bool(0.5) { OpCode::SwapBlocksEnforce } else { OpCode::MoveTuple }
            } else {
                operators::select_op(rng, phase_three, has_failing_alignment)
            };

            let mut last = LastOp::default();
            let sa_phase_one = iteration_first_valid_layout.is_none();

            let applied = if layout_fit_counter == 0 {
                // force-fit the current rightmost- or topmost-exceeding block
                // (random choice of axis) as (d1, t1) for whichever operator
                // is drawn, instead of letting the operator pick at random.
                match operators::exceeding_block(fp, outline_w, outline_h, rng) {
                    Some(forced) => operators::apply_forced(op, fp, rng, forced, sa_phase_one, true, &mut last),
                    // nothing exceeds the outline; fall back to a random draw
                    None => operators::apply(op, fp, rng, sa_phase_one, true, true, &mut last),
                }
            } else if op == OpCode::SwapAlignmentCoordinates {
                match fp.alignment_requests.iter_mut().position(|r| !r.fulfilled) {
                    Some(idx) if operators::apply_swap_alignment_coordinates(&mut fp.alignment_requests[idx]) => {
                        last = LastOp {
                            op: Some(OpCode::SwapAlignmentCoordinates),
                            tuple1: idx,
                            ..LastOp::default()
                        };
                        true
                    }
                    _ => false,
                }
            } else {
                operators::apply(op, fp, rng, sa_phase_one, true, true, &mut last)
            };

            if !applied {
                ii += 1;
                continue;
            }

            // alignment annotation/shifting only runs once phase two begins
            fp.pack_all_dies(!sa_phase_one);
            let fits = fp.placed_blocks_bounding_box().w <= outline_w && fp.placed_blocks_bounding_box().h <= outline_h;

            let new_terms = cost_fn(fp);
            let new_cost = total_cost(&new_terms, weights, normalizers.as_ref(), fitting_layouts_ratio);
            let delta = new_cost - cur_cost;

            let accept = delta <= 0.0 || rng.gen::<f64>() < (-delta / cur_temp.max(1e-12)).exp();
            trace!(iteration, op = ?op, delta, accept, temperature = cur_temp, "sa step");

            if accept {
                cur_cost = new_cost;
                accepted_ops += 1;
                if fits {
                    layout_fit_counter += 1;
                }
                step_costs.push(new_cost);

                if fits && iteration_first_valid_layout.is_none() {
                    iteration_first_valid_layout = Some(iteration);
                    normalizers = Some(CostNormalizers::capture(&new_terms));
                    debug!(iteration, cost = new_cost, "first fitting layout found, entering phase two");
                    ii = inner_loop_max + 1;
                    continue;
                }

                if fits && new_cost < best_cost {
                    best_cost = new_cost;
                    best_cbls = Some(fp.dies.iter().map(|d| d.cbl.clone()).collect());
                    for block in &mut fp.blocks {
                        block.bb_best = block.bb;
                    }
                    debug!(iteration, cost = best_cost, "new best fitting layout");
                }
            } else {
                operators::revert(fp, &last);
                fp.pack_all_dies(!sa_phase_one);
            }

            ii += 1;
        }

        fitting_layouts_ratio = if accepted_ops > 0 { layout_fit_counter as f64 / accepted_ops as f64 } else { 0.0 };
        let avg_cost = if step_costs.is_empty() { cur_cost } else { step_costs.iter().sum::<f64>() / step_costs.len() as f64 };
        recent_avg_costs.push(avg_cost);

        let phase = update_temp(&mut cur_temp, iteration, iteration_first_valid_layout, schedule, &recent_avg_costs);
        if phase == TempPhase::Phase3 {
            debug!(iteration, temperature = cur_temp, "reheat triggered");
            diagnostics.add_warning_at_iteration("sa", "cost converged below reheat threshold, reheating", iteration);
        }
        temp_schedule.push(TempScheduleEntry { temperature: cur_temp, avg_cost, phase });

        iteration += 1;
    }

    if iteration_first_valid_layout.is_none() {
        diagnostics.add_error("sa", "no layout fitting the outline was found within loop_limit iterations");
    }

    if let Some(cbls) = best_cbls {
        for (die, cbl) in fp.dies.iter_mut().zip(cbls) {
            die.cbl = cbl;
        }
        for block in &mut fp.blocks {
            block.bb = block.bb_best;
        }
    }

    SaResult {
        valid_layout_found: iteration_first_valid_layout.is_some(),
        iteration_first_valid_layout,
        best_cost,
        temp_schedule,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{Block, Direction, Rect, Tuple};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_floorplan() -> Floorplan {
        let mut fp = Floorplan::new(1);
        let b0 = Block::new("B0", 0, 4.0, 1.0, 1.0);
        let b1 = Block::new("B1", 1, 4.0, 1.0, 1.0);
        fp.blocks = vec![b0, b1];
        fp.dies[0].cbl.push(Tuple { block: 0, dir: Direction::Horizontal, junctions: 0 });
        fp.dies[0].cbl.push(Tuple { block: 1, dir: Direction::Horizontal, junctions: 0 });
        fp
    }

    fn area_cost(fp: &mut Floorplan) -> CostTerms {
        let bb = Rect::bounding_box_many(&fp.blocks.iter().map(|b| b.bb).collect::<Vec<_>>());
        CostTerms {
            area: bb.area,
            outline: (bb.w - 10.0).max(0.0) + (bb.h - 10.0).max(0.0),
            ..Default::default()
        }
    }

    #[test]
    fn inner_loop_max_matches_power_law() {
        let schedule = Schedule { loop_factor: 2.0, ..Default::default() };
        assert_eq!(inner_loop_max(5, &schedule), 25);
    }

    #[test]
    fn phase_one_before_any_valid_layout() {
        let schedule = Schedule::default();
        let mut temp = 10.0;
        let phase = update_temp(&mut temp, 5, None, &schedule, &[]);
        assert_eq!(phase, TempPhase::Phase1);
    }

    #[test]
    fn reheat_triggers_on_converged_cost_samples() {
        let schedule = Schedule::default();
        let mut temp = 10.0;
        let flat = vec![1.0, 1.0, 1.0];
        let phase = update_temp(&mut temp, 50, Some(10), &schedule, &flat);
        assert_eq!(phase, TempPhase::Phase3);
    }

    #[test]
    fn sa_run_does_not_panic_on_a_tiny_floorplan() {
        let mut fp = sample_floorplan();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let schedule = Schedule { loop_limit: 3, ..Default::default() };
        let weights = Weights::default();
        let result = run(&mut fp, &mut rng, &weights, &schedule, 100.0, 100.0, area_cost);
        assert!(result.best_cost.is_finite() || !result.valid_layout_found);
    }

    #[test]
    fn sa_run_drives_the_force_fit_path_when_nothing_ever_fits() {
        // an outline this small is never satisfiable, so layout_fit_counter
        // stays zero every step and every draw takes the exceeding_block /
        // apply_forced path instead of a random operator
        let mut fp = sample_floorplan();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let schedule = Schedule { loop_limit: 3, ..Default::default() };
        let weights = Weights::default();
        let result = run(&mut fp, &mut rng, &weights, &schedule, 0.1, 0.1, area_cost);
        assert!(!result.valid_layout_found);
    }
}
