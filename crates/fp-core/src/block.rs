//! [`Block`]: a placeable circuit block plus the small supporting types
//! (alignment status, voltage feasibility bitset, TSV islands).

use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Upper bound on distinct supply voltages a technology offers.
pub const MAX_VOLTAGES: usize = 4;

/// Bitset over at most [`MAX_VOLTAGES`] voltage levels, index 0 = lowest
/// voltage, `len - 1` = highest. Bit *k* set means voltage *k* meets the
/// delay slack for whatever block/module it's attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoltageBitset(pub u8);

impl VoltageBitset {
    pub fn empty() -> Self {
        Self(0)
    }

    /// A bitset with only the highest of `levels` voltages set; the
    /// invariant every block/module must satisfy by default.
    pub fn only_highest(levels: usize) -> Self {
        debug_assert!(levels > 0 && levels <= MAX_VOLTAGES);
        Self(1 << (levels - 1))
    }

    pub fn set(&mut self, index: usize) {
        self.0 |= 1 << index;
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Index of the lowest set bit, i.e. the cheapest feasible voltage.
    pub fn min_index(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Index of the highest set bit.
    pub fn max_index(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(7 - self.0.leading_zeros() as usize)
        }
    }

    pub fn intersect(&self, other: &VoltageBitset) -> VoltageBitset {
        VoltageBitset(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Alignment outcome tag on a block, consumed by the alignment-guided
/// operators and the compactor (successfully-aligned blocks are pinned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlignmentStatus {
    #[default]
    Undef,
    Success,
    FailHorTooLeft,
    FailHorTooRight,
    FailVertTooLow,
    FailVertTooHigh,
}

/// A contiguous neighbour relation used by the voltage-assignment engine:
/// `peer` shares `common_boundary_h`/`common_boundary_v` microns of boundary
/// with the owning block (exactly one of the two is nonzero, depending on
/// whether the abutment is a vertical or horizontal edge).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContiguousNeighbour {
    pub peer: usize,
    pub common_boundary_h: f64,
    pub common_boundary_v: f64,
}

/// Per-voltage technology parameters for a block: how power density and
/// delay scale at each supported voltage level, indexed the same way as
/// [`VoltageBitset`] (0 = lowest, last = highest/nominal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageParams {
    pub voltages: Vec<f64>,
    pub power_factor: Vec<f64>,
    pub delay_factor: Vec<f64>,
}

impl VoltageParams {
    pub fn single(voltage: f64) -> Self {
        Self {
            voltages: vec![voltage],
            power_factor: vec![1.0],
            delay_factor: vec![1.0],
        }
    }

    pub fn levels(&self) -> usize {
        self.voltages.len()
    }
}

/// A rectangular circuit block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub numerical_id: usize,
    pub ar_min: f64,
    pub ar_max: f64,
    pub soft: bool,
    pub floorplacement: bool,
    pub power_density_unscaled: f64,
    pub voltage_params: VoltageParams,
    pub base_delay: f64,
    pub net_delay_max: f64,

    pub bb: Rect,
    pub bb_backup: Rect,
    pub bb_best: Rect,
    pub layer: i32,
    pub placed: bool,
    pub rotatable: bool,
    pub alignment_status: AlignmentStatus,
    pub feasible_voltages: VoltageBitset,
    pub assigned_voltage_index: usize,
    pub assigned_module: Option<usize>,
    pub contiguous_neighbours: Vec<ContiguousNeighbour>,
}

impl Block {
    pub fn new(id: impl Into<String>, numerical_id: usize, area: f64, ar_min: f64, ar_max: f64) -> Self {
        let w = area.sqrt();
        let h = if w > 0.0 { area / w } else { 0.0 };
        let bb = Rect::from_ll_dims(Point::new(0.0, 0.0), w, h);
        Self {
            id: id.into(),
            numerical_id,
            ar_min,
            ar_max,
            soft: false,
            floorplacement: false,
            power_density_unscaled: 0.0,
            voltage_params: VoltageParams::single(1.0),
            base_delay: 0.0,
            net_delay_max: 0.0,
            bb,
            bb_backup: bb,
            bb_best: bb,
            layer: -1,
            placed: false,
            rotatable: true,
            alignment_status: AlignmentStatus::Undef,
            feasible_voltages: VoltageBitset::only_highest(1),
            assigned_voltage_index: 0,
            assigned_module: None,
            contiguous_neighbours: Vec::new(),
        }
    }

    /// Reset voltage feasibility/assignment to "only the highest voltage
    /// works"; the safe default before [`Block::set_feasible_voltages`] runs.
    pub fn reset_voltage_assignment(&mut self) {
        let levels = self.voltage_params.levels();
        self.feasible_voltages = VoltageBitset::only_highest(levels);
        self.assigned_voltage_index = levels - 1;
    }

    /// Walk down from the highest voltage, marking each as feasible while
    /// the resulting delay (plus this block's worst downstream net delay)
    /// stays within `delay_threshold`.
    pub fn set_feasible_voltages(&mut self, delay_threshold: f64) {
        let levels = self.voltage_params.levels();
        let mut index = levels - 1;
        self.feasible_voltages = VoltageBitset::only_highest(levels);
        while index > 0 {
            let candidate_delay = self.base_delay * self.voltage_params.delay_factor[index - 1] + self.net_delay_max;
            if candidate_delay <= delay_threshold {
                index -= 1;
                self.feasible_voltages.set(index);
            } else {
                break;
            }
        }
    }

    pub fn power_density_at(&self, index: usize) -> f64 {
        self.power_density_unscaled * self.voltage_params.power_factor[index]
    }

    pub fn power_density(&self) -> f64 {
        self.power_density_at(self.assigned_voltage_index)
    }

    pub fn power_density_max(&self) -> f64 {
        self.power_density_unscaled * self.voltage_params.power_factor.last().copied().unwrap_or(1.0)
    }

    /// Power in microwatts at the assigned voltage: `density * area * 1e-6`.
    pub fn power(&self) -> f64 {
        self.power_density() * self.bb.area * 1e-6
    }

    pub fn delay(&self) -> f64 {
        self.base_delay * self.voltage_params.delay_factor[self.assigned_voltage_index]
    }

    pub fn voltage(&self) -> f64 {
        self.voltage_params.voltages[self.assigned_voltage_index]
    }

    pub fn voltage_max(&self) -> f64 {
        *self.voltage_params.voltages.last().unwrap_or(&0.0)
    }

    /// Simple rotate: swap w/h. No-op (returns false) if not rotatable.
    pub fn rotate(&mut self) -> bool {
        if self.rotatable {
            std::mem::swap(&mut self.bb.w, &mut self.bb.h);
            self.bb.ur = Point::new(self.bb.ll.x + self.bb.w, self.bb.ll.y + self.bb.h);
            self.bb.area = self.bb.w * self.bb.h;
            true
        } else {
            false
        }
    }

    /// Reshape within `[ar_min, ar_max]` preserving area; soft blocks only.
    pub fn shape_randomly_by_ar(&mut self, ar_sample: f64) -> bool {
        if !self.soft {
            return false;
        }
        let ar = ar_sample.clamp(self.ar_min, self.ar_max);
        let w = (ar * self.bb.area).sqrt();
        let h = self.bb.area / w;
        self.bb.w = w;
        self.bb.h = h;
        self.bb.ur = Point::new(self.bb.ll.x + w, self.bb.ll.y + h);
        true
    }

    /// Reshape to explicit `(width, height)` if the resulting AR is allowed
    /// and the block may be resized at all.
    pub fn shape_by_width_height(&mut self, width: f64, height: f64) -> bool {
        let ar = width / height;
        if self.soft && self.rotatable && self.ar_min <= ar && ar <= self.ar_max {
            self.bb.w = width;
            self.bb.h = height;
            self.bb.ur = Point::new(self.bb.ll.x + width, self.bb.ll.y + height);
            self.bb.area = width * height;
            true
        } else {
            false
        }
    }

    pub fn backup_bb(&mut self) {
        self.bb_backup = self.bb;
    }

    pub fn restore_bb(&mut self) {
        self.bb = self.bb_backup;
    }
}

/// A TSV island: a sub-type of block carrying a TSV count instead of
/// power/voltage attributes. Shape derives from `sqrt(count)` rounded up in
/// both dimensions, aspect-ratio-adjusted toward the parent bounding box
/// within `[0.5, 2.0]`, then scaled by the technology's TSV pitch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsvIsland {
    pub id: String,
    pub tsvs_count: usize,
    pub layer: usize,
    pub bb: Rect,
}

impl TsvIsland {
    /// Derive a TSV island's footprint for `count` TSVs at `pitch` pitch,
    /// aspect-ratio-adjusted toward `parent_bb`'s own aspect ratio.
    pub fn shape_for(id: impl Into<String>, layer: usize, count: usize, pitch: f64, parent_bb: &Rect) -> Self {
        let side = (count as f64).sqrt().ceil();
        let mut ar = if parent_bb.h > 0.0 { parent_bb.w / parent_bb.h } else { 1.0 };
        ar = ar.clamp(0.5, 2.0);
        let w = (side * ar.sqrt()).ceil() * pitch;
        let h = (side / ar.sqrt()).ceil() * pitch;
        Self {
            id: id.into(),
            tsvs_count: count,
            layer,
            bb: Rect::from_ll_dims(parent_bb.ll, w.max(pitch), h.max(pitch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_block_has_square_footprint_matching_area() {
        let b = Block::new("B1", 0, 16.0, 1.0, 1.0);
        assert!((b.bb.area - 16.0).abs() < 1e-9);
        assert!((b.bb.w - 4.0).abs() < 1e-9);
    }

    #[test]
    fn voltage_bitset_highest_always_set() {
        let bs = VoltageBitset::only_highest(4);
        assert!(bs.is_set(3));
        assert_eq!(bs.count(), 1);
        assert_eq!(bs.min_index(), Some(3));
    }

    #[test]
    fn feasible_voltages_respect_delay_threshold() {
        let mut b = Block::new("B1", 0, 4.0, 1.0, 1.0);
        b.base_delay = 1.0;
        b.voltage_params = VoltageParams {
            voltages: vec![0.8, 0.9, 1.0, 1.1],
            power_factor: vec![0.5, 0.7, 0.85, 1.0],
            delay_factor: vec![2.0, 1.5, 1.2, 1.0],
        };
        b.net_delay_max = 0.0;
        // threshold allows delay_factor 1.5 (1.5ns) but not 2.0 (2.0ns)
        b.set_feasible_voltages(1.6);
        assert!(b.feasible_voltages.is_set(3));
        assert!(b.feasible_voltages.is_set(1));
        assert!(!b.feasible_voltages.is_set(0));
    }

    #[test]
    fn shape_randomly_preserves_area() {
        let mut b = Block::new("B1", 0, 9.0, 0.5, 2.0);
        b.soft = true;
        b.shape_randomly_by_ar(1.5);
        assert!((b.bb.w * b.bb.h - 9.0).abs() < 1e-6);
        let ar = b.bb.w / b.bb.h;
        assert!(ar >= 0.5 - 1e-6 && ar <= 2.0 + 1e-6);
    }

    #[test]
    fn hard_block_rotate_swaps_dims() {
        let mut b = Block::new("B1", 0, 8.0, 1.0, 1.0);
        b.bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 4.0, 2.0);
        assert!(b.rotate());
        assert_eq!(b.bb.w, 2.0);
        assert_eq!(b.bb.h, 4.0);
    }

    #[test]
    fn non_rotatable_block_rejects_rotate() {
        let mut b = Block::new("B1", 0, 8.0, 1.0, 1.0);
        b.rotatable = false;
        assert!(!b.rotate());
    }

    #[test]
    fn tsv_island_shape_scales_with_pitch() {
        let parent = Rect::from_ll_dims(Point::new(0.0, 0.0), 10.0, 10.0);
        let island = TsvIsland::shape_for("tsv0", 0, 9, 2.0, &parent);
        assert!(island.bb.w > 0.0 && island.bb.h > 0.0);
        assert_eq!(island.tsvs_count, 9);
    }
}
