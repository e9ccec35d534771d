//! Alignment-request data model: the per-pair constraint record consumed and
//! annotated by the alignment engine ([`crate`] only holds the data; the
//! engine itself lives in `fp-algo` since it needs to walk dies/CBLs).

use serde::{Deserialize, Serialize};

/// Kind of a single-axis partial alignment constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialType {
    Undef,
    /// Fixed offset `s_j.ll - s_i.ll == alignment` (sign gives direction).
    Offset,
    /// Minimum required overlap/intersection width.
    Min,
    /// Maximum allowed bounding-box extent (distance range).
    Max,
}

/// How strictly a request must be honoured; consumed by the layout
/// generator to decide whether to attempt a corrective shift at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handling {
    Strict,
    Flexible,
}

/// One alignment request between two blocks, with independent X/Y partial
/// constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentRequest {
    pub id: i32,
    pub handling: Handling,
    pub signals: i32,
    pub s_i: usize,
    pub s_j: usize,
    pub type_x: PartialType,
    pub alignment_x: f64,
    pub type_y: PartialType,
    pub alignment_y: f64,
    pub fulfilled: bool,
}

impl AlignmentRequest {
    pub fn new(
        id: i32,
        handling: Handling,
        signals: i32,
        s_i: usize,
        s_j: usize,
        type_x: PartialType,
        mut alignment_x: f64,
        type_y: PartialType,
        mut alignment_y: f64,
    ) -> Self {
        // negative ranges are meaningless except for OFFSET, where sign
        // encodes direction; trivially resolve a stray negative range
        if alignment_x < 0.0 && type_x != PartialType::Offset {
            alignment_x = alignment_x.abs();
        }
        if alignment_y < 0.0 && type_y != PartialType::Offset {
            alignment_y = alignment_y.abs();
        }

        Self {
            id,
            handling,
            signals,
            s_i,
            s_j,
            type_x,
            alignment_x,
            type_y,
            alignment_y,
            fulfilled: false,
        }
    }

    pub fn range_x(&self) -> bool {
        self.type_x == PartialType::Min && self.alignment_x != 0.0
    }

    pub fn range_y(&self) -> bool {
        self.type_y == PartialType::Min && self.alignment_y != 0.0
    }

    pub fn range_max_x(&self) -> bool {
        self.type_x == PartialType::Max && self.alignment_x != 0.0
    }

    pub fn range_max_y(&self) -> bool {
        self.type_y == PartialType::Max && self.alignment_y != 0.0
    }

    pub fn offset_x(&self) -> bool {
        self.type_x == PartialType::Offset
    }

    pub fn offset_y(&self) -> bool {
        self.type_y == PartialType::Offset
    }

    /// A vertical bus: MIN-overlap in both axes, zero-offset in both axes,
    /// or nonzero offset in both axes small enough that the two blocks still
    /// partially overlap on every die they both occupy.
    pub fn vertical_bus(&self, width_i: f64, width_j: f64, height_i: f64, height_j: f64) -> bool {
        let min_overlap_both = self.range_x() && self.range_y();
        let zero_offset_both = self.offset_x() && self.alignment_x == 0.0 && self.offset_y() && self.alignment_y == 0.0;
        let nonzero_offset_both = self.offset_x()
            && self.alignment_x != 0.0
            && self.offset_y()
            && self.alignment_y != 0.0
            && {
                let x_ok = if self.alignment_x > 0.0 {
                    self.alignment_x < width_i
                } else {
                    self.alignment_x > -width_j
                };
                let y_ok = if self.alignment_y > 0.0 {
                    self.alignment_y < height_i
                } else {
                    self.alignment_y > -height_j
                };
                x_ok && y_ok
            };

        min_overlap_both || zero_offset_both || nonzero_offset_both
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_range_is_made_absolute() {
        let req = AlignmentRequest::new(0, Handling::Strict, 1, 0, 1, PartialType::Min, -2.0, PartialType::Undef, 0.0);
        assert_eq!(req.alignment_x, 2.0);
    }

    #[test]
    fn negative_offset_is_preserved() {
        let req = AlignmentRequest::new(0, Handling::Strict, 1, 0, 1, PartialType::Offset, -2.0, PartialType::Undef, 0.0);
        assert_eq!(req.alignment_x, -2.0);
    }

    #[test]
    fn vertical_bus_detects_min_overlap_both_axes() {
        let req = AlignmentRequest::new(0, Handling::Strict, 1, 0, 1, PartialType::Min, 2.0, PartialType::Min, 2.0);
        assert!(req.vertical_bus(4.0, 4.0, 4.0, 4.0));
    }

    #[test]
    fn vertical_bus_false_for_single_axis_overlap() {
        let req = AlignmentRequest::new(0, Handling::Strict, 1, 0, 1, PartialType::Min, 2.0, PartialType::Undef, 0.0);
        assert!(!req.vertical_bus(4.0, 4.0, 4.0, 4.0));
    }
}
