//! Routing-utilisation grid, half-perimeter wirelength, and the
//! wire/TSV power + Elmore delay terms that ride along with it.
//!
//! Grounded on the reference floorplanner's routing-estimate pass
//! (Meister's uniform-distribution utilisation model) and its wire/TSV
//! power and delay formulas.

use fp_core::Rect;

/// Side of the per-layer routing-utilisation grid.
pub const ROUTING_GRID_DIM: usize = 64;

pub type UtilizationGrid = Vec<Vec<f64>>;

fn empty_grid() -> UtilizationGrid {
    vec![vec![0.0; ROUTING_GRID_DIM]; ROUTING_GRID_DIM]
}

/// A net projected onto one die layer: the pins' bounding box on that
/// layer and the net's routing weight (criticality/fanout factor).
#[derive(Debug, Clone)]
pub struct NetLayerSpan {
    pub bb: Rect,
    pub weight: f64,
}

/// Technology constants the wire/TSV power and delay terms need.
#[derive(Debug, Clone, Copy)]
pub struct RoutingParams {
    pub die_w: f64,
    pub die_h: f64,
    pub die_thickness: f64,
    pub bond_thickness: f64,
    pub c_wire_per_length: f64,
    pub c_tsv: f64,
    pub r_wire_per_length: f64,
    pub r_tsv: f64,
    pub voltage: f64,
    pub frequency: f64,
}

const ALPHA_SWITCHING: f64 = 0.1;

/// Add one net's contribution into `grid`: `weight * (bbw + bbh) /
/// (bbw * bbh)` spread uniformly across every bin the net's bounding box
/// intersects (Meister's model).
pub fn accumulate_utilization(grid: &mut UtilizationGrid, net: &NetLayerSpan, die_w: f64, die_h: f64) {
    if net.bb.w <= 0.0 || net.bb.h <= 0.0 {
        return;
    }
    let density = net.weight * (net.bb.w + net.bb.h) / (net.bb.w * net.bb.h);
    let bin_w = die_w / ROUTING_GRID_DIM as f64;
    let bin_h = die_h / ROUTING_GRID_DIM as f64;

    let x0 = (net.bb.ll.x / bin_w).floor().max(0.0) as usize;
    let x1 = ((net.bb.ur.x / bin_w).ceil() as usize).min(ROUTING_GRID_DIM);
    let y0 = (net.bb.ll.y / bin_h).floor().max(0.0) as usize;
    let y1 = ((net.bb.ur.y / bin_h).ceil() as usize).min(ROUTING_GRID_DIM);

    for row in grid.iter_mut().take(y1).skip(y0) {
        for bin in row.iter_mut().take(x1).skip(x0) {
            *bin += density;
        }
    }
}

pub fn build_utilization_grid(nets: &[NetLayerSpan], die_w: f64, die_h: f64) -> UtilizationGrid {
    let mut grid = empty_grid();
    for net in nets {
        accumulate_utilization(&mut grid, net, die_w, die_h);
    }
    grid
}

/// Half-perimeter wirelength of one layer's projected net bounding box.
pub fn hpwl(bb: &Rect) -> f64 {
    bb.w + bb.h
}

/// A net spanning `layers_crossed` dies adds `(k-1) * (die_thickness +
/// bond_thickness)` of TSV-portion wirelength, where `k` is the die count.
pub fn tsv_wirelength(layers_crossed: usize, params: &RoutingParams) -> f64 {
    if layers_crossed == 0 {
        0.0
    } else {
        (layers_crossed - 1) as f64 * (params.die_thickness + params.bond_thickness)
    }
}

/// Total wirelength of a net: per-layer HPWL plus its TSV portion.
pub fn net_wirelength(per_layer_bb: &[Rect], layers_crossed: usize, params: &RoutingParams) -> f64 {
    per_layer_bb.iter().map(hpwl).sum::<f64>() + tsv_wirelength(layers_crossed, params)
}

/// `P_wire = alpha * C_wire * WL * V^2 * f`.
pub fn wire_power(wirelength: f64, params: &RoutingParams) -> f64 {
    ALPHA_SWITCHING * params.c_wire_per_length * wirelength * params.voltage * params.voltage * params.frequency
}

/// `P_tsv = alpha * C_tsv * V^2 * f` per TSV.
pub fn tsv_power(tsv_count: usize, params: &RoutingParams) -> f64 {
    ALPHA_SWITCHING * params.c_tsv * params.voltage * params.voltage * params.frequency * tsv_count as f64
}

/// Elmore delay: `0.5 * R_wire*C_wire*WL^2 + 0.5 * R_tsv*C_tsv*TSV^2`.
pub fn elmore_delay(wirelength: f64, tsv_length: f64, params: &RoutingParams) -> f64 {
    0.5 * params.r_wire_per_length * params.c_wire_per_length * wirelength * wirelength + 0.5 * params.r_tsv * params.c_tsv * tsv_length * tsv_length
}

/// Sum of utilisation across every bin of one layer's grid.
pub fn total_routing_cost(grid: &UtilizationGrid) -> f64 {
    grid.iter().flatten().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::Point;

    #[test]
    fn hpwl_is_width_plus_height() {
        let bb = Rect::from_ll_dims(Point::new(0.0, 0.0), 3.0, 4.0);
        assert_eq!(hpwl(&bb), 7.0);
    }

    #[test]
    fn tsv_wirelength_is_zero_within_one_layer() {
        let params = RoutingParams {
            die_w: 100.0,
            die_h: 100.0,
            die_thickness: 5.0,
            bond_thickness: 1.0,
            c_wire_per_length: 1.0,
            c_tsv: 1.0,
            r_wire_per_length: 1.0,
            r_tsv: 1.0,
            voltage: 1.0,
            frequency: 1.0,
        };
        assert_eq!(tsv_wirelength(1, &params), 0.0);
        assert_eq!(tsv_wirelength(2, &params), 6.0);
    }

    #[test]
    fn utilization_accumulates_inside_net_bounding_box_only() {
        let net = NetLayerSpan { bb: Rect::from_ll_dims(Point::new(0.0, 0.0), 10.0, 10.0), weight: 1.0 };
        let grid = build_utilization_grid(&[net], 64.0, 64.0);
        let covered: f64 = grid.iter().flatten().sum();
        assert!(covered > 0.0);
        assert_eq!(grid[63][63], 0.0);
    }
}
