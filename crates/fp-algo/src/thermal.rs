//! Power-blurring thermal analyser: padded power maps, per-layer 1-D
//! Gaussian masks, separable convolution into a 64x64 thermal map.
//!
//! Grounded on the reference floorplanner's thermal-analysis pass
//! (power-map construction plus the `ThermalAnalyzer` convolution code).

use fp_core::{Block, Rect, TsvIsland};
#[cfg(feature = "desktop")]
use rayon::prelude::*;

/// Side of the (non-padded) thermal map.
pub const THERMAL_MAP_DIM: usize = 64;
/// Length of each 1-D Gaussian mask; also the padding width on every side
/// of the power map (`padding = (THERMAL_MASK_DIM - 1) / 2`).
pub const THERMAL_MASK_DIM: usize = 11;
/// Side of the padded power map: `THERMAL_MAP_DIM + THERMAL_MASK_DIM - 1`.
pub const POWER_MAPS_DIM: usize = THERMAL_MAP_DIM + THERMAL_MASK_DIM - 1;

const PADDING_BINS: usize = (THERMAL_MASK_DIM - 1) / 2;

/// Technology/SA parameters the thermal analyser needs.
#[derive(Debug, Clone, Copy)]
pub struct ThermalParams {
    pub die_w: f64,
    pub die_h: f64,
    pub impulse_factor: f64,
    pub impulse_factor_scaling_exponent: f64,
    pub mask_boundary_value: f64,
    pub power_density_scaling_padding_zone: f64,
    pub power_density_scaling_tsv_region: f64,
    pub temp_offset: f64,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            die_w: 1000.0,
            die_h: 1000.0,
            impulse_factor: 1.0,
            impulse_factor_scaling_exponent: 2.0,
            mask_boundary_value: 1e-4,
            power_density_scaling_padding_zone: 1.2,
            power_density_scaling_tsv_region: 0.9,
            temp_offset: 300.0,
        }
    }
}

/// One bin of a layer's power map: accumulated power density and the
/// fraction of TSV-island coverage (0..=100).
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerBin {
    pub power_density: f64,
    pub tsv_density: f64,
}

pub type PowerMap = Vec<Vec<PowerBin>>;
pub type ThermalMap = Vec<Vec<f64>>;

fn empty_power_map() -> PowerMap {
    vec![vec![PowerBin::default(); POWER_MAPS_DIM]; POWER_MAPS_DIM]
}

fn bin_dim(params: &ThermalParams) -> (f64, f64) {
    (params.die_w / THERMAL_MAP_DIM as f64, params.die_h / THERMAL_MAP_DIM as f64)
}

/// Build one layer's padded power map from its placed blocks. Bounding
/// boxes are extended by the padding offset; blocks within 1% of the die
/// outline are extended all the way to the padded edge so the symmetric
/// convolution tail still sees their contribution.
pub fn build_power_map(blocks: &[&Block], params: &ThermalParams) -> PowerMap {
    let mut map = empty_power_map();
    let (bin_w, bin_h) = bin_dim(params);
    let pad_w = PADDING_BINS as f64 * bin_w;
    let pad_h = PADDING_BINS as f64 * bin_h;
    let near_edge = 0.01;

    for block in blocks {
        let bb = block.bb;
        let mut ll_x = bb.ll.x - pad_w;
        let mut ll_y = bb.ll.y - pad_h;
        let mut ur_x = bb.ur.x + pad_w;
        let mut ur_y = bb.ur.y + pad_h;

        if bb.ll.x <= params.die_w * near_edge {
            ll_x = -pad_w;
        }
        if bb.ll.y <= params.die_h * near_edge {
            ll_y = -pad_h;
        }
        if bb.ur.x >= params.die_w * (1.0 - near_edge) {
            ur_x = params.die_w + pad_w;
        }
        if bb.ur.y >= params.die_h * (1.0 - near_edge) {
            ur_y = params.die_h + pad_h;
        }

        let x0 = (((ll_x + pad_w) / bin_w).floor().max(0.0)) as usize;
        let x1 = (((ur_x + pad_w) / bin_w).ceil().min(POWER_MAPS_DIM as f64)) as usize;
        let y0 = (((ll_y + pad_h) / bin_h).floor().max(0.0)) as usize;
        let y1 = (((ur_y + pad_h) / bin_h).ceil().min(POWER_MAPS_DIM as f64)) as usize;

        for (gy, row) in map.iter_mut().enumerate().take(y1).skip(y0) {
            let bin_ll_y = gy as f64 * bin_h - pad_h;
            for (gx, bin) in row.iter_mut().enumerate().take(x1).skip(x0) {
                let bin_ll_x = gx as f64 * bin_w - pad_w;
                let bin_rect = Rect::from_ll_dims(fp_core::Point::new(bin_ll_x, bin_ll_y), bin_w, bin_h);
                let frac = bin_rect.fractional_intersection(&bb);
                if frac <= 0.0 {
                    continue;
                }
                let mut contribution = block.power_density() * frac;
                let in_padding = bin_ll_x < 0.0 || bin_ll_y < 0.0 || bin_ll_x + bin_w > params.die_w || bin_ll_y + bin_h > params.die_h;
                if in_padding {
                    contribution *= params.power_density_scaling_padding_zone;
                }
                bin.power_density += contribution;
            }
        }
    }
    map
}

/// Accumulate TSV-island footprints into `TSV_density`, then adapt each
/// bin's power by the TSV-lowers-heating scaling factor.
pub fn apply_tsv_adaptation(map: &mut PowerMap, islands: &[&TsvIsland], params: &ThermalParams) {
    let (bin_w, bin_h) = bin_dim(params);
    let pad_w = PADDING_BINS as f64 * bin_w;
    let pad_h = PADDING_BINS as f64 * bin_h;

    for island in islands {
        let bb = island.bb;
        let x0 = (((bb.ll.x + pad_w) / bin_w).floor().max(0.0)) as usize;
        let x1 = (((bb.ur.x + pad_w) / bin_w).ceil().min(POWER_MAPS_DIM as f64)) as usize;
        let y0 = (((bb.ll.y + pad_h) / bin_h).floor().max(0.0)) as usize;
        let y1 = (((bb.ur.y + pad_h) / bin_h).ceil().min(POWER_MAPS_DIM as f64)) as usize;

        for (gy, row) in map.iter_mut().enumerate().take(y1).skip(y0) {
            let bin_ll_y = gy as f64 * bin_h - pad_h;
            for (gx, bin) in row.iter_mut().enumerate().take(x1).skip(x0) {
                let bin_ll_x = gx as f64 * bin_w - pad_w;
                let bin_rect = Rect::from_ll_dims(fp_core::Point::new(bin_ll_x, bin_ll_y), bin_w, bin_h);
                let frac = bin_rect.fractional_intersection(&bb);
                if frac > 0.0 {
                    bin.tsv_density = (bin.tsv_density + 100.0 * frac).min(100.0);
                }
            }
        }
    }

    for row in map.iter_mut() {
        for bin in row.iter_mut() {
            let scale = 1.0 + (params.power_density_scaling_tsv_region - 1.0) * (bin.tsv_density / 100.0);
            bin.power_density *= scale;
        }
    }
}

/// One layer's 1-D Gaussian mask, symmetric so no flip is needed during
/// convolution. Layer index `i` runs 1..=layers, 1 = hottest (closest).
pub fn build_mask(layer_index_from_hottest: usize, params: &ThermalParams) -> [f64; THERMAL_MASK_DIM] {
    let i = layer_index_from_hottest.max(1) as f64;
    let peak = params.impulse_factor / i.powf(params.impulse_factor_scaling_exponent);
    // gauss(x) = peak * exp(-x^2 / (2 sigma^2)); solve sigma from
    // gauss(5*scale) = mask_boundary_value.
    let half = (THERMAL_MASK_DIM / 2) as f64;
    let target = (params.mask_boundary_value / peak).max(1e-12).ln();
    let sigma_sq = -(half * half) / (2.0 * target);
    let mut mask = [0.0_f64; THERMAL_MASK_DIM];
    for (k, slot) in mask.iter_mut().enumerate() {
        let x = k as f64 - half;
        *slot = peak * (-(x * x) / (2.0 * sigma_sq)).exp();
    }
    mask
}

fn convolve_separable(power: &PowerMap, mask: &[f64; THERMAL_MASK_DIM]) -> ThermalMap {
    let mut tmp = vec![vec![0.0_f64; POWER_MAPS_DIM]; POWER_MAPS_DIM];
    let half = (THERMAL_MASK_DIM / 2) as isize;

    for y in 0..POWER_MAPS_DIM {
        for x in 0..POWER_MAPS_DIM {
            let mut acc = 0.0;
            for (k, coeff) in mask.iter().enumerate() {
                let sx = x as isize + k as isize - half;
                if sx >= 0 && (sx as usize) < POWER_MAPS_DIM {
                    acc += power[y][sx as usize].power_density * coeff;
                }
            }
            tmp[y][x] = acc;
        }
    }

    let mut out = vec![vec![0.0_f64; THERMAL_MAP_DIM]; THERMAL_MAP_DIM];
    for y in 0..THERMAL_MAP_DIM {
        for x in 0..THERMAL_MAP_DIM {
            let mut acc = 0.0;
            for (k, coeff) in mask.iter().enumerate() {
                let sy = y as isize + PADDING_BINS as isize + k as isize - half;
                if sy >= 0 && (sy as usize) < POWER_MAPS_DIM {
                    acc += tmp[sy as usize][x + PADDING_BINS] * coeff;
                }
            }
            out[y][x] = acc;
        }
    }
    out
}

/// Convolve every layer's power map with its own mask and sum the
/// contributions into one 64x64 thermal map, offset by `temp_offset`. Each
/// layer's convolution is independent, so under the `desktop` feature the
/// per-layer passes run in parallel; they are always summed back in
/// layer-index order so the result does not depend on thread count.
pub fn thermal_map(power_maps: &[PowerMap], params: &ThermalParams) -> ThermalMap {
    let mut out = vec![vec![params.temp_offset; THERMAL_MAP_DIM]; THERMAL_MAP_DIM];

    #[cfg(feature = "desktop")]
    let contributions: Vec<ThermalMap> = power_maps
        .par_iter()
        .enumerate()
        .map(|(depth, power_map)| convolve_separable(power_map, &build_mask(depth + 1, params)))
        .collect();

    #[cfg(not(feature = "desktop"))]
    let contributions: Vec<ThermalMap> = power_maps
        .iter()
        .enumerate()
        .map(|(depth, power_map)| convolve_separable(power_map, &build_mask(depth + 1, params)))
        .collect();

    for contribution in &contributions {
        for y in 0..THERMAL_MAP_DIM {
            for x in 0..THERMAL_MAP_DIM {
                out[y][x] += contribution[y][x];
            }
        }
    }
    out
}

/// Thermal cost term: `avg_temp * max_temp` over the whole map.
pub fn thermal_cost(map: &ThermalMap) -> f64 {
    let mut sum = 0.0;
    let mut max = f64::MIN;
    let mut count = 0usize;
    for row in map {
        for &t in row {
            sum += t;
            max = max.max(t);
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let avg = sum / count as f64;
    avg * max
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::Point;

    fn block_at(density: f64, ll: Point, w: f64, h: f64) -> Block {
        let mut b = Block::new("b", 0, w * h, 1.0, 1.0);
        b.power_density_unscaled = density;
        b.bb = Rect::from_ll_dims(ll, w, h);
        b
    }

    #[test]
    fn power_map_accumulates_density_under_block() {
        let params = ThermalParams { die_w: 64.0, die_h: 64.0, ..Default::default() };
        let b = block_at(1.0, Point::new(0.0, 0.0), 8.0, 8.0);
        let map = build_power_map(&[&b], &params);
        let total: f64 = map.iter().flatten().map(|bin| bin.power_density).sum();
        assert!(total > 0.0);
    }

    #[test]
    fn convolution_is_linear_in_power_scale() {
        let params = ThermalParams { die_w: 64.0, die_h: 64.0, ..Default::default() };
        let b1 = block_at(1.0, Point::new(20.0, 20.0), 4.0, 4.0);
        let mut b2 = b1.clone();
        b2.power_density_unscaled = 3.0;

        let map1 = vec![build_power_map(&[&b1], &params)];
        let map2 = vec![build_power_map(&[&b2], &params)];
        let t1 = thermal_map(&map1, &params);
        let t2 = thermal_map(&map2, &params);

        for y in 0..THERMAL_MAP_DIM {
            for x in 0..THERMAL_MAP_DIM {
                let delta1 = t1[y][x] - params.temp_offset;
                let delta2 = t2[y][x] - params.temp_offset;
                assert!((delta2 - 3.0 * delta1).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn tsv_density_lowers_effective_power_when_scaling_below_one() {
        let params = ThermalParams {
            die_w: 64.0,
            die_h: 64.0,
            power_density_scaling_tsv_region: 0.5,
            ..Default::default()
        };
        let b = block_at(1.0, Point::new(20.0, 20.0), 8.0, 8.0);
        let before = build_power_map(&[&b], &params);
        let before_total: f64 = before.iter().flatten().map(|bin| bin.power_density).sum();

        let island = TsvIsland::shape_for("t0", 0, 4, 1.0, &b.bb);
        let mut after = build_power_map(&[&b], &params);
        apply_tsv_adaptation(&mut after, &[&island], &params);
        let after_total: f64 = after.iter().flatten().map(|bin| bin.power_density).sum();

        assert!(after_total < before_total);
    }
}
