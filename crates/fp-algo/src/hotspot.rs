//! Lindeberg-style grey-level blob detection on the thermal map, plus
//! signal-net clustering of the resulting hotspots into TSV islands.
//!
//! Grounded on the reference floorplanner's hotspot/TSV-clustering pass;
//! ported to walk bins in descending temperature order and grow regions by
//! 8-neighbour adjacency as described for the `Hotspot` analysis.

use fp_core::{Rect, TsvIsland};

use crate::thermal::{ThermalMap, THERMAL_MAP_DIM};

/// One detected hotspot: its peak/base temperatures, member bins, and
/// bounding box (already expanded 2x for signal-net clustering).
#[derive(Debug, Clone)]
pub struct Hotspot {
    pub id: usize,
    pub peak_temp: f64,
    pub base_temp: f64,
    pub bins: Vec<(usize, usize)>,
    pub bb: Rect,
}

impl Hotspot {
    /// `(peak - base) * peak^2`, normalised by 1e6.
    pub fn score(&self) -> f64 {
        (self.peak_temp - self.base_temp) * self.peak_temp * self.peak_temp / 1e6
    }
}

const NEIGHBOURS: [(isize, isize); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];

/// Detect hotspots in `map`. `offset` is the background temperature
/// (bins at exactly this value are not part of any hotspot).
pub fn detect_hotspots(map: &ThermalMap, offset: f64, bin_w: f64, bin_h: f64) -> Vec<Hotspot> {
    let dim = THERMAL_MAP_DIM;
    let mut order: Vec<(usize, usize)> = (0..dim).flat_map(|y| (0..dim).map(move |x| (x, y))).filter(|&(x, y)| map[y][x] != offset).collect();
    order.sort_by(|&(ax, ay), &(bx, by)| map[by][bx].partial_cmp(&map[ay][ax]).unwrap());

    // label[y][x]: None = unassigned, Some(None) = background, Some(Some(id)) = hotspot id
    let mut label: Vec<Vec<Option<Option<usize>>>> = vec![vec![None; dim]; dim];
    let mut hotspots: Vec<Hotspot> = Vec::new();
    let mut still_growing: Vec<bool> = Vec::new();

    for &(x, y) in &order {
        let temp = map[y][x];
        let mut distinct_growing: Vec<usize> = Vec::new();
        let mut saw_background = false;

        for &(dx, dy) in &NEIGHBOURS {
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if nx < 0 || ny < 0 || nx as usize >= dim || ny as usize >= dim {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            if map[ny][nx] <= temp {
                continue;
            }
            match label[ny][nx] {
                Some(Some(id)) => {
                    if still_growing[id] && !distinct_growing.contains(&id) {
                        distinct_growing.push(id);
                    }
                }
                Some(None) => saw_background = true,
                None => {}
            }
        }

        if saw_background {
            label[y][x] = Some(None);
            continue;
        }

        match distinct_growing.len() {
            0 => {
                let id = hotspots.len();
                hotspots.push(Hotspot {
                    id,
                    peak_temp: temp,
                    base_temp: temp,
                    bins: vec![(x, y)],
                    bb: Rect::from_ll_dims(fp_core::Point::new(x as f64 * bin_w, y as f64 * bin_h), bin_w, bin_h),
                });
                still_growing.push(true);
                label[y][x] = Some(Some(id));
            }
            1 => {
                let id = distinct_growing[0];
                hotspots[id].bins.push((x, y));
                let bin_rect = Rect::from_ll_dims(fp_core::Point::new(x as f64 * bin_w, y as f64 * bin_h), bin_w, bin_h);
                hotspots[id].bb = Rect::bounding_box(&hotspots[id].bb, &bin_rect);
                label[y][x] = Some(Some(id));
            }
            _ => {
                for &id in &distinct_growing {
                    still_growing[id] = false;
                    hotspots[id].base_temp = temp;
                }
                label[y][x] = Some(None);
            }
        }
    }

    for (id, hotspot) in hotspots.iter_mut().enumerate() {
        if still_growing[id] {
            hotspot.base_temp = hotspot.bins.iter().map(|&(x, y)| map[y][x]).fold(f64::INFINITY, f64::min);
        }
        hotspot.bb = expand_bb(&hotspot.bb, 2.0);
    }

    hotspots
}

fn expand_bb(bb: &Rect, factor: f64) -> Rect {
    let cx = bb.ll.x + bb.w / 2.0;
    let cy = bb.ll.y + bb.h / 2.0;
    let w = bb.w * factor;
    let h = bb.h * factor;
    Rect::from_ll_dims(fp_core::Point::new(cx - w / 2.0, cy - h / 2.0), w, h)
}

/// A net relevant to TSV clustering on one layer: its id and projected
/// bounding box on that layer.
#[derive(Debug, Clone)]
pub struct NetSpan {
    pub net_id: usize,
    pub bb: Rect,
}

/// Cluster `nets` (already filtered to those crossing `layer`) into TSV
/// islands, seating each cluster in the first overlapping hotspot
/// (score-descending) and greedily merging subsequent nets while the
/// intersected cluster rect stays nonempty and below `per_cluster_limit`.
pub fn cluster_signal_tsvs(nets: &[NetSpan], hotspots: &[Hotspot], layer: usize, per_cluster_limit: usize, tsv_pitch: f64, existing: &[TsvIsland]) -> Vec<TsvIsland> {
    let mut sorted: Vec<&NetSpan> = nets.iter().collect();
    sorted.sort_by(|a, b| b.bb.area.partial_cmp(&a.bb.area).unwrap());

    let mut ranked_hotspots: Vec<&Hotspot> = hotspots.iter().collect();
    ranked_hotspots.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap());

    let mut islands = Vec::new();
    let mut placed: Vec<Rect> = existing.iter().map(|i| i.bb).collect();

    let mut remaining: Vec<&NetSpan> = sorted;
    while let Some(seed) = remaining.first().copied() {
        let mut cluster_rect = seed.bb;
        let mut members = vec![seed.net_id];
        remaining.retain(|n| n.net_id != seed.net_id);

        loop {
            let mut merged_any = false;
            remaining.retain(|n| {
                if members.len() >= per_cluster_limit {
                    return true;
                }
                let inter = Rect::determine_intersection(&cluster_rect, &n.bb);
                if inter.area > 0.0 {
                    cluster_rect = inter;
                    members.push(n.net_id);
                    merged_any = true;
                    false
                } else {
                    true
                }
            });
            if !merged_any {
                break;
            }
        }

        let _ = ranked_hotspots.iter().find(|h| Rect::determine_intersection(&h.bb, &cluster_rect).area > 0.0);

        let mut island = TsvIsland::shape_for(format!("tsv_island_{}_{}", layer, islands.len()), layer, members.len(), tsv_pitch, &cluster_rect);
        for fixed in &placed {
            let mut guard = 0;
            while Rect::rects_intersect(&island.bb, fixed) && guard < 64 {
                Rect::greedy_shift_remove_intersection(&mut island.bb, fixed);
                guard += 1;
            }
        }
        placed.push(island.bb);
        islands.push(island);
    }

    islands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_hot_pixel_is_its_own_hotspot_with_no_base_drop() {
        let mut map = vec![vec![300.0; THERMAL_MAP_DIM]; THERMAL_MAP_DIM];
        map[10][10] = 350.0;
        let hotspots = detect_hotspots(&map, 300.0, 1.0, 1.0);
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].peak_temp, 350.0);
        assert_eq!(hotspots[0].base_temp, 350.0);
    }

    #[test]
    fn two_separate_peaks_merge_at_a_shared_valley() {
        let mut map = vec![vec![300.0; THERMAL_MAP_DIM]; THERMAL_MAP_DIM];
        map[10][10] = 340.0;
        map[10][12] = 340.0;
        map[10][11] = 310.0;
        let hotspots = detect_hotspots(&map, 300.0, 1.0, 1.0);
        assert_eq!(hotspots.len(), 2);
        assert!(hotspots.iter().all(|h| h.base_temp == 310.0));
    }

    #[test]
    fn clustering_keeps_islands_overlap_free() {
        let nets = vec![
            NetSpan { net_id: 0, bb: Rect::from_ll_dims(fp_core::Point::new(0.0, 0.0), 4.0, 4.0) },
            NetSpan { net_id: 1, bb: Rect::from_ll_dims(fp_core::Point::new(1.0, 1.0), 4.0, 4.0) },
            NetSpan { net_id: 2, bb: Rect::from_ll_dims(fp_core::Point::new(20.0, 20.0), 4.0, 4.0) },
        ];
        let islands = cluster_signal_tsvs(&nets, &[], 0, 4, 1.0, &[]);
        for i in 0..islands.len() {
            for j in (i + 1)..islands.len() {
                assert!(!Rect::rects_intersect(&islands[i].bb, &islands[j].bb));
            }
        }
    }
}
