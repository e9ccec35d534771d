//! Contiguity graph plus the bottom-up/top-down voltage-island builder.
//!
//! Grounded on the reference floorplanner's contiguity pass and
//! `CompoundModule` growth/selection logic. Contiguity is intra-die only:
//! the reference's inter-die contiguity pass is declared but never
//! implemented, and this port keeps that limitation (see DESIGN.md).

use fp_core::{Block, VoltageBitset};
use petgraph::graph::{NodeIndex, UnGraph};
use hashbrown::HashMap;

use crate::packer::Die;

/// An edge of the contiguity graph: two blocks on the same die abut along
/// a boundary of the given length.
#[derive(Debug, Clone, Copy)]
pub struct ContiguityEdge {
    pub common_boundary: f64,
}

/// Build the per-die contiguity graph by sweeping vertical then horizontal
/// block edges lexicographically and pairing up abutting boundaries.
pub fn build_contiguity_graph(die: &Die, blocks: &[Block]) -> UnGraph<usize, ContiguityEdge> {
    let mut graph = UnGraph::new_undirected();
    let mut node_of: HashMap<usize, NodeIndex> = HashMap::new();
    let placed: Vec<usize> = die.cbl.tuples.iter().map(|t| t.block).filter(|&b| blocks[b].placed).collect();

    for &b in &placed {
        node_of.entry(b).or_insert_with(|| graph.add_node(b));
    }

    // vertical edges: blocks sharing an x coordinate (one's left edge meets
    // the other's right edge), boundary length = overlap in y.
    for (i, &a) in placed.iter().enumerate() {
        for &b in placed.iter().skip(i + 1) {
            let ba = &blocks[a].bb;
            let bb = &blocks[b].bb;
            let abuts_vertical = (ba.ur.x - bb.ll.x).abs() < fp_core::EPSILON || (bb.ur.x - ba.ll.x).abs() < fp_core::EPSILON;
            let abuts_horizontal = (ba.ur.y - bb.ll.y).abs() < fp_core::EPSILON || (bb.ur.y - ba.ll.y).abs() < fp_core::EPSILON;

            if abuts_vertical {
                let overlap = ba.ur.y.min(bb.ur.y) - ba.ll.y.max(bb.ll.y);
                if overlap > 0.0 {
                    graph.add_edge(node_of[&a], node_of[&b], ContiguityEdge { common_boundary: overlap });
                }
            } else if abuts_horizontal {
                let overlap = ba.ur.x.min(bb.ur.x) - ba.ll.x.max(bb.ll.x);
                if overlap > 0.0 {
                    graph.add_edge(node_of[&a], node_of[&b], ContiguityEdge { common_boundary: overlap });
                }
            }
        }
    }

    graph
}

/// A candidate voltage island: a contiguous set of blocks with a bitwise-AND
/// feasible-voltage set and the cached costs the top-down selector ranks by.
#[derive(Debug, Clone)]
pub struct CompoundModule {
    pub block_ids: Vec<usize>,
    pub feasible_voltages: VoltageBitset,
    pub outline_cost: f64,
    pub cost: f64,
    pub power_saving_avg: f64,
}

impl CompoundModule {
    fn bitmask(&self, total_blocks: usize) -> Vec<bool> {
        let mut mask = vec![false; total_blocks];
        for &b in &self.block_ids {
            mask[b] = true;
        }
        mask
    }

    pub fn min_voltage_index(&self) -> Option<usize> {
        self.feasible_voltages.min_index()
    }
}

/// Grow compound modules bottom-up from every single-block module, one
/// contiguous neighbour at a time, memoised by block-id bitvector to avoid
/// rebuilding the same module from a different growth order.
pub fn enumerate_modules(graph: &UnGraph<usize, ContiguityEdge>, blocks: &[Block]) -> Vec<CompoundModule> {
    let mut memo: HashMap<Vec<bool>, usize> = HashMap::new();
    let mut modules: Vec<CompoundModule> = Vec::new();
    let total = blocks.len();

    let mut frontier: Vec<usize> = Vec::new();
    for node in graph.node_indices() {
        let block = graph[node];
        let module = CompoundModule {
            block_ids: vec![block],
            feasible_voltages: blocks[block].feasible_voltages,
            outline_cost: 0.0,
            cost: 0.0,
            power_saving_avg: 0.0,
        };
        let mask = module.bitmask(total);
        memo.insert(mask, modules.len());
        frontier.push(modules.len());
        modules.push(module);
    }

    while let Some(idx) = frontier.pop() {
        let (block_ids, feasible) = (modules[idx].block_ids.clone(), modules[idx].feasible_voltages);
        let mut neighbours: Vec<(usize, f64)> = Vec::new();
        for &b in &block_ids {
            let node = graph.node_indices().find(|&n| graph[n] == b);
            let Some(node) = node else { continue };
            for edge in graph.edges(node) {
                let peer = graph[edge.target()];
                if !block_ids.contains(&peer) {
                    neighbours.push((peer, edge.weight().common_boundary));
                }
            }
        }

        let mut deferred_best: Option<(usize, f64)> = None;

        for (peer, boundary) in neighbours {
            let mut grown_ids = block_ids.clone();
            grown_ids.push(peer);
            grown_ids.sort_unstable();
            grown_ids.dedup();

            let grown_feasible = feasible.intersect(&blocks[peer].feasible_voltages);
            let trivial_before = feasible.count() <= 1;
            let trivial_peer = blocks[peer].feasible_voltages.count() <= 1;

            if grown_feasible.count() <= 1 && !(trivial_before && trivial_peer) {
                continue;
            }

            let outline_cost = boundary / (boundary + 1.0);

            if grown_feasible == feasible {
                match deferred_best {
                    Some((_, best_cost)) if best_cost <= outline_cost => {}
                    _ => deferred_best = Some((peer, outline_cost)),
                }
                continue;
            }

            let candidate = CompoundModule {
                block_ids: grown_ids.clone(),
                feasible_voltages: grown_feasible,
                outline_cost,
                cost: 0.0,
                power_saving_avg: 0.0,
            };
            let mask = candidate.bitmask(total);
            if !memo.contains_key(&mask) {
                memo.insert(mask, modules.len());
                frontier.push(modules.len());
                modules.push(candidate);
            }
        }

        if let Some((peer, outline_cost)) = deferred_best {
            let mut grown_ids = block_ids.clone();
            grown_ids.push(peer);
            grown_ids.sort_unstable();
            grown_ids.dedup();
            let candidate = CompoundModule {
                block_ids: grown_ids,
                feasible_voltages: feasible,
                outline_cost,
                cost: 0.0,
                power_saving_avg: 0.0,
            };
            let mask = candidate.bitmask(total);
            if !memo.contains_key(&mask) {
                memo.insert(mask, modules.len());
                frontier.push(modules.len());
                modules.push(candidate);
            }
        }
    }

    modules
}

/// Weights for the top-down selection cost function.
#[derive(Debug, Clone, Copy)]
pub struct SelectionWeights {
    pub w_sav: f64,
    pub w_cor: f64,
    pub w_var: f64,
    pub w_cnt: f64,
}

/// Score and greedily select non-conflicting modules (cheapest first,
/// deleting every remaining module that shares a committed block).
/// Returns, for every block index, the index into `modules` of the module
/// it was assigned to.
pub fn select_modules(mut modules: Vec<CompoundModule>, weights: SelectionWeights, total_blocks: usize) -> Vec<Option<usize>> {
    if modules.is_empty() {
        return vec![None; total_blocks];
    }

    let max_sav = modules.iter().map(|m| m.power_saving_avg).fold(f64::MIN, f64::max).max(1e-9);
    let min_sav = modules.iter().map(|m| m.power_saving_avg).fold(f64::MAX, f64::min);
    let max_corners = modules.iter().map(|m| m.block_ids.len() as f64 * 4.0).fold(4.0_f64 + 1.0, f64::max);
    let max_count = modules.iter().map(|m| m.block_ids.len()).max().unwrap_or(1).max(2) as f64;

    for module in &mut modules {
        let sav_term = if (max_sav - min_sav).abs() > 1e-12 { (max_sav - module.power_saving_avg) / (max_sav - min_sav) } else { 0.0 };
        let corners = module.block_ids.len() as f64 * 4.0;
        let cor_term = (corners - 4.0) / (max_corners - 4.0).max(1e-9);
        let cnt_term = (max_count - module.block_ids.len() as f64) / (max_count - 1.0).max(1e-9);
        module.cost = weights.w_sav * sav_term + weights.w_cor * cor_term + weights.w_var * 0.0 + weights.w_cnt * cnt_term;
    }

    let mut remaining: Vec<usize> = (0..modules.len()).collect();
    let mut assignment: Vec<Option<usize>> = vec![None; total_blocks];

    while !remaining.is_empty() {
        remaining.sort_by(|&a, &b| modules[a].cost.partial_cmp(&modules[b].cost).unwrap());
        let chosen = remaining[0];
        for &b in &modules[chosen].block_ids {
            assignment[b] = Some(chosen);
        }
        let committed = modules[chosen].block_ids.clone();
        remaining.retain(|&m| m != chosen && !modules[m].block_ids.iter().any(|b| committed.contains(b)));
    }

    assignment
}

/// Merge any two selected modules sharing a contiguous neighbour and the
/// same min-voltage index; corner count is approximated conservatively as
/// `corners_a + corners_b - 2`.
pub fn merge_selected(a: &CompoundModule, b: &CompoundModule, graph: &UnGraph<usize, ContiguityEdge>) -> Option<CompoundModule> {
    if a.min_voltage_index() != b.min_voltage_index() {
        return None;
    }
    let shares_edge = graph.edge_indices().any(|e| {
        let (s, t) = graph.edge_endpoints(e).unwrap();
        let (s, t) = (graph[s], graph[t]);
        (a.block_ids.contains(&s) && b.block_ids.contains(&t)) || (a.block_ids.contains(&t) && b.block_ids.contains(&s))
    });
    if !shares_edge {
        return None;
    }
    let mut block_ids = a.block_ids.clone();
    block_ids.extend(b.block_ids.iter().copied());
    block_ids.sort_unstable();
    block_ids.dedup();
    Some(CompoundModule {
        block_ids,
        feasible_voltages: a.feasible_voltages.intersect(&b.feasible_voltages),
        outline_cost: (a.outline_cost + b.outline_cost) / 2.0,
        cost: 0.0,
        power_saving_avg: (a.power_saving_avg + b.power_saving_avg) / 2.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{Direction, Point, Rect, Tuple};

    fn placed_block(id: usize, ll: Point, w: f64, h: f64, feasible: VoltageBitset) -> Block {
        let mut b = Block::new(format!("b{id}"), id, w * h, 1.0, 1.0);
        b.bb = Rect::from_ll_dims(ll, w, h);
        b.placed = true;
        b.feasible_voltages = feasible;
        b
    }

    fn die_with(tuples: &[usize]) -> Die {
        let mut die = Die::new();
        for &b in tuples {
            die.cbl.push(Tuple { block: b, dir: Direction::Horizontal, junctions: 0 });
        }
        die
    }

    #[test]
    fn abutting_blocks_form_a_contiguity_edge() {
        let blocks = vec![
            placed_block(0, Point::new(0.0, 0.0), 4.0, 4.0, VoltageBitset::only_highest(4)),
            placed_block(1, Point::new(4.0, 0.0), 4.0, 4.0, VoltageBitset::only_highest(4)),
        ];
        let die = die_with(&[0, 1]);
        let graph = build_contiguity_graph(&die, &blocks);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn chain_with_restrictive_middle_block_yields_full_module_with_its_feasible_set() {
        // five blocks in a row, all {V0,V1,V2,V3} except the middle {V2,V3}
        let wide = VoltageBitset(0b1111);
        let narrow = VoltageBitset(0b1100);
        let blocks = vec![
            placed_block(0, Point::new(0.0, 0.0), 2.0, 2.0, wide),
            placed_block(1, Point::new(2.0, 0.0), 2.0, 2.0, wide),
            placed_block(2, Point::new(4.0, 0.0), 2.0, 2.0, narrow),
            placed_block(3, Point::new(6.0, 0.0), 2.0, 2.0, wide),
            placed_block(4, Point::new(8.0, 0.0), 2.0, 2.0, wide),
        ];
        let die = die_with(&[0, 1, 2, 3, 4]);
        let graph = build_contiguity_graph(&die, &blocks);
        assert_eq!(graph.edge_count(), 4);

        let modules = enumerate_modules(&graph, &blocks);
        let full_chain = modules.iter().find(|m| m.block_ids.len() == 5);
        assert!(full_chain.is_some());
        assert_eq!(full_chain.unwrap().feasible_voltages, narrow);
    }
}
