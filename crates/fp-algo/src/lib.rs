//! # fp-algo: 3D-IC Floorplanning Algorithms
//!
//! The algorithmic half of the floorplanner: per-die packing, the
//! block-alignment engine, the seven layout operators, the simulated
//! annealing driver, and the dependent thermal/hotspot/voltage/routing
//! analyses that feed its cost function.
//!
//! ## Quick Start
//!
//! ```rust
//! use fp_algo::floorplan::Floorplan;
//! use fp_core::{Block, Direction, Tuple};
//!
//! let mut fp = Floorplan::new(1);
//! fp.blocks.push(Block::new("b0", 0, 4.0, 1.0, 1.0));
//! fp.dies[0].cbl.push(Tuple { block: 0, dir: Direction::Horizontal, junctions: 0 });
//! fp.pack_all_dies(false);
//! assert!(fp.blocks[0].placed);
//! ```

pub mod alignment;
pub mod floorplan;
pub mod hotspot;
pub mod operators;
pub mod packer;
pub mod routing;
pub mod sa;
pub mod thermal;
pub mod voltage;

pub use floorplan::Floorplan;
pub use packer::Die;
