//! Coarsening of a strength graph
//!
//! Two families, selected by configuration:
//! - C/F splitting for classical AMG (Ruge-Stuben, PMIS, compatible
//!   relaxation): [`CfSplitting`]
//! - Aggregation for smoothed aggregation AMG: [`AggregationMethod`]

mod aggregation;
mod priority;
mod splitting;

pub use aggregation::{AggregationMethod, Aggregates, naive_aggregation, standard_aggregation};
pub use priority::PriorityQueue;
pub use splitting::{
    CfSplitting, CompatibleRelaxationConfig, PointType, Splitting, compatible_relaxation_splitting,
    pmis_splitting, ruge_stuben_splitting,
};
