//! Query side: filter state, evaluation and facet resolution.

pub mod evaluator;
pub mod facets;
pub mod filter_state;
pub mod positions;

pub use evaluator::{matching_positions, Plan, PlannedColumn};
pub use facets::{resolve_options, FacetOption};
pub use filter_state::FilterState;
