//! Factor graphs: load-time representation, compilation into flat arrays, and the weight
//! learning step.
//!
//! A [`FactorGraph`] is filled by a [`GraphLoader`] and compiled into a
//! [`CompiledFactorGraph`]:
//! ```
//! use factorlearn::fg::{
//!     FactorFunction, GraphSource, RawFactor, RawVariable, Snapshot, VariableInFactor,
//!     Weight,
//! };
//!
//! let mut graph = GraphSource::new()
//!     .variable(RawVariable::boolean(0, true, 1))
//!     .weight(Weight::new(0, 0.0, false))
//!     .factor(RawFactor::new(
//!         0,
//!         FactorFunction::IsTrue,
//!         0,
//!         vec![VariableInFactor::new(0, 0)],
//!     ))
//!     .build()
//!     .unwrap();
//! let cfg = graph.to_compiled().unwrap();
//! assert_eq!(cfg.c_edge(), 1);
//! assert_eq!(cfg.potential(&cfg.compact_factors()[0], Snapshot::Evidence), Ok(1.0));
//! ```

mod compile;
mod compiled;
mod factor_graph;
mod inference_result;
mod loader;
mod potential;
mod raw_graph;

pub use compiled::CompiledFactorGraph;
pub use factor_graph::{
    CompactFactor, DomainType, EdgeId, Factor, FactorFunction, FactorId, RawFactor, RawVariable,
    VarId, Variable, VariableInFactor, VariableValue, Weight, WeightId,
};
pub use inference_result::{Assignment, InferenceResult, Proposed, Snapshot, SnapshotView};
pub use loader::{GraphLoader, GraphSource};
pub use potential::{BuiltinPotential, Potential};
pub use raw_graph::FactorGraph;
