//! Compilation and weight-learning core of a factor-graph engine.
//!
//! A [`fg::FactorGraph`] is populated incrementally by a [`fg::GraphLoader`], validated,
//! then flattened by [`fg::FactorGraph::compile`] into a [`fg::CompiledFactorGraph`] whose
//! neighbourhoods are contiguous ranges of a few flat arrays. Learning mutates the weights of a
//! compiled graph in place, from many threads at once and without locks.

pub mod fg;
pub mod learning;
pub(crate) mod progress;

pub use fg::{CompiledFactorGraph, FactorGraph};
pub use learning::LearningConfig;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Loaded {loaded} {entity}, expected {expected}.")]
    LoadCount {
        entity: &'static str,
        expected: usize,
        loaded: usize,
    },
    #[error("The {entity} stored at index {index} has id {id}.")]
    NonDenseId {
        entity: &'static str,
        index: usize,
        id: usize,
    },
    #[error("The {entity} id {id} is out of range (there are {n} {entity}s).")]
    IdOutOfRange {
        entity: &'static str,
        id: usize,
        n: usize,
    },
    #[error("The factor graph is already loaded.")]
    AlreadyLoaded,
    #[error("Factors cannot be loaded before variables and weights are sorted.")]
    NotSorted,
    #[error("Factor {factor} refers to unknown variable {vid}.")]
    UnknownVariable { factor: usize, vid: usize },
    #[error("Pass {pass} laid out {got} edges, expected {expected}.")]
    EdgeCount {
        pass: &'static str,
        expected: usize,
        got: usize,
    },
    #[error(
        "Graph sizes differ: (n_var, n_factor, n_weight, n_edge) is {got:?}, expected {expected:?}."
    )]
    SizeMismatch {
        expected: (usize, usize, usize, usize),
        got: (usize, usize, usize, usize),
    },
    #[error("The factor graph is not usable (not sorted or not safety-checked).")]
    NotUsable,
    #[error("Unknown variable domain type {0}.")]
    UnknownDomainType(u32),
    #[error("Unknown factor function {0}.")]
    UnknownFactorFunction(u32),
    #[error("Value {value} is not in the domain of variable {vid}.")]
    ValueOutOfDomain { vid: usize, value: i64 },
    #[error("The joint assignment of factor {factor} overflows the weight offset.")]
    OffsetOverflow { factor: usize },
    #[error("Cannot build the thread pool: {0}")]
    ThreadPool(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Computation time after which a progress bar is displayed.
    /// This avoids showing progress bars for negligible amounts of time.
    progress_min_time: std::time::Duration,
    /// Display the progress bar at all.
    show_progress: bool,
}

impl Config {
    pub fn with_default_timing() -> Self {
        Self {
            progress_min_time: std::time::Duration::from_millis(500),
            show_progress: true,
        }
    }
    pub fn no_progress() -> Self {
        Self {
            progress_min_time: std::time::Duration::from_millis(500),
            show_progress: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_default_timing()
    }
}
