//! Weight learning over a compiled factor graph.
//!
//! An epoch visits every variable once, in parallel: the sampler resamples the variable, then
//! the weights of its factors take one gradient step. Workers share the weights without
//! synchronization (asynchronous SGD). Independent replicas of a graph can be trained side by
//! side and their weights averaged between epochs.

use hytra::TrAdder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fg::{CompiledFactorGraph, VarId};
use crate::progress::LearningProgress;
use crate::{GraphError, Result};

/// Resamples variables of a graph, writing the new values in its assignment snapshots.
pub trait Sampler: Sync {
    fn sample(&self, graph: &CompiledFactorGraph, vid: VarId);
}

impl<F> Sampler for F
where
    F: Fn(&CompiledFactorGraph, VarId) + Sync,
{
    fn sample(&self, graph: &CompiledFactorGraph, vid: VarId) {
        self(graph, vid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    pub n_epochs: usize,
    /// Initial step size.
    pub stepsize: f64,
    /// Step size multiplier applied after each epoch.
    pub decay: f64,
    /// Number of worker threads, rayon's default if None.
    pub n_threads: Option<usize>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            n_epochs: 1,
            stepsize: 0.01,
            decay: 0.95,
            n_threads: None,
        }
    }
}

/// Sample then update the weights of every variable once, in parallel on the current rayon pool.
pub fn learn_epoch<S: Sampler + ?Sized>(graph: &CompiledFactorGraph, sampler: &S) -> Result<()> {
    learn_epoch_internal(graph, sampler, &TrAdder::new())
}

fn learn_epoch_internal<S: Sampler + ?Sized>(
    graph: &CompiledFactorGraph,
    sampler: &S,
    it_cnt: &TrAdder<u64>,
) -> Result<()> {
    if !graph.is_usable() {
        return Err(GraphError::NotUsable);
    }
    (0..graph.n_var()).into_par_iter().try_for_each(|vid| {
        sampler.sample(graph, vid);
        graph.update_weight(vid)?;
        it_cnt.inc(1);
        Ok(())
    })
}

/// Run `learning.n_epochs` epochs on a dedicated thread pool, decaying the step size after each.
pub fn learn<S: Sampler + ?Sized>(
    graph: &mut CompiledFactorGraph,
    learning: &LearningConfig,
    sampler: &S,
    config: &crate::Config,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(learning.n_threads.unwrap_or(0))
        .build()
        .map_err(|e| GraphError::ThreadPool(e.to_string()))?;
    graph.set_stepsize(learning.stepsize);
    let mut progress = LearningProgress::new(learning.n_epochs, graph.n_var(), config);
    for epoch in 0..learning.n_epochs {
        let graph_ref = &*graph;
        pool.install(|| learn_epoch_internal(graph_ref, sampler, &progress.updates))?;
        info!(epoch, stepsize = graph.stepsize(), "learning epoch done");
        progress.epoch_done(epoch, graph.stepsize());
        graph.set_stepsize(graph.stepsize() * learning.decay);
    }
    progress.finish();
    Ok(())
}

/// `n` independent replicas of `graph`.
pub fn replicate(graph: &CompiledFactorGraph, n: usize) -> Result<Vec<CompiledFactorGraph>> {
    let (n_var, n_factor, n_weight, n_edge) = graph.sizes();
    (0..n)
        .map(|_| {
            let mut replica = CompiledFactorGraph::new(n_var, n_factor, n_weight, n_edge);
            replica.copy_from(graph)?;
            Ok(replica)
        })
        .collect()
}

/// Set every non-fixed weight of each replica to the mean of its values across the replicas.
///
/// Replicas must have the same structure and must not be trained concurrently.
pub fn average_weights(replicas: &mut [CompiledFactorGraph]) -> Result<()> {
    let Some((first, rest)) = replicas.split_first() else {
        return Ok(());
    };
    if let Some(other) = rest.iter().find(|r| r.sizes() != first.sizes()) {
        return Err(GraphError::SizeMismatch {
            expected: first.sizes(),
            got: other.sizes(),
        });
    }
    let n = replicas.len() as f64;
    let mut sums = first.infrs().weight_values();
    for replica in rest {
        for (sum, w) in sums.iter_mut().zip(replica.infrs().weight_values()) {
            *sum += w;
        }
    }
    for replica in replicas.iter() {
        let infrs = replica.infrs();
        for (wid, sum) in sums.iter().enumerate() {
            if !infrs.is_fixed(wid) {
                infrs.set_weight_value(wid, sum / n);
            }
        }
    }
    Ok(())
}
