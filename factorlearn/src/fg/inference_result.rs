//! Mutable state of a compiled graph: weight values, variable assignments, tallies and marginal
//! aggregates.
//!
//! Everything is stored in relaxed atomics so that many workers can sample and learn over one
//! graph concurrently. Read-modify-write of a weight is a load followed by a store: concurrent
//! updates of the same weight may be lost, which asynchronous SGD tolerates.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use super::factor_graph::{DomainType, VarId, Variable, VariableValue, Weight, WeightId};

/// Selects one of the two assignment snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    /// Evidence variables are clamped to their observed value.
    Evidence,
    /// No variable is clamped.
    Free,
}

/// Read access to the current value of every variable.
pub trait Assignment {
    fn value_of(&self, vid: VarId) -> VariableValue;
}

impl Assignment for [VariableValue] {
    fn value_of(&self, vid: VarId) -> VariableValue {
        self[vid]
    }
}

impl Assignment for Vec<VariableValue> {
    fn value_of(&self, vid: VarId) -> VariableValue {
        self[vid]
    }
}

/// One snapshot of an [`InferenceResult`].
#[derive(Debug, Clone, Copy)]
pub struct SnapshotView<'a> {
    values: &'a [AtomicI64],
}

impl Assignment for SnapshotView<'_> {
    #[inline]
    fn value_of(&self, vid: VarId) -> VariableValue {
        self.values[vid].load(Ordering::Relaxed)
    }
}

/// An assignment where variable `vid` takes the proposed `value`.
pub struct Proposed<'a, A: ?Sized> {
    pub base: &'a A,
    pub vid: VarId,
    pub value: VariableValue,
}

impl<A: Assignment + ?Sized> Assignment for Proposed<'_, A> {
    #[inline]
    fn value_of(&self, vid: VarId) -> VariableValue {
        if vid == self.vid {
            self.value
        } else {
            self.base.value_of(vid)
        }
    }
}

#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(x: f64) -> Self {
        Self(AtomicU64::new(x.to_bits()))
    }
    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
    #[inline]
    fn store(&self, x: f64) {
        self.0.store(x.to_bits(), Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct InferenceResult {
    nvars: usize,
    nweights: usize,
    ntallies: usize,
    multinomial_tallies: Vec<AtomicU64>,
    // running sum of sampled free assignments and number of samples, per variable
    agg_means: Vec<AtomicF64>,
    agg_nsamples: Vec<AtomicU64>,
    assignments_free: Vec<AtomicI64>,
    assignments_evid: Vec<AtomicI64>,
    weight_values: Vec<AtomicF64>,
    weights_isfixed: Vec<bool>,
}

impl InferenceResult {
    pub fn new(nvars: usize, nweights: usize) -> Self {
        Self {
            nvars,
            nweights,
            ..Default::default()
        }
    }

    /// (Re-)allocate all storage, seeded from the variable and weight records.
    pub fn init(&mut self, variables: &[Variable], weights: &[Weight]) {
        self.nvars = variables.len();
        self.nweights = weights.len();
        self.ntallies = variables
            .iter()
            .filter(|v| v.domain_type == DomainType::Multinomial)
            .map(|v| v.cardinality)
            .sum();
        self.multinomial_tallies = (0..self.ntallies).map(|_| AtomicU64::new(0)).collect();
        self.agg_means = (0..self.nvars).map(|_| AtomicF64::new(0.0)).collect();
        self.agg_nsamples = (0..self.nvars).map(|_| AtomicU64::new(0)).collect();
        self.assignments_free = variables
            .iter()
            .map(|v| AtomicI64::new(v.assignment_free))
            .collect();
        self.assignments_evid = variables
            .iter()
            .map(|v| AtomicI64::new(v.assignment_evid))
            .collect();
        self.weight_values = weights.iter().map(|w| AtomicF64::new(w.value)).collect();
        self.weights_isfixed = weights.iter().map(|w| w.is_fixed).collect();
    }

    pub fn nvars(&self) -> usize {
        self.nvars
    }
    pub fn nweights(&self) -> usize {
        self.nweights
    }
    pub fn ntallies(&self) -> usize {
        self.ntallies
    }

    #[inline]
    pub fn weight_value(&self, wid: WeightId) -> f64 {
        self.weight_values[wid].load()
    }
    #[inline]
    pub fn set_weight_value(&self, wid: WeightId, value: f64) {
        self.weight_values[wid].store(value)
    }
    #[inline]
    pub fn is_fixed(&self, wid: WeightId) -> bool {
        self.weights_isfixed[wid]
    }
    /// Non-atomic increment: load then store.
    #[inline]
    pub fn add_to_weight(&self, wid: WeightId, delta: f64) {
        let w = &self.weight_values[wid];
        w.store(w.load() + delta);
    }
    pub fn weight_values(&self) -> Vec<f64> {
        self.weight_values.iter().map(AtomicF64::load).collect()
    }
    /// Current weights, as records.
    pub fn weight_snapshot(&self) -> Vec<Weight> {
        self.weight_values
            .iter()
            .zip(self.weights_isfixed.iter())
            .enumerate()
            .map(|(id, (value, is_fixed))| Weight::new(id, value.load(), *is_fixed))
            .collect()
    }

    pub fn snapshot(&self, snapshot: Snapshot) -> SnapshotView<'_> {
        SnapshotView {
            values: match snapshot {
                Snapshot::Evidence => &self.assignments_evid,
                Snapshot::Free => &self.assignments_free,
            },
        }
    }
    #[inline]
    pub fn assignment(&self, snapshot: Snapshot, vid: VarId) -> VariableValue {
        self.snapshot(snapshot).value_of(vid)
    }
    #[inline]
    pub fn set_assignment(&self, snapshot: Snapshot, vid: VarId, value: VariableValue) {
        let values = match snapshot {
            Snapshot::Evidence => &self.assignments_evid,
            Snapshot::Free => &self.assignments_free,
        };
        values[vid].store(value, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_tally(&self, idx: usize) {
        self.multinomial_tallies[idx].fetch_add(1, Ordering::Relaxed);
    }
    pub fn tallies(&self) -> Vec<u64> {
        self.multinomial_tallies
            .iter()
            .map(|t| t.load(Ordering::Relaxed))
            .collect()
    }

    /// Accumulate the current free assignment of `vid` into its marginal estimate.
    pub fn aggregate(&self, vid: VarId) {
        let value = self.assignment(Snapshot::Free, vid) as f64;
        let mean = &self.agg_means[vid];
        mean.store(mean.load() + value);
        self.agg_nsamples[vid].fetch_add(1, Ordering::Relaxed);
    }
    /// Mean of the aggregated samples of `vid`, `None` before the first sample.
    pub fn marginal(&self, vid: VarId) -> Option<f64> {
        let n = self.agg_nsamples[vid].load(Ordering::Relaxed);
        (n > 0).then(|| self.agg_means[vid].load() / n as f64)
    }
}

impl Clone for InferenceResult {
    fn clone(&self) -> Self {
        let copy_u64 = |x: &[AtomicU64]| -> Vec<AtomicU64> {
            x.iter()
                .map(|t| AtomicU64::new(t.load(Ordering::Relaxed)))
                .collect()
        };
        let copy_i64 = |x: &[AtomicI64]| -> Vec<AtomicI64> {
            x.iter()
                .map(|t| AtomicI64::new(t.load(Ordering::Relaxed)))
                .collect()
        };
        let copy_f64 = |x: &[AtomicF64]| -> Vec<AtomicF64> {
            x.iter().map(|t| AtomicF64::new(t.load())).collect()
        };
        Self {
            nvars: self.nvars,
            nweights: self.nweights,
            ntallies: self.ntallies,
            multinomial_tallies: copy_u64(&self.multinomial_tallies),
            agg_means: copy_f64(&self.agg_means),
            agg_nsamples: copy_u64(&self.agg_nsamples),
            assignments_free: copy_i64(&self.assignments_free),
            assignments_evid: copy_i64(&self.assignments_evid),
            weight_values: copy_f64(&self.weight_values),
            weights_isfixed: self.weights_isfixed.clone(),
        }
    }
}
