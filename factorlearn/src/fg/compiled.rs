use std::ops::Range;

use tracing::warn;

use super::factor_graph::{
    CompactFactor, DomainType, EdgeId, Factor, FactorFunction, FactorId, VarId, Variable,
    VariableInFactor, VariableValue, WeightId,
};
use super::inference_result::{Assignment, InferenceResult, Proposed, Snapshot};
use super::potential::{BuiltinPotential, Potential};
use crate::{GraphError, Result};

/// Flattened factor graph used for sampling and learning.
///
/// Each factor's variables are a contiguous range of `vifs` (in argument order), and each
/// variable's factors are a contiguous range of the three parallel arrays `factor_ids`,
/// `compact_factors` and `compact_factors_weightids`. The arrays are written once by
/// [`FactorGraph::compile`](super::FactorGraph::compile); afterwards only the
/// [`InferenceResult`] state changes.
#[derive(Debug, Clone)]
pub struct CompiledFactorGraph {
    n_var: usize,
    n_factor: usize,
    n_weight: usize,
    n_edge: usize,

    pub(crate) c_nvar: usize,
    pub(crate) c_nfactor: usize,
    pub(crate) c_nweight: usize,
    pub(crate) c_edge: usize,

    pub(crate) n_evid: usize,
    pub(crate) n_query: usize,

    pub(crate) stepsize: f64,

    pub(crate) variables: Vec<Variable>,
    pub(crate) factors: Vec<Factor>,
    pub(crate) compact_factors: Vec<CompactFactor>,
    pub(crate) compact_factors_weightids: Vec<WeightId>,
    pub(crate) factor_ids: Vec<FactorId>,
    pub(crate) vifs: Vec<VariableInFactor>,

    pub(crate) infrs: InferenceResult,

    pub(crate) sorted: bool,
    pub(crate) safety_check_passed: bool,
}

impl CompiledFactorGraph {
    /// Empty graph, to be filled by compilation of a raw graph with the same sizes.
    pub fn new(n_var: usize, n_factor: usize, n_weight: usize, n_edge: usize) -> Self {
        Self {
            n_var,
            n_factor,
            n_weight,
            n_edge,
            c_nvar: 0,
            c_nfactor: 0,
            c_nweight: 0,
            c_edge: 0,
            n_evid: 0,
            n_query: 0,
            stepsize: 0.01,
            variables: Vec::new(),
            factors: Vec::new(),
            compact_factors: Vec::new(),
            compact_factors_weightids: Vec::new(),
            factor_ids: Vec::new(),
            vifs: Vec::new(),
            infrs: InferenceResult::new(n_var, n_weight),
            sorted: false,
            safety_check_passed: false,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.sorted && self.safety_check_passed
    }

    fn check_usable(&self) -> Result<()> {
        if !self.is_usable() {
            return Err(GraphError::NotUsable);
        }
        Ok(())
    }

    /// (n_var, n_factor, n_weight, n_edge)
    pub fn sizes(&self) -> (usize, usize, usize, usize) {
        (self.n_var, self.n_factor, self.n_weight, self.n_edge)
    }
    pub fn n_var(&self) -> usize {
        self.n_var
    }
    pub fn n_factor(&self) -> usize {
        self.n_factor
    }
    pub fn n_weight(&self) -> usize {
        self.n_weight
    }
    /// Number of variables, factors and weights that were loaded in the raw graph.
    pub fn loaded_counts(&self) -> (usize, usize, usize) {
        (self.c_nvar, self.c_nfactor, self.c_nweight)
    }
    /// Number of edges laid out by the compiler.
    pub fn c_edge(&self) -> usize {
        self.c_edge
    }
    pub fn n_evid(&self) -> usize {
        self.n_evid
    }
    pub fn n_query(&self) -> usize {
        self.n_query
    }
    pub fn stepsize(&self) -> f64 {
        self.stepsize
    }
    pub fn set_stepsize(&mut self, stepsize: f64) {
        self.stepsize = stepsize;
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
    pub fn variable(&self, vid: VarId) -> Result<&Variable> {
        self.variables.get(vid).ok_or(GraphError::IdOutOfRange {
            entity: "variable",
            id: vid,
            n: self.variables.len(),
        })
    }
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }
    pub fn vifs(&self) -> &[VariableInFactor] {
        &self.vifs
    }
    pub fn compact_factors(&self) -> &[CompactFactor] {
        &self.compact_factors
    }
    pub fn factor_ids(&self) -> &[FactorId] {
        &self.factor_ids
    }
    pub fn compact_factors_weightids(&self) -> &[WeightId] {
        &self.compact_factors_weightids
    }
    pub fn infrs(&self) -> &InferenceResult {
        &self.infrs
    }

    /// Variables of factor `factor`, in argument order.
    #[inline]
    pub fn factor_variables(&self, factor: &CompactFactor) -> &[VariableInFactor] {
        &self.vifs[factor.n_start_i_vif..factor.n_start_i_vif + factor.n_variables]
    }
    /// [`Self::factor_variables`], for a factor descriptor that may not come from this graph.
    fn checked_factor_variables(&self, factor: &CompactFactor) -> Result<&[VariableInFactor]> {
        factor
            .n_start_i_vif
            .checked_add(factor.n_variables)
            .and_then(|end| self.vifs.get(factor.n_start_i_vif..end))
            .ok_or(GraphError::IdOutOfRange {
                entity: "edge",
                id: factor.n_start_i_vif,
                n: self.vifs.len(),
            })
    }
    /// Range of the edges of `variable` in the variable-indexed arrays.
    #[inline]
    pub fn variable_edges(&self, variable: &Variable) -> Range<EdgeId> {
        variable.n_start_i_factors..variable.n_start_i_factors + variable.n_factors
    }
    #[inline]
    pub fn variable_factors(&self, variable: &Variable) -> &[CompactFactor] {
        &self.compact_factors[self.variable_edges(variable)]
    }
    #[inline]
    pub fn variable_factor_ids(&self, variable: &Variable) -> &[FactorId] {
        &self.factor_ids[self.variable_edges(variable)]
    }
    #[inline]
    pub fn variable_weight_ids(&self, variable: &Variable) -> &[WeightId] {
        &self.compact_factors_weightids[self.variable_edges(variable)]
    }

    /// Weight selected by the joint assignment of the variables of the factor at `edge` (an
    /// index into the variable-indexed arrays).
    ///
    /// The values of the factor's variables are encoded in mixed radix, the first argument being
    /// the most significant digit:
    /// `(...((i1 * d2) + i2) * d3 + ...) * dk + ik`
    /// where `ij` is the domain index of the `j`-th variable and `dj` its cardinality. If
    /// `proposal` is `Some((vid, value))`, variable `vid` is read as having value `value`.
    ///
    /// Dense factors use the weight `base + offset`, where `base` is the weight id recorded
    /// alongside `edge`. Sparse multinomial factors look the offset up in their weight table, and
    /// resolve to `None` when the table has no entry. An offset that does not fit in a `usize`
    /// is reported as [`GraphError::OffsetOverflow`].
    pub fn get_multinomial_weight_id<A: Assignment + ?Sized>(
        &self,
        assignment: &A,
        edge: EdgeId,
        proposal: Option<(VarId, VariableValue)>,
    ) -> Result<Option<WeightId>> {
        self.check_usable()?;
        let fs = self
            .compact_factors
            .get(edge)
            .ok_or(GraphError::IdOutOfRange {
                entity: "edge",
                id: edge,
                n: self.compact_factors.len(),
            })?;
        let weight_offset = match proposal {
            Some((vid, value)) => self.weight_offset(
                &Proposed {
                    base: assignment,
                    vid,
                    value,
                },
                fs,
            )?,
            None => self.weight_offset(assignment, fs)?,
        };
        let wid = match fs.func {
            FactorFunction::SparseMultinomial => self.factors[fs.id]
                .sparse_weight_ids
                .as_ref()
                .and_then(|table| table.get(&weight_offset).copied()),
            _ => Some(
                self.compact_factors_weightids[edge]
                    .checked_add(weight_offset)
                    .ok_or(GraphError::OffsetOverflow { factor: fs.id })?,
            ),
        };
        match wid {
            Some(wid) if wid >= self.n_weight => Err(GraphError::IdOutOfRange {
                entity: "weight",
                id: wid,
                n: self.n_weight,
            }),
            _ => Ok(wid),
        }
    }

    fn weight_offset<A: Assignment + ?Sized>(
        &self,
        assignment: &A,
        fs: &CompactFactor,
    ) -> Result<usize> {
        self.factor_variables(fs)
            .iter()
            .try_fold(0usize, |offset, vif| {
                let variable = &self.variables[vif.vid];
                let idx = variable.get_domain_index(assignment.value_of(vif.vid))?;
                offset
                    .checked_mul(variable.cardinality)
                    .and_then(|offset| offset.checked_add(idx))
                    .ok_or(GraphError::OffsetOverflow { factor: fs.id })
            })
    }

    /// Potential of `factor` under `snapshot`, with the built-in factor functions.
    pub fn potential(&self, factor: &CompactFactor, snapshot: Snapshot) -> Result<f64> {
        self.check_usable()?;
        let vifs = self.checked_factor_variables(factor)?;
        Ok(factor.func.evaluate(vifs, &self.infrs.snapshot(snapshot)))
    }

    /// Potential of `factor` under `snapshot` where variable `vid` takes value `proposal`.
    pub fn potential_with_proposal(
        &self,
        factor: &CompactFactor,
        snapshot: Snapshot,
        vid: VarId,
        proposal: VariableValue,
    ) -> Result<f64> {
        self.check_usable()?;
        let vifs = self.checked_factor_variables(factor)?;
        let assignment = self.infrs.snapshot(snapshot);
        Ok(factor.func.evaluate(
            vifs,
            &Proposed {
                base: &assignment,
                vid,
                value: proposal,
            },
        ))
    }

    /// One stochastic gradient step on the weights of all factors of variable `vid`, with the
    /// built-in factor functions.
    pub fn update_weight(&self, vid: VarId) -> Result<()> {
        self.update_weight_with(vid, &BuiltinPotential)
    }

    /// One stochastic gradient step on the weights of all factors of variable `vid`.
    ///
    /// The gradient of a weight is the potential under the evidence snapshot minus the potential
    /// under the free snapshot. For multinomial variables the evidence and free snapshots may
    /// select different weights `w1` and `w2`, which are updated with
    /// `f(evid) - [w1 == w2] f(free)` and `[w1 == w2] f(evid) - f(free)` respectively.
    /// Fixed weights are left untouched.
    ///
    /// Weights are updated in place without synchronization.
    pub fn update_weight_with<P: Potential + ?Sized>(
        &self,
        vid: VarId,
        potential: &P,
    ) -> Result<()> {
        if !self.is_usable() {
            warn!(vid, "weight update on an unusable factor graph");
            return Err(GraphError::NotUsable);
        }
        let variable = self.variable(vid)?;
        let stepsize = self.stepsize;
        for edge in self.variable_edges(variable) {
            let fs = &self.compact_factors[edge];
            match variable.domain_type {
                DomainType::Boolean => {
                    let wid = self.compact_factors_weightids[edge];
                    if !self.infrs.is_fixed(wid) {
                        let grad = potential.potential(self, fs, Snapshot::Evidence)
                            - potential.potential(self, fs, Snapshot::Free);
                        self.infrs.add_to_weight(wid, stepsize * grad);
                    }
                }
                DomainType::Multinomial => {
                    let wid_evid = self.get_multinomial_weight_id(
                        &self.infrs.snapshot(Snapshot::Evidence),
                        edge,
                        None,
                    )?;
                    let wid_free = self.get_multinomial_weight_id(
                        &self.infrs.snapshot(Snapshot::Free),
                        edge,
                        None,
                    )?;
                    let equal = if wid_evid == wid_free { 1.0 } else { 0.0 };
                    let pot_evid = potential.potential(self, fs, Snapshot::Evidence);
                    let pot_free = potential.potential(self, fs, Snapshot::Free);
                    if let Some(wid) = wid_evid.filter(|wid| !self.infrs.is_fixed(*wid)) {
                        self.infrs
                            .add_to_weight(wid, stepsize * (pot_evid - equal * pot_free));
                    }
                    if let Some(wid) = wid_free.filter(|wid| !self.infrs.is_fixed(*wid)) {
                        self.infrs
                            .add_to_weight(wid, stepsize * (equal * pot_evid - pot_free));
                    }
                }
            }
        }
        Ok(())
    }

    /// Count one sample of value `value` for multinomial variable `vid`. Boolean variables have
    /// no tally and are ignored.
    pub fn record_tally(&self, vid: VarId, value: VariableValue) -> Result<()> {
        self.check_usable()?;
        let variable = self.variable(vid)?;
        if let Some(start) = variable.n_start_i_tally {
            let idx = variable.get_domain_index(value)?;
            self.infrs.increment_tally(start + idx);
        }
        Ok(())
    }

    /// Tallies of multinomial variable `vid`, one per domain value.
    pub fn tallies_of(&self, vid: VarId) -> Result<Vec<u64>> {
        self.check_usable()?;
        let variable = self.variable(vid)?;
        Ok(match variable.n_start_i_tally {
            Some(start) => self.infrs.tallies()[start..start + variable.cardinality].to_vec(),
            None => Vec::new(),
        })
    }

    /// Make `self` an independent replica of `other`.
    ///
    /// The static arrays are copied, and the inference state (weights, assignments, tallies) is
    /// reallocated: no storage is shared with `other` afterwards.
    pub fn copy_from(&mut self, other: &CompiledFactorGraph) -> Result<()> {
        if self.sizes() != other.sizes() {
            return Err(GraphError::SizeMismatch {
                expected: self.sizes(),
                got: other.sizes(),
            });
        }
        self.c_nvar = other.c_nvar;
        self.c_nfactor = other.c_nfactor;
        self.c_nweight = other.c_nweight;
        self.c_edge = other.c_edge;
        self.n_evid = other.n_evid;
        self.n_query = other.n_query;
        self.stepsize = other.stepsize;

        self.variables.clone_from(&other.variables);
        self.factors.clone_from(&other.factors);
        self.compact_factors.clone_from(&other.compact_factors);
        self.compact_factors_weightids
            .clone_from(&other.compact_factors_weightids);
        self.factor_ids.clone_from(&other.factor_ids);
        self.vifs.clone_from(&other.vifs);

        self.sorted = other.sorted;
        self.safety_check_passed = other.safety_check_passed;

        self.infrs = other.infrs.clone();
        Ok(())
    }
}
