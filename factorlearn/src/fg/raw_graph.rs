use tracing::info;

use super::factor_graph::{RawFactor, RawVariable, VarId, VariableValue, Weight};
use super::loader::GraphLoader;
use crate::{GraphError, Result};

/// Load-time representation of a factor graph.
///
/// Entities are added by a [`GraphLoader`], each variable accumulating the ids of the factors
/// that use it. The graph is usable (and can be compiled) once it is sorted and has passed the
/// safety check, which [`FactorGraph::load`] takes care of.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    pub(crate) n_var: usize,
    pub(crate) n_factor: usize,
    pub(crate) n_weight: usize,
    pub(crate) n_edge: usize,

    // counts of the entities added so far
    pub(crate) c_nvar: usize,
    pub(crate) c_nfactor: usize,
    pub(crate) c_nweight: usize,
    pub(crate) c_edge: usize,

    pub(crate) n_evid: usize,
    pub(crate) n_query: usize,

    pub(crate) stepsize: f64,

    pub(crate) variables: Vec<RawVariable>,
    pub(crate) factors: Vec<RawFactor>,
    pub(crate) weights: Vec<Weight>,

    loaded: bool,
    sorted: bool,
    safety_check_passed: bool,
}

impl FactorGraph {
    /// Empty graph, sized for the entity counts announced by the input headers.
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
            variables: Vec::with_capacity(n_var),
            factors: Vec::with_capacity(n_factor),
            weights: Vec::with_capacity(n_weight),
            loaded: false,
            sorted: false,
            safety_check_passed: false,
        }
    }

    pub fn add_variable(&mut self, variable: RawVariable) -> Result<()> {
        if variable.id >= self.n_var {
            return Err(GraphError::IdOutOfRange {
                entity: "variable",
                id: variable.id,
                n: self.n_var,
            });
        }
        if variable.is_evid {
            self.n_evid += 1;
        } else {
            self.n_query += 1;
        }
        self.c_nvar += 1;
        self.variables.push(variable);
        Ok(())
    }

    pub fn add_weight(&mut self, weight: Weight) -> Result<()> {
        if weight.id >= self.n_weight {
            return Err(GraphError::IdOutOfRange {
                entity: "weight",
                id: weight.id,
                n: self.n_weight,
            });
        }
        self.c_nweight += 1;
        self.weights.push(weight);
        Ok(())
    }

    /// Set the explicit domain of a multinomial variable. Its cardinality becomes the number of
    /// distinct values of the domain.
    pub fn set_domain(&mut self, vid: VarId, mut domain: Vec<VariableValue>) -> Result<()> {
        let n_var = self.n_var;
        let variable = self
            .variable_mut(vid)
            .ok_or(GraphError::IdOutOfRange {
                entity: "variable",
                id: vid,
                n: n_var,
            })?;
        domain.sort_unstable();
        domain.dedup();
        variable.cardinality = domain.len();
        variable.domain = Some(domain);
        Ok(())
    }

    /// Add a factor and register it in the adjacency of each of its variables.
    ///
    /// Variables must be sorted: the factor's variable ids are resolved by index.
    pub fn add_factor(&mut self, factor: RawFactor) -> Result<()> {
        if !self.sorted {
            return Err(GraphError::NotSorted);
        }
        if factor.id >= self.n_factor {
            return Err(GraphError::IdOutOfRange {
                entity: "factor",
                id: factor.id,
                n: self.n_factor,
            });
        }
        if let Some(vif) = factor
            .tmp_variables
            .iter()
            .find(|vif| vif.vid >= self.variables.len())
        {
            return Err(GraphError::UnknownVariable {
                factor: factor.id,
                vid: vif.vid,
            });
        }
        let max_wid = factor
            .sparse_weight_ids
            .iter()
            .flat_map(|table| table.values().copied())
            .fold(factor.weight_id, usize::max);
        if max_wid >= self.n_weight {
            return Err(GraphError::IdOutOfRange {
                entity: "weight",
                id: max_wid,
                n: self.n_weight,
            });
        }
        for vif in factor.tmp_variables.iter() {
            self.variables[vif.vid].tmp_factor_ids.push(factor.id);
        }
        self.c_edge += factor.n_variables();
        self.c_nfactor += 1;
        self.factors.push(factor);
        Ok(())
    }

    /// Populate the graph from `loader`.
    ///
    /// Variables and weights are loaded, then sorted by id, then domains and factors are loaded.
    /// Every loader step must load exactly the announced number of entities.
    pub fn load<L: GraphLoader + ?Sized>(&mut self, loader: &mut L) -> Result<()> {
        if self.loaded {
            return Err(GraphError::AlreadyLoaded);
        }
        self.loaded = true;

        let n_loaded = loader.load_variables(self)?;
        check_count("variables", self.n_var, n_loaded)?;
        info!(
            n_loaded,
            n_query = self.n_query,
            n_evid = self.n_evid,
            "loaded variables"
        );

        let n_loaded = loader.load_weights(self)?;
        check_count("weights", self.n_weight, n_loaded)?;
        info!(n_loaded, "loaded weights");

        self.variables.sort_by_key(|v| v.id);
        self.weights.sort_by_key(|w| w.id);
        self.sorted = true;

        loader.load_domains(self)?;

        let n_loaded = loader.load_factors(self)?;
        check_count("factors", self.n_factor, n_loaded)?;
        info!(n_loaded, n_edge = self.c_edge, "loaded factors");
        self.factors.sort_by_key(|f| f.id);

        self.safety_check()?;
        if !self.is_usable() {
            return Err(GraphError::NotUsable);
        }
        Ok(())
    }

    /// Check that variables, factors and weights are stored at the index given by their id.
    pub fn safety_check(&mut self) -> Result<()> {
        check_dense("variable", self.n_var, self.variables.iter().map(|v| v.id))?;
        check_dense("factor", self.n_factor, self.factors.iter().map(|f| f.id))?;
        check_dense("weight", self.n_weight, self.weights.iter().map(|w| w.id))?;
        self.safety_check_passed = true;
        Ok(())
    }

    pub fn is_usable(&self) -> bool {
        self.sorted && self.safety_check_passed
    }

    pub fn variables(&self) -> &[RawVariable] {
        &self.variables
    }
    pub fn factors(&self) -> &[RawFactor] {
        &self.factors
    }
    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }
    pub fn n_edge(&self) -> usize {
        self.n_edge
    }
    /// Number of edges added so far.
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
    pub(crate) fn sizes(&self) -> (usize, usize, usize, usize) {
        (self.n_var, self.n_factor, self.n_weight, self.n_edge)
    }

    fn variable_mut(&mut self, vid: VarId) -> Option<&mut RawVariable> {
        if self.variables.get(vid).is_some_and(|v| v.id == vid) {
            self.variables.get_mut(vid)
        } else {
            self.variables.iter_mut().find(|v| v.id == vid)
        }
    }
}

fn check_count(entity: &'static str, expected: usize, loaded: usize) -> Result<()> {
    if expected != loaded {
        return Err(GraphError::LoadCount {
            entity,
            expected,
            loaded,
        });
    }
    Ok(())
}

fn check_dense(
    entity: &'static str,
    expected: usize,
    ids: impl ExactSizeIterator<Item = usize>,
) -> Result<()> {
    if ids.len() != expected {
        return Err(GraphError::LoadCount {
            entity,
            expected,
            loaded: ids.len(),
        });
    }
    for (index, id) in ids.enumerate() {
        if index != id {
            return Err(GraphError::NonDenseId { entity, index, id });
        }
    }
    Ok(())
}
