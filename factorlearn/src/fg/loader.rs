use super::factor_graph::{RawFactor, RawVariable, VarId, VariableValue, Weight};
use super::raw_graph::FactorGraph;
use crate::Result;

/// Source of the entities of a [`FactorGraph`].
///
/// Each step adds its entities to the graph and returns how many it added, so that
/// [`FactorGraph::load`] can check them against the announced counts.
pub trait GraphLoader {
    fn load_variables(&mut self, graph: &mut FactorGraph) -> Result<usize>;
    fn load_weights(&mut self, graph: &mut FactorGraph) -> Result<usize>;
    /// Explicit domains of multinomial variables. Called once variables are sorted.
    fn load_domains(&mut self, _graph: &mut FactorGraph) -> Result<()> {
        Ok(())
    }
    fn load_factors(&mut self, graph: &mut FactorGraph) -> Result<usize>;
}

/// In-memory [`GraphLoader`].
#[derive(Debug, Clone, Default)]
pub struct GraphSource {
    variables: Vec<RawVariable>,
    weights: Vec<Weight>,
    domains: Vec<(VarId, Vec<VariableValue>)>,
    factors: Vec<RawFactor>,
}

impl GraphSource {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn variable(mut self, variable: RawVariable) -> Self {
        self.variables.push(variable);
        self
    }
    pub fn weight(mut self, weight: Weight) -> Self {
        self.weights.push(weight);
        self
    }
    pub fn domain(mut self, vid: VarId, domain: Vec<VariableValue>) -> Self {
        self.domains.push((vid, domain));
        self
    }
    pub fn factor(mut self, factor: RawFactor) -> Self {
        self.factors.push(factor);
        self
    }
    pub fn n_var(&self) -> usize {
        self.variables.len()
    }
    pub fn n_factor(&self) -> usize {
        self.factors.len()
    }
    pub fn n_weight(&self) -> usize {
        self.weights.len()
    }
    pub fn n_edge(&self) -> usize {
        self.factors.iter().map(RawFactor::n_variables).sum()
    }

    /// Load into a graph sized after the content of the source.
    pub fn build(mut self) -> Result<FactorGraph> {
        let mut graph =
            FactorGraph::new(self.n_var(), self.n_factor(), self.n_weight(), self.n_edge());
        graph.load(&mut self)?;
        Ok(graph)
    }
}

impl GraphLoader for GraphSource {
    fn load_variables(&mut self, graph: &mut FactorGraph) -> Result<usize> {
        let variables = std::mem::take(&mut self.variables);
        let n = variables.len();
        for variable in variables {
            graph.add_variable(variable)?;
        }
        Ok(n)
    }
    fn load_weights(&mut self, graph: &mut FactorGraph) -> Result<usize> {
        let weights = std::mem::take(&mut self.weights);
        let n = weights.len();
        for weight in weights {
            graph.add_weight(weight)?;
        }
        Ok(n)
    }
    fn load_domains(&mut self, graph: &mut FactorGraph) -> Result<()> {
        for (vid, domain) in std::mem::take(&mut self.domains) {
            graph.set_domain(vid, domain)?;
        }
        Ok(())
    }
    fn load_factors(&mut self, graph: &mut FactorGraph) -> Result<usize> {
        let factors = std::mem::take(&mut self.factors);
        let n = factors.len();
        for factor in factors {
            graph.add_factor(factor)?;
        }
        Ok(n)
    }
}
