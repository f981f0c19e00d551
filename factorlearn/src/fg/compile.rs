use itertools::Itertools;
use tracing::{debug, warn};

use super::compiled::CompiledFactorGraph;
use super::factor_graph::{CompactFactor, DomainType, Factor, Variable};
use super::inference_result::InferenceResult;
use super::raw_graph::FactorGraph;
use crate::{GraphError, Result};

impl FactorGraph {
    /// Flatten the graph into `cfg`, which must have been created with the same sizes.
    ///
    /// Two independent passes lay out the edges:
    /// - factor to variables: the edges of each factor, sorted by argument position, are appended
    ///   to `vifs` and the factor records where they start;
    /// - variable to factors: for each edge of each variable (in load order), the factor id, a
    ///   compact copy of the factor and its base weight id are appended to three parallel arrays.
    ///
    /// Both passes must lay out exactly `n_edge` edges. `cfg` is left untouched on error.
    pub fn compile(&mut self, cfg: &mut CompiledFactorGraph) -> Result<()> {
        if !self.is_usable() {
            return Err(GraphError::NotUsable);
        }
        if cfg.sizes() != self.sizes() {
            return Err(GraphError::SizeMismatch {
                expected: cfg.sizes(),
                got: self.sizes(),
            });
        }

        let mut vifs = Vec::with_capacity(self.n_edge);
        let mut factors = Vec::with_capacity(self.n_factor);
        for rf in self.factors.iter_mut() {
            rf.n_start_i_vif = vifs.len();
            rf.tmp_variables.sort_by_key(|vif| vif.n_position);
            if rf
                .tmp_variables
                .iter()
                .tuple_windows()
                .any(|(a, b)| a.n_position == b.n_position)
            {
                warn!(factor = rf.id, "factor has several variables at the same position");
            }
            vifs.extend_from_slice(&rf.tmp_variables);
            factors.push(Factor::from(&*rf));
        }
        debug!(i_edge = vifs.len(), n_edge = self.n_edge, "laid out factor edges");
        check_edges("factor to variables", self.n_edge, vifs.len())?;

        let mut factor_ids = Vec::with_capacity(self.n_edge);
        let mut compact_factors = Vec::with_capacity(self.n_edge);
        let mut compact_factors_weightids = Vec::with_capacity(self.n_edge);
        let mut variables = Vec::with_capacity(self.n_var);
        let mut ntallies = 0;
        for rv in self.variables.iter() {
            let n_start_i_factors = factor_ids.len();
            let n_start_i_tally = match rv.domain_type {
                DomainType::Multinomial => {
                    let start = ntallies;
                    ntallies += rv.cardinality;
                    Some(start)
                }
                DomainType::Boolean => None,
            };
            for &fid in rv.tmp_factor_ids.iter() {
                let factor: &Factor = &factors[fid];
                factor_ids.push(fid);
                compact_factors.push(CompactFactor::from(factor));
                compact_factors_weightids.push(factor.weight_id);
            }
            variables.push(Variable::from_raw(rv, n_start_i_factors, n_start_i_tally));
        }
        debug!(
            i_edge = factor_ids.len(),
            n_edge = self.n_edge,
            ntallies,
            "laid out variable edges"
        );
        check_edges("variable to factors", self.n_edge, factor_ids.len())?;

        let mut infrs = InferenceResult::new(self.n_var, self.n_weight);
        infrs.init(&variables, &self.weights);

        cfg.c_nvar = self.c_nvar;
        cfg.c_nfactor = self.c_nfactor;
        cfg.c_nweight = self.c_nweight;
        cfg.n_evid = self.n_evid;
        cfg.n_query = self.n_query;
        cfg.stepsize = self.stepsize;
        cfg.c_edge = factor_ids.len();
        cfg.variables = variables;
        cfg.factors = factors;
        cfg.compact_factors = compact_factors;
        cfg.compact_factors_weightids = compact_factors_weightids;
        cfg.factor_ids = factor_ids;
        cfg.vifs = vifs;
        cfg.infrs = infrs;
        cfg.sorted = true;
        cfg.safety_check_passed = true;
        Ok(())
    }

    /// Compile into a freshly allocated graph.
    pub fn to_compiled(&mut self) -> Result<CompiledFactorGraph> {
        let (n_var, n_factor, n_weight, n_edge) = self.sizes();
        let mut cfg = CompiledFactorGraph::new(n_var, n_factor, n_weight, n_edge);
        self.compile(&mut cfg)?;
        Ok(cfg)
    }
}

fn check_edges(pass: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(GraphError::EdgeCount {
            pass,
            expected,
            got,
        });
    }
    Ok(())
}
