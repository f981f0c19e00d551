use super::compiled::CompiledFactorGraph;
use super::factor_graph::{CompactFactor, FactorFunction, VariableInFactor};
use super::inference_result::{Assignment, Snapshot};

/// Evaluation of a factor function under one of the assignment snapshots of a graph.
pub trait Potential: Sync {
    fn potential(
        &self,
        graph: &CompiledFactorGraph,
        factor: &CompactFactor,
        snapshot: Snapshot,
    ) -> f64;
}

impl<F> Potential for F
where
    F: Fn(&CompiledFactorGraph, &CompactFactor, Snapshot) -> f64 + Sync,
{
    fn potential(
        &self,
        graph: &CompiledFactorGraph,
        factor: &CompactFactor,
        snapshot: Snapshot,
    ) -> f64 {
        self(graph, factor, snapshot)
    }
}

/// Evaluates the [`FactorFunction`] of the factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPotential;

impl Potential for BuiltinPotential {
    fn potential(
        &self,
        graph: &CompiledFactorGraph,
        factor: &CompactFactor,
        snapshot: Snapshot,
    ) -> f64 {
        factor.func.evaluate(
            graph.factor_variables(factor),
            &graph.infrs().snapshot(snapshot),
        )
    }
}

#[inline]
fn indicator(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl FactorFunction {
    /// Value of the function for the variables `vifs` (in argument order) under `assignment`.
    ///
    /// For the implication-like families the last argument is the head and the others form
    /// the body.
    pub fn evaluate<A: Assignment + ?Sized>(
        self,
        vifs: &[VariableInFactor],
        assignment: &A,
    ) -> f64 {
        let sat = |vif: &VariableInFactor| vif.satisfied_using(assignment.value_of(vif.vid));
        match self {
            Self::Or => indicator(vifs.iter().any(sat)),
            Self::And | Self::AndCategorical => indicator(vifs.iter().all(sat)),
            Self::Equal => match vifs.split_first() {
                Some((first, rest)) => {
                    let first = sat(first);
                    indicator(rest.iter().all(|vif| sat(vif) == first))
                }
                None => 0.0,
            },
            Self::IsTrue => indicator(vifs.first().is_some_and(sat)),
            Self::Multinomial | Self::SparseMultinomial => 1.0,
            Self::ImplyNatural | Self::ImplyMln | Self::ImplyNeg1To1 => {
                let Some((head, body)) = vifs.split_last() else {
                    return 0.0;
                };
                let head = sat(head);
                let body = body.iter().all(sat);
                match (self, body, head) {
                    (_, true, true) => 1.0,
                    (Self::ImplyNeg1To1, true, false) => -1.0,
                    (_, true, false) => 0.0,
                    (Self::ImplyMln, false, _) => 1.0,
                    (_, false, _) => 0.0,
                }
            }
            Self::Linear | Self::Ratio | Self::Logical => {
                let Some((head, body)) = vifs.split_last() else {
                    return 0.0;
                };
                let head = sat(head);
                let res = if body.is_empty() {
                    indicator(head)
                } else {
                    body.iter().filter(|&vif| !sat(vif) || head).count() as f64
                };
                match self {
                    Self::Ratio => (1.0 + res).log2(),
                    Self::Logical => indicator(res > 0.0),
                    _ => res,
                }
            }
        }
    }
}
