use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{GraphError, Result};

pub type VarId = usize;
pub type FactorId = usize;
pub type WeightId = usize;
/// Index into the flat edge arrays of a compiled graph.
pub type EdgeId = usize;
pub type VariableValue = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainType {
    Boolean,
    Multinomial,
}

impl TryFrom<u32> for DomainType {
    type Error = GraphError;
    fn try_from(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::Boolean),
            1 => Ok(Self::Multinomial),
            _ => Err(GraphError::UnknownDomainType(code)),
        }
    }
}

/// Factor function families, with their numeric `func_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorFunction {
    ImplyNatural,
    Or,
    And,
    Equal,
    IsTrue,
    Multinomial,
    Linear,
    Ratio,
    Logical,
    ImplyNeg1To1,
    AndCategorical,
    ImplyMln,
    SparseMultinomial,
}

impl FactorFunction {
    pub fn func_id(self) -> u32 {
        match self {
            Self::ImplyNatural => 0,
            Self::Or => 1,
            Self::And => 2,
            Self::Equal => 3,
            Self::IsTrue => 4,
            Self::Multinomial => 5,
            Self::Linear => 7,
            Self::Ratio => 8,
            Self::Logical => 9,
            Self::ImplyNeg1To1 => 11,
            Self::AndCategorical => 12,
            Self::ImplyMln => 13,
            Self::SparseMultinomial => 14,
        }
    }
}

impl TryFrom<u32> for FactorFunction {
    type Error = GraphError;
    fn try_from(func_id: u32) -> Result<Self> {
        Ok(match func_id {
            0 => Self::ImplyNatural,
            1 => Self::Or,
            2 => Self::And,
            3 => Self::Equal,
            4 => Self::IsTrue,
            5 => Self::Multinomial,
            7 => Self::Linear,
            8 => Self::Ratio,
            9 => Self::Logical,
            11 => Self::ImplyNeg1To1,
            12 => Self::AndCategorical,
            13 => Self::ImplyMln,
            14 => Self::SparseMultinomial,
            _ => return Err(GraphError::UnknownFactorFunction(func_id)),
        })
    }
}

/// One incidence between a factor and one of its argument variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInFactor {
    pub vid: VarId,
    /// Argument position of the variable in the factor function.
    pub n_position: usize,
    pub is_positive: bool,
    pub equal_to: VariableValue,
}

impl VariableInFactor {
    /// Positive literal `variable == 1`.
    pub fn new(vid: VarId, n_position: usize) -> Self {
        Self::with_predicate(vid, n_position, true, 1)
    }
    pub fn with_predicate(
        vid: VarId,
        n_position: usize,
        is_positive: bool,
        equal_to: VariableValue,
    ) -> Self {
        Self {
            vid,
            n_position,
            is_positive,
            equal_to,
        }
    }
    #[inline]
    pub fn satisfied_using(&self, value: VariableValue) -> bool {
        (value == self.equal_to) == self.is_positive
    }
}

/// Variable as produced by a loader, before compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVariable {
    pub id: VarId,
    pub domain_type: DomainType,
    pub is_evid: bool,
    /// Number of values, only meaningful for multinomial variables.
    pub cardinality: usize,
    pub assignment_evid: VariableValue,
    pub assignment_free: VariableValue,
    /// Sorted explicit domain, if any.
    pub domain: Option<Vec<VariableValue>>,
    // ids of the factors that use this variable, in load order
    pub(crate) tmp_factor_ids: Vec<FactorId>,
}

impl RawVariable {
    pub fn boolean(id: VarId, is_evid: bool, init_value: VariableValue) -> Self {
        Self::new(id, DomainType::Boolean, 2, is_evid, init_value)
    }
    pub fn multinomial(
        id: VarId,
        cardinality: usize,
        is_evid: bool,
        init_value: VariableValue,
    ) -> Self {
        Self::new(id, DomainType::Multinomial, cardinality, is_evid, init_value)
    }
    pub fn new(
        id: VarId,
        domain_type: DomainType,
        cardinality: usize,
        is_evid: bool,
        init_value: VariableValue,
    ) -> Self {
        Self {
            id,
            domain_type,
            is_evid,
            cardinality,
            assignment_evid: init_value,
            assignment_free: init_value,
            domain: None,
            tmp_factor_ids: Vec::new(),
        }
    }
    /// Factors that use this variable, in the order they were loaded.
    pub fn factor_ids(&self) -> &[FactorId] {
        &self.tmp_factor_ids
    }
}

/// Compiled variable: the raw record without the adjacency scaffolding, plus its offsets into
/// the flat arrays of the compiled graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: VarId,
    pub domain_type: DomainType,
    pub is_evid: bool,
    pub cardinality: usize,
    pub assignment_evid: VariableValue,
    pub assignment_free: VariableValue,
    pub domain: Option<Vec<VariableValue>>,
    pub n_factors: usize,
    pub n_start_i_factors: EdgeId,
    /// Start of the tally block, for multinomial variables.
    pub n_start_i_tally: Option<usize>,
}

impl Variable {
    pub(crate) fn from_raw(
        rv: &RawVariable,
        n_start_i_factors: EdgeId,
        n_start_i_tally: Option<usize>,
    ) -> Self {
        Self {
            id: rv.id,
            domain_type: rv.domain_type,
            is_evid: rv.is_evid,
            cardinality: rv.cardinality,
            assignment_evid: rv.assignment_evid,
            assignment_free: rv.assignment_free,
            domain: rv.domain.clone(),
            n_factors: rv.tmp_factor_ids.len(),
            n_start_i_factors,
            n_start_i_tally,
        }
    }

    /// Position of `value` in the domain of the variable.
    #[inline]
    pub fn get_domain_index(&self, value: VariableValue) -> Result<usize> {
        let idx = match &self.domain {
            Some(domain) => domain.binary_search(&value).ok(),
            None => usize::try_from(value)
                .ok()
                .filter(|v| *v < self.cardinality),
        };
        idx.ok_or(GraphError::ValueOutOfDomain {
            vid: self.id,
            value,
        })
    }
}

/// Factor as produced by a loader, before compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFactor {
    pub id: FactorId,
    pub func: FactorFunction,
    /// Base weight. Its meaning depends on `func`.
    pub weight_id: WeightId,
    /// Offset to weight table of sparse multinomial factors.
    pub sparse_weight_ids: Option<IndexMap<usize, WeightId>>,
    // edges, in declaration order until compilation sorts them by position
    pub(crate) tmp_variables: Vec<VariableInFactor>,
    pub(crate) n_start_i_vif: EdgeId,
}

impl RawFactor {
    pub fn new(
        id: FactorId,
        func: FactorFunction,
        weight_id: WeightId,
        variables: Vec<VariableInFactor>,
    ) -> Self {
        Self {
            id,
            func,
            weight_id,
            sparse_weight_ids: None,
            tmp_variables: variables,
            n_start_i_vif: 0,
        }
    }
    pub fn sparse(
        id: FactorId,
        variables: Vec<VariableInFactor>,
        weight_ids: IndexMap<usize, WeightId>,
    ) -> Self {
        let base = weight_ids.values().copied().min().unwrap_or(0);
        Self {
            sparse_weight_ids: Some(weight_ids),
            ..Self::new(id, FactorFunction::SparseMultinomial, base, variables)
        }
    }
    pub fn n_variables(&self) -> usize {
        self.tmp_variables.len()
    }
    pub fn variables(&self) -> &[VariableInFactor] {
        &self.tmp_variables
    }
}

/// Compiled factor. Its variables are `vifs[n_start_i_vif..n_start_i_vif + n_variables]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub id: FactorId,
    pub func: FactorFunction,
    pub n_variables: usize,
    pub n_start_i_vif: EdgeId,
    pub weight_id: WeightId,
    pub sparse_weight_ids: Option<IndexMap<usize, WeightId>>,
}

impl From<&RawFactor> for Factor {
    fn from(rf: &RawFactor) -> Self {
        Self {
            id: rf.id,
            func: rf.func,
            n_variables: rf.n_variables(),
            n_start_i_vif: rf.n_start_i_vif,
            weight_id: rf.weight_id,
            sparse_weight_ids: rf.sparse_weight_ids.clone(),
        }
    }
}

/// Denormalized factor descriptor stored once per variable-to-factor edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactFactor {
    pub id: FactorId,
    pub func: FactorFunction,
    pub n_variables: usize,
    pub n_start_i_vif: EdgeId,
}

impl From<&Factor> for CompactFactor {
    fn from(f: &Factor) -> Self {
        Self {
            id: f.id,
            func: f.func,
            n_variables: f.n_variables,
            n_start_i_vif: f.n_start_i_vif,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub id: WeightId,
    pub value: f64,
    /// Fixed weights are never learned.
    pub is_fixed: bool,
}

impl Weight {
    pub fn new(id: WeightId, value: f64, is_fixed: bool) -> Self {
        Self {
            id,
            value,
            is_fixed,
        }
    }
}
