use approx::assert_abs_diff_eq;
use factorlearn::fg::{
    CompactFactor, CompiledFactorGraph, FactorFunction, GraphSource, RawFactor, RawVariable,
    Snapshot, VariableInFactor, Weight,
};
use factorlearn::GraphError;
use indexmap::IndexMap;

/// Boolean evidence variable 0 with an IsTrue factor on weight 0, and a query variable 1 sharing
/// weight 1 between an IsTrue factor and an And factor over both variables.
fn boolean_graph(stepsize: f64, fixed: bool) -> CompiledFactorGraph {
    let mut graph = GraphSource::new()
        .variable(RawVariable::boolean(0, true, 1))
        .variable(RawVariable::boolean(1, false, 0))
        .weight(Weight::new(0, 0.5, fixed))
        .weight(Weight::new(1, -0.5, false))
        .factor(RawFactor::new(
            0,
            FactorFunction::IsTrue,
            0,
            vec![VariableInFactor::new(0, 0)],
        ))
        .factor(RawFactor::new(
            1,
            FactorFunction::IsTrue,
            1,
            vec![VariableInFactor::new(1, 0)],
        ))
        .factor(RawFactor::new(
            2,
            FactorFunction::And,
            1,
            vec![VariableInFactor::new(0, 0), VariableInFactor::new(1, 1)],
        ))
        .build()
        .unwrap();
    graph.set_stepsize(stepsize);
    graph.to_compiled().unwrap()
}

#[test]
fn boolean_update() {
    let cfg = boolean_graph(0.1, false);
    // free sample of the evidence variable disagrees with the evidence
    cfg.infrs().set_assignment(Snapshot::Free, 0, 0);
    let factor = cfg.compact_factors()[0];
    assert_eq!(cfg.potential(&factor, Snapshot::Evidence), Ok(1.0));
    assert_eq!(cfg.potential(&factor, Snapshot::Free), Ok(0.0));
    cfg.update_weight(0).unwrap();
    assert_abs_diff_eq!(cfg.infrs().weight_value(0), 0.6, epsilon = 1e-12);
    // And(v0, v1) is false in both snapshots since v1 = 0
    assert_abs_diff_eq!(cfg.infrs().weight_value(1), -0.5, epsilon = 1e-12);
}

#[test]
fn boolean_update_shared_weight() {
    let cfg = boolean_graph(0.1, false);
    cfg.infrs().set_assignment(Snapshot::Evidence, 1, 1);
    cfg.infrs().set_assignment(Snapshot::Free, 1, 0);
    cfg.update_weight(1).unwrap();
    // both factors of variable 1 use weight 1 and have gradient 1
    assert_abs_diff_eq!(cfg.infrs().weight_value(1), -0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(cfg.infrs().weight_value(0), 0.5, epsilon = 1e-12);
}

#[test]
fn boolean_update_fixed() {
    let cfg = boolean_graph(0.1, true);
    cfg.infrs().set_assignment(Snapshot::Free, 0, 0);
    cfg.update_weight(0).unwrap();
    assert_eq!(cfg.infrs().weight_value(0), 0.5);
}

#[test]
fn boolean_update_custom_potential() {
    let cfg = boolean_graph(0.5, false);
    let potential = |_: &CompiledFactorGraph, factor: &CompactFactor, snapshot: Snapshot| {
        match (factor.id, snapshot) {
            (0, Snapshot::Evidence) => 2.0,
            (0, Snapshot::Free) => 0.5,
            _ => 0.0,
        }
    };
    cfg.update_weight_with(0, &potential).unwrap();
    assert_abs_diff_eq!(cfg.infrs().weight_value(0), 0.5 + 0.5 * 1.5, epsilon = 1e-12);
}

#[test]
fn update_unusable_graph() {
    let cfg = CompiledFactorGraph::new(2, 3, 2, 4);
    assert!(!cfg.is_usable());
    assert_eq!(cfg.update_weight(0), Err(GraphError::NotUsable));
}

#[test]
fn lookups_on_unusable_graph() {
    let cfg = CompiledFactorGraph::new(1, 1, 1, 1);
    assert_eq!(
        cfg.get_multinomial_weight_id(&vec![0i64], 0, None),
        Err(GraphError::NotUsable)
    );
    let factor = CompactFactor {
        id: 0,
        func: FactorFunction::IsTrue,
        n_variables: 1,
        n_start_i_vif: 0,
    };
    assert_eq!(
        cfg.potential(&factor, Snapshot::Evidence),
        Err(GraphError::NotUsable)
    );
    assert_eq!(
        cfg.potential_with_proposal(&factor, Snapshot::Free, 0, 1),
        Err(GraphError::NotUsable)
    );
    assert_eq!(cfg.record_tally(0, 0), Err(GraphError::NotUsable));
    assert_eq!(cfg.tallies_of(0), Err(GraphError::NotUsable));
}

#[test]
fn lookups_past_last_edge() {
    let cfg = boolean_graph(0.1, false);
    assert_eq!(cfg.c_edge(), 4);
    assert_eq!(
        cfg.get_multinomial_weight_id(&vec![1i64, 0], 4, None),
        Err(GraphError::IdOutOfRange {
            entity: "edge",
            id: 4,
            n: 4
        })
    );
    // a descriptor whose variables run past the end of the edge array
    let mut factor = cfg.compact_factors()[3];
    factor.n_start_i_vif = 3;
    assert_eq!(
        cfg.potential(&factor, Snapshot::Evidence),
        Err(GraphError::IdOutOfRange {
            entity: "edge",
            id: 3,
            n: 4
        })
    );
    factor.n_start_i_vif = usize::MAX;
    assert!(matches!(
        cfg.potential_with_proposal(&factor, Snapshot::Free, 0, 1),
        Err(GraphError::IdOutOfRange { entity: "edge", .. })
    ));
}

#[test]
fn update_unknown_variable() {
    let cfg = boolean_graph(0.1, false);
    assert!(matches!(
        cfg.update_weight(2),
        Err(GraphError::IdOutOfRange { id: 2, .. })
    ));
}

/// Multinomial variables 0 (cardinality 2) and 1 (cardinality 3) in a dense factor with base
/// weight 4. Variable 0 is declared second but has the lowest position.
fn multinomial_graph(stepsize: f64) -> CompiledFactorGraph {
    let mut source = GraphSource::new()
        .variable(RawVariable::multinomial(0, 2, true, 1))
        .variable(RawVariable::multinomial(1, 3, false, 2))
        .factor(RawFactor::new(
            0,
            FactorFunction::Multinomial,
            4,
            vec![VariableInFactor::new(1, 7), VariableInFactor::new(0, 2)],
        ));
    for wid in 0..10 {
        source = source.weight(Weight::new(wid, 0.0, wid == 9));
    }
    let mut graph = source.build().unwrap();
    graph.set_stepsize(stepsize);
    graph.to_compiled().unwrap()
}

#[test]
fn multinomial_offset() {
    let cfg = multinomial_graph(0.1);
    let v0 = &cfg.variables()[0];
    let edge = v0.n_start_i_factors;
    let assignment: Vec<i64> = vec![1, 2];
    assert_eq!(
        cfg.get_multinomial_weight_id(&assignment, edge, None),
        Ok(Some(4 + 5))
    );
    assert_eq!(
        cfg.get_multinomial_weight_id(&assignment, edge, Some((1, 0))),
        Ok(Some(4 + 3))
    );
    assert_eq!(
        cfg.get_multinomial_weight_id(&assignment, edge, Some((0, 0))),
        Ok(Some(4 + 2))
    );
    assert_eq!(
        cfg.get_multinomial_weight_id(&assignment, edge, Some((1, 3))),
        Err(GraphError::ValueOutOfDomain { vid: 1, value: 3 })
    );
}

#[test]
fn multinomial_offset_uses_edge_base() {
    let cfg = multinomial_graph(0.1);
    let v1 = &cfg.variables()[1];
    let edge = v1.n_start_i_factors;
    assert_eq!(cfg.compact_factors_weightids()[edge], 4);
    let assignment: Vec<i64> = vec![0, 1];
    assert_eq!(
        cfg.get_multinomial_weight_id(assignment.as_slice(), edge, None),
        Ok(Some(4 + 1))
    );
}

#[test]
fn multinomial_update_distinct_weights() {
    let cfg = multinomial_graph(0.1);
    // evidence (1, 2) -> weight 9 (fixed), free (1, 0) -> weight 7
    cfg.infrs().set_assignment(Snapshot::Free, 1, 0);
    cfg.update_weight(0).unwrap();
    assert_eq!(cfg.infrs().weight_value(9), 0.0);
    assert_abs_diff_eq!(cfg.infrs().weight_value(7), -0.1, epsilon = 1e-12);

    // evidence (0, 1) -> weight 5, free (1, 0) -> weight 7
    cfg.infrs().set_assignment(Snapshot::Evidence, 0, 0);
    cfg.infrs().set_assignment(Snapshot::Evidence, 1, 1);
    cfg.update_weight(1).unwrap();
    assert_abs_diff_eq!(cfg.infrs().weight_value(5), 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(cfg.infrs().weight_value(7), -0.2, epsilon = 1e-12);
}

#[test]
fn multinomial_update_same_weight() {
    let cfg = multinomial_graph(0.1);
    cfg.infrs().set_assignment(Snapshot::Evidence, 1, 1);
    cfg.infrs().set_assignment(Snapshot::Free, 1, 1);
    let potential = |_: &CompiledFactorGraph, _: &CompactFactor, snapshot: Snapshot| match snapshot
    {
        Snapshot::Evidence => 1.0,
        Snapshot::Free => 0.25,
    };
    // both snapshots select weight 4 + 1 * 3 + 1 = 8; each of the two updates of the slot adds
    // stepsize * (f(evid) - f(free))
    cfg.update_weight_with(0, &potential).unwrap();
    assert_abs_diff_eq!(cfg.infrs().weight_value(8), 2.0 * 0.1 * 0.75, epsilon = 1e-12);
    let others: f64 = (0..10)
        .filter(|wid| *wid != 8)
        .map(|wid| cfg.infrs().weight_value(wid).abs())
        .sum();
    assert_eq!(others, 0.0);
}

#[test]
fn multinomial_update_no_change_when_snapshots_agree() {
    let cfg = multinomial_graph(0.1);
    cfg.infrs().set_assignment(Snapshot::Free, 1, 2);
    cfg.update_weight(1).unwrap();
    assert!(cfg.infrs().weight_values().iter().all(|w| *w == 0.0));
}

#[test]
fn multinomial_domain() {
    let mut graph = GraphSource::new()
        .variable(RawVariable::multinomial(0, 0, false, 20))
        .domain(0, vec![30, 10, 20])
        .weight(Weight::new(0, 0.0, false))
        .weight(Weight::new(1, 0.0, false))
        .weight(Weight::new(2, 0.0, false))
        .factor(RawFactor::new(
            0,
            FactorFunction::Multinomial,
            0,
            vec![VariableInFactor::new(0, 0)],
        ))
        .build()
        .unwrap();
    let cfg = graph.to_compiled().unwrap();
    assert_eq!(cfg.variables()[0].get_domain_index(30), Ok(2));
    assert_eq!(
        cfg.get_multinomial_weight_id(&vec![20i64], 0, None),
        Ok(Some(1))
    );
    assert_eq!(
        cfg.get_multinomial_weight_id(&vec![25i64], 0, None),
        Err(GraphError::ValueOutOfDomain { vid: 0, value: 25 })
    );
    cfg.infrs().set_assignment(Snapshot::Free, 0, 25);
    assert_eq!(
        cfg.update_weight(0),
        Err(GraphError::ValueOutOfDomain { vid: 0, value: 25 })
    );
}

#[test]
fn sparse_multinomial() {
    let mut table = IndexMap::new();
    table.insert(1, 7);
    table.insert(0, 3);
    let mut source = GraphSource::new()
        .variable(RawVariable::multinomial(0, 3, true, 1))
        .factor(RawFactor::sparse(0, vec![VariableInFactor::new(0, 0)], table));
    for wid in 0..8 {
        source = source.weight(Weight::new(wid, 1.0, false));
    }
    let mut graph = source.build().unwrap();
    graph.set_stepsize(0.5);
    let cfg = graph.to_compiled().unwrap();
    assert_eq!(cfg.get_multinomial_weight_id(&vec![0i64], 0, None), Ok(Some(3)));
    assert_eq!(cfg.get_multinomial_weight_id(&vec![2i64], 0, None), Ok(None));

    // evidence 1 -> weight 7, free 2 -> no weight
    cfg.infrs().set_assignment(Snapshot::Free, 0, 2);
    cfg.update_weight(0).unwrap();
    let expected = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.5];
    assert_eq!(cfg.infrs().weight_values(), expected);
}

#[test]
fn tallies() {
    let cfg = multinomial_graph(0.1);
    cfg.record_tally(1, 2).unwrap();
    cfg.record_tally(1, 2).unwrap();
    cfg.record_tally(0, 0).unwrap();
    assert_eq!(cfg.tallies_of(0).unwrap(), vec![1, 0]);
    assert_eq!(cfg.tallies_of(1).unwrap(), vec![0, 0, 2]);
    assert_eq!(cfg.infrs().tallies(), vec![1, 0, 0, 0, 2]);
    assert_eq!(
        cfg.record_tally(0, 2),
        Err(GraphError::ValueOutOfDomain { vid: 0, value: 2 })
    );
}

#[test]
fn marginals() {
    let cfg = boolean_graph(0.1, false);
    assert_eq!(cfg.infrs().marginal(1), None);
    for value in [1, 0, 1, 1] {
        cfg.infrs().set_assignment(Snapshot::Free, 1, value);
        cfg.infrs().aggregate(1);
    }
    assert_eq!(cfg.infrs().marginal(1), Some(0.75));
}

#[test]
fn multinomial_block_past_last_weight() {
    // a block of 3 weights starting at 1 with only 2 weights loaded
    let mut graph = GraphSource::new()
        .variable(RawVariable::multinomial(0, 3, false, 2))
        .weight(Weight::new(0, 0.0, false))
        .weight(Weight::new(1, 0.0, false))
        .factor(RawFactor::new(
            0,
            FactorFunction::Multinomial,
            1,
            vec![VariableInFactor::new(0, 0)],
        ))
        .build()
        .unwrap();
    let cfg = graph.to_compiled().unwrap();
    assert_eq!(cfg.get_multinomial_weight_id(&vec![0i64], 0, None), Ok(Some(1)));
    assert_eq!(
        cfg.update_weight(0),
        Err(GraphError::IdOutOfRange {
            entity: "weight",
            id: 3,
            n: 2
        })
    );
}

#[test]
fn sparse_offset_overflow() {
    // the joint domain has 2^65 values, only the first one has a weight
    let card = 1 << 13;
    let mut table = IndexMap::new();
    table.insert(0, 0);
    let mut source = GraphSource::new().weight(Weight::new(0, 0.0, false));
    for vid in 0..5 {
        source = source.variable(RawVariable::multinomial(vid, card, false, 0));
    }
    let vifs = (0..5).map(|vid| VariableInFactor::new(vid, vid)).collect();
    let mut graph = source
        .factor(RawFactor::sparse(0, vifs, table))
        .build()
        .unwrap();
    let cfg = graph.to_compiled().unwrap();
    assert_eq!(
        cfg.get_multinomial_weight_id(&vec![0i64; 5], 0, None),
        Ok(Some(0))
    );
    let last = (card - 1) as i64;
    assert_eq!(
        cfg.get_multinomial_weight_id(&vec![last; 5], 0, None),
        Err(GraphError::OffsetOverflow { factor: 0 })
    );
    for vid in 0..5 {
        cfg.infrs().set_assignment(Snapshot::Free, vid, last);
    }
    assert_eq!(
        cfg.update_weight(0),
        Err(GraphError::OffsetOverflow { factor: 0 })
    );
}
