//! End-to-end planning scenarios on small hand-checkable street graphs.
//!
//! Cost arithmetic used throughout: small flows land on the 32 mm tier at
//! 71.91 EUR/m, and any network serving demand carries at least the 400 m³
//! tank at 240,000 EUR. A 100 m attachment therefore adds 7,191 EUR of pipe
//! on top of the tank.

use petgraph::visit::EdgeRef;
use std::collections::HashSet;
use wdp_algo::test_utils::{line_street, star_street, triangle_street};
use wdp_algo::{
    availability, sizing, BuilderConfig, CancelToken, NetworkBuilder, PlanConfig, Planner,
    PrecomputedBundle, StopReason,
};
use wdp_core::units::CubicMetersPerDay;
use wdp_core::{graph_utils, Network, NodeId};

const TANK_EUR: f64 = 240_000.0;

fn plan_line(budget: f64) -> wdp_algo::BuildOutcome {
    let street = line_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
    let bundle = PrecomputedBundle::compute(&street).unwrap();
    NetworkBuilder::new(&street, &bundle, BuilderConfig::lb(budget, NodeId::new(0)))
        .run(&CancelToken::new())
        .unwrap()
}

#[test]
fn s1_line_within_budget_serves_everyone() {
    // 300 m of 32 mm pipe at 71.91 EUR/m rides on the 400 m3 tank.
    let outcome = plan_line(TANK_EUR + 22_000.0);

    assert_eq!(outcome.report.stop_reason, StopReason::AllDemandServed);
    assert_eq!(outcome.report.consumption_nodes.len(), 3);
    assert_eq!(outcome.report.pipe_length_meters, 300.0);
    assert_eq!(outcome.report.percent_served, 100.0);

    // Every pipe priced at the smallest tier.
    let pipe_cost = outcome.report.cost_eur - TANK_EUR;
    assert!((pipe_cost - 300.0 * 71.91).abs() < 1e-6);
}

#[test]
fn s2_line_tight_budget_stops_at_two_nodes() {
    // Two attachments fit; the third one's 7,191 EUR of pipe does not.
    let outcome = plan_line(TANK_EUR + 20_000.0);

    assert_eq!(outcome.report.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(
        outcome.report.added_nodes,
        vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]
    );
    assert_eq!(outcome.report.pipe_length_meters, 200.0);
    assert_eq!(outcome.network.graph.edge_count(), 2);
}

#[test]
fn s3_triangle_resilience_closes_the_loop() {
    let street = triangle_street(&[100.0, 100.0, 100.0], &[0.0, 5.0, 5.0]);
    let bundle = PrecomputedBundle::compute(&street).unwrap();
    let outcome = NetworkBuilder::new(
        &street,
        &bundle,
        BuilderConfig::lbr(TANK_EUR + 30_000.0, NodeId::new(0)),
    )
    .run(&CancelToken::new())
    .unwrap();

    assert_eq!(outcome.report.stop_reason, StopReason::AllDemandServed);
    assert_eq!(outcome.network.graph.edge_count(), 3);

    // Every demand node survives any single pipe failure.
    let source = outcome.network.node_index(NodeId::new(0)).unwrap();
    for edge in outcome.network.graph.edge_indices() {
        let mut skip = HashSet::new();
        skip.insert(edge);
        let reached = graph_utils::reachable_from(&outcome.network, source, &skip);
        for check in [NodeId::new(1), NodeId::new(2)] {
            let idx = outcome.network.node_index(check).unwrap();
            assert!(reached.contains(&idx), "node {check} lost by one cut");
        }
    }
}

#[test]
fn s4_star_admits_short_leaves_first() {
    // Two near leaves (100 m) outrank two far ones (200 m); the budget fits
    // exactly the two near attachments.
    let street = star_street(&[100.0, 100.0, 200.0, 200.0], &[0.0, 10.0, 10.0, 10.0, 10.0]);
    let bundle = PrecomputedBundle::compute(&street).unwrap();
    let outcome = NetworkBuilder::new(
        &street,
        &bundle,
        BuilderConfig::lb(TANK_EUR + 15_000.0, NodeId::new(0)),
    )
    .run(&CancelToken::new())
    .unwrap();

    assert_eq!(outcome.report.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(
        outcome.report.consumption_nodes,
        vec![NodeId::new(1), NodeId::new(2)]
    );
}

#[test]
fn s4_star_equal_lengths_tie_break_on_node_id() {
    let street = star_street(&[100.0, 100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0, 10.0]);
    let bundle = PrecomputedBundle::compute(&street).unwrap();
    let outcome = NetworkBuilder::new(
        &street,
        &bundle,
        BuilderConfig::lb(TANK_EUR + 15_000.0, NodeId::new(0)),
    )
    .run(&CancelToken::new())
    .unwrap();

    // All four profits tie; the two lowest ids win the budget.
    assert_eq!(
        outcome.report.consumption_nodes,
        vec![NodeId::new(1), NodeId::new(2)]
    );
}

#[test]
fn s5_availability_on_two_edge_path() {
    let street = line_street(&[100.0, 100.0], &[0.0, 0.0, 10.0]);
    let source = street.node_index(NodeId::new(0)).unwrap();
    let far = street.node_index(NodeId::new(2)).unwrap();

    let report =
        availability::evaluate_uniform(&street, source, &[far], 0.1, 10_000, 42).unwrap();

    // Two independent pipes at 10% failure each: (0.9)^2 = 0.81.
    assert!(
        (report.node_avg_availability - 0.81).abs() < 0.01,
        "got {}",
        report.node_avg_availability
    );
    assert!(report.node_worst_availability <= report.node_avg_availability);
    assert!(report.network_availability >= 0.0 && report.network_availability <= 1.0);
}

#[test]
fn s6_diameter_catalogue_ceiling() {
    // 100 m3/day needs a ~39 mm bore, rounded up to the 63 mm tier.
    assert_eq!(
        sizing::reference_diameter(CubicMetersPerDay(100.0)),
        Some(63.0)
    );
    // A 300 mm requirement lands on the 315 mm tier.
    assert_eq!(sizing::diameter_at_least(300.0), Some(315.0));
}

fn assert_source_rooted(network: &Network, source_id: NodeId) {
    let source = network.node_index(source_id).expect("source present");
    let reached = graph_utils::reachable_from(network, source, &HashSet::new());
    assert_eq!(reached.len(), network.graph.node_count(), "network connected");
}

#[test]
fn p2_p3_final_network_is_source_rooted_and_connected() {
    for budget in [TANK_EUR + 8_000.0, TANK_EUR + 15_000.0, TANK_EUR + 22_000.0] {
        let outcome = plan_line(budget);
        assert_source_rooted(&outcome.network, NodeId::new(0));
    }
}

#[test]
fn p1_p4_cost_stays_within_budget() {
    for budget in [TANK_EUR + 8_000.0, TANK_EUR + 20_000.0, TANK_EUR + 50_000.0] {
        let outcome = plan_line(budget);
        assert!(outcome.report.cost_eur <= budget);
        assert!(outcome.report.remaining_budget_eur >= 0.0);
        assert!(
            (outcome.report.cost_eur + outcome.report.remaining_budget_eur - budget).abs() < 1e-6
        );
    }
}

#[test]
fn p5_assigned_diameters_are_catalogue_ceilings() {
    let outcome = plan_line(TANK_EUR + 22_000.0);
    for edge in outcome.network.graph.edge_references() {
        let pipe = edge.weight();
        let flow = pipe.flow.expect("sized pipe carries flow");
        let required = 1000.0 * (4.0 * flow.value() / (86_400.0 * std::f64::consts::PI)).sqrt();
        assert!(pipe.diameter.value() >= required);
        // And it is exactly the catalogue ceiling, not a larger tier.
        let expected = wdp_core::catalog::pipe_tier_at_least(required.trunc())
            .expect("flow fits the catalogue")
            .diameter;
        assert_eq!(pipe.diameter.value(), expected);
    }
}

#[test]
fn p10_identical_seeds_give_identical_plans() {
    let street = line_street(&[100.0, 100.0, 100.0], &[0.0, 10.0, 10.0, 10.0]);
    let mut config = PlanConfig::new(TANK_EUR + 22_000.0, NodeId::new(0));
    config.monte_carlo_reps = 2_000;
    config.rng_seed = 1234;

    let a = Planner::new(config.clone())
        .run(&street, &CancelToken::new())
        .unwrap();
    let b = Planner::new(config)
        .run(&street, &CancelToken::new())
        .unwrap();

    assert_eq!(a.report.build.added_nodes, b.report.build.added_nodes);
    assert_eq!(a.report.build.cost_eur, b.report.build.cost_eur);
    let (aa, ba) = (
        a.report.availability.expect("availability ran"),
        b.report.availability.expect("availability ran"),
    );
    assert_eq!(aa.node_avg_availability, ba.node_avg_availability);
    assert_eq!(aa.network_availability, ba.network_availability);
    assert_eq!(aa.mean_unsupplied_water, ba.mean_unsupplied_water);
    assert_eq!(aa.yauw, ba.yauw);
}

#[test]
fn plan_from_json_street_graph() {
    let json = r#"{
        "nodes": [
            {"id": 0, "elevation": 120.0, "consumption": 0.0},
            {"id": 1, "elevation": 118.0, "consumption": 10.0},
            {"id": 2, "elevation": 116.0, "consumption": 10.0}
        ],
        "edges": [
            {"from": 0, "to": 1, "length": 100.0},
            {"from": 1, "to": 2, "length": 100.0}
        ]
    }"#;
    let (street, diagnostics) = wdp_io::parse_street_graph(json).unwrap();
    assert!(!diagnostics.has_errors());

    let mut config = PlanConfig::new(TANK_EUR + 16_000.0, NodeId::new(0));
    config.monte_carlo_reps = 200;
    let outcome = Planner::new(config)
        .run(&street, &CancelToken::new())
        .unwrap();

    assert_eq!(outcome.report.build.stop_reason, StopReason::AllDemandServed);
    assert_eq!(outcome.report.build.percent_served, 100.0);
}
