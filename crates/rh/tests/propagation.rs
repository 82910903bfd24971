use indexmap::IndexMap;
use proptest::prelude::*;
use rh::{Configuration, FormState, MeshBuilder, MeshSpec, Session, Strategy, Value};
use serde_json::json;
use std::sync::Arc;

fn build(spec: serde_json::Value) -> Configuration {
    let spec: MeshSpec = serde_json::from_value(spec).unwrap();
    MeshBuilder::new(spec).build()
}

fn temperature() -> Configuration {
    build(json!({
        "mesh_spec": {
            "fahrenheit": ["celsius"],
            "kelvin": ["celsius"],
            "celsius": ["fahrenheit"]
        },
        "functions_spec": {
            "fahrenheit": "return celsius * 9 / 5 + 32;",
            "kelvin": "return celsius + 273.15;",
            "celsius": "function(fahrenheit) { return (fahrenheit - 32) * 5 / 9; }"
        },
        "initial_values": {"celsius": 0, "fahrenheit": 32, "kelvin": 273.15}
    }))
}

/// `v1 <- v0`, `v2 <- v1`, ... declared last link first, so every sweep only
/// pushes the edit one step further.
fn chain(depth: usize) -> Configuration {
    let mut mesh = serde_json::Map::new();
    let mut functions = serde_json::Map::new();
    for index in (1..=depth).rev() {
        mesh.insert(format!("v{index}"), json!([format!("v{}", index - 1)]));
        functions.insert(format!("v{index}"), json!(format!("v{} + 1", index - 1)));
    }
    build(json!({"mesh_spec": mesh, "functions_spec": functions}))
}

#[test]
fn edit_propagates_through_a_bidirectional_mesh() {
    let configuration = temperature();
    let propagation = configuration.propagator().propagate_with_report(
        &configuration.initial_state(),
        "celsius",
        100,
    );
    assert!(propagation.converged);
    assert!(propagation.failures.is_empty());
    let state = propagation.state;
    assert_eq!(state.get("celsius"), &Value::Integer(100));
    assert_eq!(state.get("fahrenheit"), &Value::Integer(212));
    assert!((state.get("kelvin").as_f64().unwrap() - 373.15).abs() < 1e-9);

    let state = configuration.propagator().propagate(&state, "fahrenheit", 32);
    assert_eq!(state.get("fahrenheit"), &Value::Integer(32));
    assert_eq!(state.get("celsius"), &Value::Integer(0));
    assert!((state.get("kelvin").as_f64().unwrap() - 273.15).abs() < 1e-9);
}

#[test]
fn chain_converges_within_depth_plus_one_rounds() {
    for depth in [1, 2, 5, 12] {
        let configuration = chain(depth);
        let propagation =
            configuration
                .propagator()
                .propagate_with_report(&FormState::new(), "v0", 0);
        assert!(propagation.converged);
        assert!(propagation.rounds <= depth + 1, "depth {depth}: {} rounds", propagation.rounds);
        assert_eq!(
            propagation.state.get(&format!("v{depth}")),
            &Value::Integer(depth as i64)
        );
    }
}

#[test]
fn chain_longer_than_the_round_cap_is_cut_short() {
    let configuration = chain(60);
    let propagation = configuration
        .propagator()
        .propagate_with_report(&FormState::new(), "v0", 0);
    assert!(!propagation.converged);
    assert_eq!(propagation.rounds, rh::DEFAULT_MAX_ROUNDS);
    assert_eq!(propagation.state.get("v50"), &Value::Integer(50));
    assert!(propagation.state.get("v51").is_undefined());
}

#[test]
fn propagating_the_same_value_again_changes_nothing() {
    let configuration = Arc::new(temperature());
    let mut session = Session::new(Arc::clone(&configuration));
    assert!(!session.edit("celsius", 37).is_empty());
    let settled = session.state().clone();
    assert!(session.edit("celsius", 37).is_empty());
    assert_eq!(session.state(), &settled);

    let again = configuration.propagator().propagate(&settled, "celsius", 37);
    assert!(again.changes_since(&settled).is_empty());
}

#[test]
fn oscillating_cycle_returns_last_state_at_the_cap() {
    let configuration = build(json!({
        "mesh_spec": {"ping": ["pong"], "pong": ["ping"]},
        "functions_spec": {"ping": "pong + 1", "pong": "ping + 1"},
        "initial_values": {"ping": 0, "pong": 0}
    }));
    let propagation = configuration
        .propagator()
        .propagate_with_report(&configuration.initial_state(), "trigger", true);
    assert!(!propagation.converged);
    assert_eq!(propagation.rounds, 50);
    assert_eq!(propagation.state.get("pong"), &Value::Integer(100));
}

#[test]
fn failing_computation_is_skipped() {
    let configuration = build(json!({
        "mesh_spec": {
            "label": ["name"],
            "initial": ["name"],
            "length": ["name"]
        },
        "functions_spec": {
            "label": "'Hello, ' + name",
            "initial": "name[0]",
            "length": "name.length"
        },
        "initial_values": {"initial": "?"}
    }));
    let propagation = configuration.propagator().propagate_with_report(
        &configuration.initial_state(),
        "name",
        "",
    );
    assert!(propagation.converged);
    let state = &propagation.state;
    assert_eq!(state.get("label"), &Value::text("Hello, "));
    assert_eq!(state.get("initial"), &Value::text("?"));
    assert_eq!(state.get("length"), &Value::Integer(0));
    let failed: Vec<_> = propagation
        .failures
        .iter()
        .map(|failure| failure.variable.as_str())
        .collect();
    assert_eq!(failed, ["initial"]);
}

#[test]
fn derived_variables_without_computation_keep_their_value() {
    let configuration = build(json!({
        "mesh_spec": {"total": ["price"], "note": ["total"]},
        "functions_spec": {"total": "price * 2"},
        "initial_values": {"note": "unchanged"}
    }));
    let state = configuration
        .propagator()
        .propagate(&configuration.initial_state(), "price", 4);
    assert_eq!(state.get("total"), &Value::Integer(8));
    assert_eq!(state.get("note"), &Value::text("unchanged"));
}

#[test]
fn malformed_computation_does_not_block_the_rest_of_the_mesh() {
    let configuration = build(json!({
        "mesh_spec": {"fahrenheit": ["celsius"], "label": ["fahrenheit"]},
        "functions_spec": {
            "fahrenheit": "celsius * 9 / 5 + 32",
            "label": "'Temperature: ' + fahrenheit +"
        },
        "initial_values": {"celsius": 0, "label": "n/a"}
    }));
    let failed: Vec<_> = configuration
        .compile_errors()
        .iter()
        .map(|error| error.variable.as_str())
        .collect();
    assert_eq!(failed, ["label"]);

    let propagation = configuration.propagator().propagate_with_report(
        &configuration.initial_state(),
        "celsius",
        100,
    );
    assert!(propagation.converged);
    assert_eq!(propagation.state.get("fahrenheit"), &Value::Integer(212));
    assert_eq!(propagation.state.get("label"), &Value::text("n/a"));
}

#[test]
fn text_methods_and_templates_propagate() {
    let configuration = build(json!({
        "mesh_spec": {
            "output": ["input"],
            "area": ["slider_size"],
            "readonly_summary": ["area", "slider_size"]
        },
        "functions_spec": {
            "output": "return input.toUpperCase();",
            "area": "return slider_size * slider_size * 0.5;",
            "readonly_summary": "return `Area: ${area.toFixed(2)}, Size: ${slider_size}`;"
        },
        "initial_values": {"input": "hello", "slider_size": 5}
    }));
    assert!(configuration.compile_errors().is_empty());
    let state = configuration
        .propagator()
        .settle(&configuration.initial_state())
        .state;
    assert_eq!(state.get("output"), &Value::text("HELLO"));
    assert_eq!(state.get("readonly_summary"), &Value::text("Area: 12.50, Size: 5"));

    let state = configuration.propagator().propagate(&state, "slider_size", 3);
    assert_eq!(state.get("readonly_summary"), &Value::text("Area: 4.50, Size: 3"));
}

#[test]
fn components_strategy_agrees_with_full_sweep() {
    let spec = json!({
        "mesh_spec": {
            "summary": ["fahrenheit", "kelvin"],
            "fahrenheit": ["celsius"],
            "kelvin": ["celsius"],
            "celsius": ["fahrenheit"]
        },
        "functions_spec": {
            "summary": "fahrenheit + ' F / ' + kelvin + ' K'",
            "fahrenheit": "celsius * 9 / 5 + 32",
            "kelvin": "celsius + 273",
            "celsius": "(fahrenheit - 32) * 5 / 9"
        },
        "initial_values": {"celsius": 0}
    });
    let full = build(spec.clone());
    let components = MeshBuilder::new(serde_json::from_value(spec).unwrap())
        .with_options(rh::BuilderOptions {
            strategy: Strategy::Components,
            ..Default::default()
        })
        .build();
    for (variable, value) in [("celsius", 100), ("fahrenheit", -40), ("kelvin", 0)] {
        let expected = full
            .propagator()
            .propagate(&full.initial_state(), variable, value);
        let actual = components
            .propagator()
            .propagate(&components.initial_state(), variable, value);
        assert_eq!(actual, expected, "editing {variable}");
    }
    let state = components
        .propagator()
        .propagate(&components.initial_state(), "fahrenheit", -40);
    assert_eq!(state.get("summary"), &Value::text("-40 F / 233 K"));
}

/// `a` and `b` copy each other, so any shared value is a fixed point. A full
/// sweep evaluates `a` before `x` catches up with the edit, while the
/// components strategy settles `x` first.
#[test]
fn strategies_may_pick_different_fixed_points_of_a_cycle() {
    let spec = json!({
        "mesh_spec": {"a": ["b", "x"], "b": ["a"], "x": ["i"]},
        "functions_spec": {"a": "x > 0 ? b : 7", "b": "a", "x": "i"},
        "initial_values": {"a": 1, "b": 1, "x": 0, "i": 0}
    });
    let full = build(spec.clone());
    let components = MeshBuilder::new(serde_json::from_value(spec).unwrap())
        .with_options(rh::BuilderOptions {
            strategy: Strategy::Components,
            ..Default::default()
        })
        .build();

    let swept = full
        .propagator()
        .propagate_with_report(&full.initial_state(), "i", 10);
    let scheduled = components
        .propagator()
        .propagate_with_report(&components.initial_state(), "i", 10);
    assert!(swept.converged && scheduled.converged);
    assert_eq!(swept.state.get("x"), scheduled.state.get("x"));
    assert_eq!(
        (swept.state.get("a"), swept.state.get("b")),
        (&Value::Integer(7), &Value::Integer(7))
    );
    assert_eq!(
        (scheduled.state.get("a"), scheduled.state.get("b")),
        (&Value::Integer(1), &Value::Integer(1))
    );
}

proptest! {
    #[test]
    fn edited_variable_keeps_the_edited_value(
        edited in prop::sample::select(vec!["celsius", "fahrenheit", "kelvin"]),
        value in -1.0e6f64..1.0e6,
    ) {
        let configuration = temperature();
        let state = configuration
            .propagator()
            .propagate(&configuration.initial_state(), edited, value);
        prop_assert_eq!(state.get(edited), &Value::Number(value));
    }

    #[test]
    fn settled_state_is_a_fixed_point(celsius in -500i64..500) {
        let configuration = MeshBuilder::new(MeshSpec::template()).build();
        let state = configuration
            .propagator()
            .propagate(&configuration.initial_state(), "celsius", celsius);
        let again = configuration.propagator().settle(&state);
        prop_assert!(again.converged);
        prop_assert!(again.state.changes_since(&state).is_empty());
    }
}

#[test]
fn edit_order_is_declaration_order() {
    let configuration = temperature();
    let state = configuration
        .propagator()
        .propagate(&configuration.initial_state(), "celsius", 10);
    let order: Vec<_> = state.iter().map(|(variable, _)| variable).collect();
    assert_eq!(order, ["celsius", "fahrenheit", "kelvin"]);
    let visible: IndexMap<_, _> = configuration.visibility(&state);
    assert!(visible.is_empty());
}
