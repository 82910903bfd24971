use rh::analysis::{complexity, visualize_mesh};
use rh::validation::{DiagnosticKind, Severity};
use rh::{MeshBuilder, MeshSpec, MeshValidator, Value};
use serde_json::json;

const LOAN: &str = r#"
[mesh_spec]
monthly_payment = ["principal", "rate_percent", "years"]
total_paid = ["monthly_payment", "years"]
slider_years_display = ["years"]
readonly_summary = ["total_paid"]

[functions_spec]
monthly_payment = """
const r = rate_percent / 100 / 12;
const n = years * 12;
return r == 0 ? principal / n : principal * r / (1 - 1 / (1 + r) ** n);
"""
total_paid = "Math.round(monthly_payment * years * 12)"
slider_years_display = "years"
readonly_summary = "'Total: ' + total_paid"

[initial_values]
principal = 200000
rate_percent = 6.0
years = 30
email_contact = ""
tags_labels = ["home"]
enabled = true

[field_overrides.principal]
minimum = 1000
maximum = 1000000
"ui:help" = "Amount borrowed"

[field_overrides.email_contact]
format = "email"
pattern = ".+@.+"

[conditional_fields.email_contact]
condition_field = "enabled"
condition_value = true
"#;

fn loan() -> MeshSpec {
    MeshSpec::from_toml(LOAN).unwrap()
}

#[test]
fn spec_loads_from_a_toml_file() {
    let path = std::env::temp_dir().join(format!("rh-loan-{}.toml", std::process::id()));
    std::fs::write(&path, LOAN).unwrap();
    let loaded = MeshSpec::from_path(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.unwrap(), loan());

    let unsupported = MeshSpec::from_path("mesh.yaml");
    assert!(matches!(unsupported, Err(rh::LoadError::UnsupportedExtension(_))));
}

#[test]
fn schema_maps_value_types_and_overrides() {
    let configuration = MeshBuilder::new(loan()).build();
    let json = serde_json::to_value(&configuration).unwrap();
    let properties = &json["schema"]["properties"];

    assert_eq!(
        properties["principal"],
        json!({
            "type": "integer",
            "minimum": 1000,
            "maximum": 1000000,
            "description": "Value must be between 1000 and 1000000"
        })
    );
    assert_eq!(properties["rate_percent"], json!({"type": "number"}));
    assert_eq!(properties["enabled"], json!({"type": "boolean"}));
    assert_eq!(
        properties["tags_labels"],
        json!({"type": "array", "items": {"type": "string"}})
    );
    assert_eq!(
        properties["email_contact"],
        json!({
            "type": "string",
            "format": "email",
            "pattern": ".+@.+",
            "description": "Must match pattern: .+@.+"
        })
    );
    assert_eq!(properties["monthly_payment"], json!({"type": "number"}));

    let order: Vec<_> = properties.as_object().unwrap().keys().cloned().collect();
    assert_eq!(
        order,
        [
            "monthly_payment",
            "total_paid",
            "slider_years_display",
            "readonly_summary",
            "principal",
            "rate_percent",
            "years",
            "email_contact",
            "tags_labels",
            "enabled",
        ]
    );
}

#[test]
fn ui_hints_follow_naming_conventions() {
    let configuration = MeshBuilder::new(loan()).build();
    let hints = |variable| {
        configuration
            .ui_hints(variable)
            .map(|hints| serde_json::to_value(hints).unwrap())
    };

    assert_eq!(hints("monthly_payment"), Some(json!({"ui:readonly": true})));
    assert_eq!(
        hints("slider_years_display"),
        Some(json!({"ui:widget": "range", "minimum": 0, "maximum": 100}))
    );
    assert_eq!(hints("readonly_summary"), Some(json!({"ui:readonly": true})));
    assert_eq!(hints("email_contact"), Some(json!({"ui:widget": "email"})));
    assert_eq!(
        hints("tags_labels"),
        Some(json!({"ui:options": {"addable": true, "removable": true}}))
    );
    assert_eq!(hints("principal"), Some(json!({"ui:help": "Amount borrowed"})));
    assert_eq!(hints("years"), None);
}

#[test]
fn loan_payment_propagates() {
    let configuration = MeshBuilder::new(loan()).build();
    let propagation = configuration
        .propagator()
        .settle(&configuration.initial_state());
    assert!(propagation.converged);
    assert!(propagation.failures.is_empty());
    let state = propagation.state;
    let payment = state.get("monthly_payment").as_f64().unwrap();
    assert!((payment - 1199.10).abs() < 0.01, "{payment}");
    assert_eq!(state.get("total_paid"), &Value::Integer(431676));
    assert_eq!(state.get("readonly_summary"), &Value::text("Total: 431676"));

    let state = configuration.propagator().propagate(&state, "rate_percent", 0);
    let payment = state.get("monthly_payment").as_f64().unwrap();
    assert!((payment - 200000.0 / 360.0).abs() < 1e-9);

    let shown = configuration.visibility(&state);
    assert!(shown["email_contact"]);
    let state = configuration.propagator().propagate(&state, "enabled", false);
    assert!(!configuration.visibility(&state)["email_contact"]);
}

#[test]
fn validation_reports_problems_without_blocking_the_build() {
    let spec = MeshSpec::from_json(
        r#"{
            "mesh_spec": {
                "area": ["width", "height"],
                "perimeter": ["width", "height"],
                "ping": ["pong"],
                "pong": ["ping"]
            },
            "functions_spec": {
                "area": "width * height * scale",
                "ping": "pong",
                "pong": "ping",
                "volume": "area * depth"
            },
            "initial_values": {"width": 2}
        }"#,
    )
    .unwrap();
    let report = MeshValidator::new().validate(&spec);
    assert!(!report.is_valid());

    let kinds: Vec<_> = report
        .diagnostics
        .iter()
        .map(|diagnostic| (diagnostic.severity, diagnostic.variable.as_str(), &diagnostic.kind))
        .collect();
    let height = DiagnosticKind::UndeclaredDependency {
        dependency: "height".to_string(),
    };
    assert!(kinds.contains(&(Severity::Error, "area", &height)));
    assert!(kinds.contains(&(Severity::Error, "perimeter", &DiagnosticKind::MissingComputation)));
    assert!(kinds.contains(&(Severity::Warning, "volume", &DiagnosticKind::UnusedComputation)));
    let scale = DiagnosticKind::UndeclaredRead {
        name: "scale".to_string(),
    };
    assert!(kinds.contains(&(Severity::Warning, "area", &scale)));
    assert!(
        report
            .diagnostics
            .iter()
            .any(|diagnostic| matches!(diagnostic.kind, DiagnosticKind::Cycle { .. }))
    );
    assert!(report.to_string().contains("Suggested fixes:"));

    // The builder is permissive about everything the validator reports.
    let configuration = MeshBuilder::new(spec).build();
    assert!(configuration.compile_errors().is_empty());
    let state = configuration
        .propagator()
        .propagate(&configuration.initial_state(), "height", 3);
    assert!(state.get("area").is_undefined());
    assert!(state.get("perimeter").is_undefined());
}

#[test]
fn analysis_of_the_loan_mesh() {
    let spec = loan();
    let graph = rh::DependencyGraph::new(spec.mesh.clone());
    let metrics = complexity(&graph);
    assert_eq!(metrics.total_functions, 4);
    assert_eq!(metrics.total_dependencies, 7);
    assert_eq!(metrics.deepest_chain, 3);
    assert_eq!(metrics.cycles, 0);

    let text = visualize_mesh(&graph, &spec.initial_values);
    assert!(text.contains("  * principal = 200000"));
    assert!(text.contains("  * total_paid <- [monthly_payment, years]"));
    assert!(text.contains("  * years -> affects: monthly_payment, total_paid, slider_years_display"));
}
