use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rh::analysis::{complexity, to_dot, visualize_mesh};
use rh::testing::{DEFAULT_TOLERANCE, MeshTester, import_test_cases};
use rh::{BuilderOptions, Configuration, MeshBuilder, MeshSpec, MeshValidator, Strategy, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rh")]
#[command(about = "Reactive mesh tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a mesh file and print diagnostics
    Check {
        /// Path to a .json or .toml mesh file
        spec: PathBuf,
        /// Exit with an error when any diagnostic is an error
        #[arg(long)]
        strict: bool,
    },
    /// Print the built configuration as JSON
    Config {
        spec: PathBuf,
    },
    /// Apply edits and print the resulting state as JSON
    Propagate {
        spec: PathBuf,
        /// Edit as name=value, value parsed as JSON or taken as text
        #[arg(long = "set", value_parser = parse_assignment)]
        edits: Vec<(String, Value)>,
        #[arg(long)]
        max_rounds: Option<usize>,
        /// Iterate only inside cycles instead of sweeping the whole mesh
        #[arg(long)]
        components: bool,
    },
    /// Print the mesh structure and metrics
    Inspect {
        spec: PathBuf,
        /// Print Graphviz DOT instead
        #[arg(long)]
        dot: bool,
    },
    /// Re-run recorded test cases against a mesh
    Verify {
        spec: PathBuf,
        /// JSON list of {"inputs": {...}, "outputs": {...}}
        cases: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
    /// Write an example mesh file
    Init {
        #[arg(default_value = "mesh.json")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_assignment(assignment: &str) -> Result<(String, Value), String> {
    let (name, value) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{assignment}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{assignment}'"));
    }
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::text(value));
    Ok((name.to_string(), value))
}

fn load(path: &Path) -> Result<MeshSpec> {
    MeshSpec::from_path(path).with_context(|| format!("Failed to load mesh '{}'", path.display()))
}

/// Builds the mesh, printing a report for every computation that failed to
/// compile. Those variables simply keep their values.
fn build(spec: MeshSpec, options: BuilderOptions) -> Configuration {
    let configuration = MeshBuilder::new(spec).with_options(options).build();
    for error in configuration.compile_errors() {
        let source = configuration.source(&error.variable).unwrap_or_default();
        eprintln!("{}", error.render(source));
    }
    configuration
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { spec, strict } => {
            let report = MeshValidator::new().validate(&load(&spec)?);
            if report.diagnostics.is_empty() {
                println!("{}: no problems found", spec.display());
            } else {
                print!("{report}");
            }
            if strict && !report.is_valid() {
                bail!("{} error(s) in '{}'", report.errors().count(), spec.display());
            }
        }

        Commands::Config { spec } => {
            let configuration = build(load(&spec)?, BuilderOptions::default());
            println!("{}", serde_json::to_string_pretty(&configuration)?);
        }

        Commands::Propagate {
            spec,
            edits,
            max_rounds,
            components,
        } => {
            let mut options = BuilderOptions::default();
            if let Some(max_rounds) = max_rounds {
                options.max_rounds = max_rounds;
            }
            if components {
                options.strategy = Strategy::Components;
            }
            let configuration = build(load(&spec)?, options);
            let propagator = configuration.propagator();
            let mut state = propagator.settle(&configuration.initial_state()).state;
            for (variable, value) in edits {
                let propagation = propagator.propagate_with_report(&state, &variable, value);
                if !propagation.converged {
                    eprintln!(
                        "'{variable}': no fixed point after {} round(s), using the last state",
                        propagation.rounds
                    );
                }
                for failure in &propagation.failures {
                    eprintln!("'{}' failed: {}", failure.variable, failure.error);
                }
                state = propagation.state;
            }
            println!("{}", serde_json::to_string_pretty(&state)?);
        }

        Commands::Inspect { spec, dot } => {
            let spec = load(&spec)?;
            let graph = rh::DependencyGraph::new(spec.mesh.clone());
            if dot {
                println!("{}", to_dot(&graph, &spec.initial_values));
            } else {
                println!("{}", visualize_mesh(&graph, &spec.initial_values));
                let metrics = complexity(&graph);
                println!("\nfunctions:                {}", metrics.total_functions);
                println!("dependencies:             {}", metrics.total_dependencies);
                println!("max dependencies:         {}", metrics.max_dependencies);
                println!("average dependencies:     {:.2}", metrics.average_dependencies);
                println!("without dependencies:     {}", metrics.functions_without_dependencies);
                println!("deepest chain:            {}", metrics.deepest_chain);
                println!("cycles:                   {}", metrics.cycles);
            }
        }

        Commands::Verify {
            spec,
            cases,
            tolerance,
        } => {
            let configuration = build(load(&spec)?, BuilderOptions::default());
            let recorded = import_test_cases(&cases)
                .with_context(|| format!("Failed to read test cases '{}'", cases.display()))?;
            let failures = MeshTester::new(&configuration).verify(&recorded, tolerance);
            for (index, mismatches) in &failures {
                println!("case {}:", index + 1);
                for mismatch in mismatches {
                    println!("  {mismatch}");
                }
            }
            println!(
                "{} case(s): {} passed, {} failed",
                recorded.len(),
                recorded.len() - failures.len(),
                failures.len()
            );
            if !failures.is_empty() {
                bail!("{} test case(s) failed", failures.len());
            }
        }

        Commands::Init { path, force } => {
            if path.exists() && !force {
                bail!("'{}' already exists, use --force to overwrite", path.display());
            }
            let json = serde_json::to_string_pretty(&MeshSpec::template())?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            println!("Created {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("celsius=100").unwrap(),
            ("celsius".to_string(), Value::Integer(100))
        );
        assert_eq!(
            parse_assignment("name=Ada").unwrap(),
            ("name".to_string(), Value::text("Ada"))
        );
        assert_eq!(
            parse_assignment("flag=true").unwrap().1,
            Value::Bool(true)
        );
        assert!(parse_assignment("celsius").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
