//! Declarative variable meshes: a mesh definition is turned into a form
//! configuration (schema, UI hints, compiled computations) and edits are
//! propagated through the mesh until it reaches a fixed point.

pub mod analysis;
pub mod builder;
pub mod conditions;
pub mod conventions;
pub mod definition;
pub mod evaluator;
pub mod graph;
pub mod parser;
pub mod propagation;
pub mod registry;
pub mod schema;
pub mod session;
pub mod state;
pub mod testing;
pub mod validation;
pub mod value;

pub use builder::{BuilderOptions, Configuration, MeshBuilder};
pub use definition::{LoadError, MeshSpec};
pub use evaluator::EvalError;
pub use graph::DependencyGraph;
pub use propagation::{DEFAULT_MAX_ROUNDS, Propagation, Propagator, Strategy};
pub use registry::{CompileError, Computation, FunctionRegistry};
pub use session::{Session, StateObserver};
pub use state::{Change, FormState};
pub use validation::{MeshValidator, ValidationReport};
pub use value::Value;
