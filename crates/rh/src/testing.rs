//! Helpers for checking a mesh's computed outputs, usable from users' tests.

use crate::builder::Configuration;
use crate::state::FormState;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOLERANCE: f64 = 0.0001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub inputs: IndexMap<String, Value>,
    pub outputs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub variable: String,
    pub expected: Value,
    pub actual: Value,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.variable, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub input: f64,
    pub output: FormState,
    pub valid: bool,
}

#[derive(Debug)]
pub enum TestCaseError {
    Io { path: PathBuf, error: std::io::Error },
    Json { path: PathBuf, error: serde_json::Error },
}

impl fmt::Display for TestCaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCaseError::Io { path, error } => write!(f, "{}: {error}", path.display()),
            TestCaseError::Json { path, error } => {
                write!(f, "invalid test cases in {}: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for TestCaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TestCaseError::Io { error, .. } => Some(error),
            TestCaseError::Json { error, .. } => Some(error),
        }
    }
}

pub struct MeshTester<'a> {
    configuration: &'a Configuration,
}

impl<'a> MeshTester<'a> {
    pub fn new(configuration: &'a Configuration) -> Self {
        Self { configuration }
    }

    /// Initial values overlaid with `values`, then settled.
    pub fn compute<K, V>(&self, values: impl IntoIterator<Item = (K, V)>) -> FormState
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut state = self.configuration.initial_state();
        state.extend(values);
        self.configuration.propagator().settle(&state).state
    }

    /// Sets `input` to `value` and compares the expected outputs. Numbers
    /// match within `tolerance`, everything else must be equal.
    pub fn check(
        &self,
        input: &str,
        value: impl Into<Value>,
        expected: &IndexMap<String, Value>,
        tolerance: f64,
    ) -> Vec<Mismatch> {
        let computed = self.compute([(input, value.into())]);
        mismatches(&computed, expected, tolerance)
    }

    /// Computes the mesh for `input` stepping from `start` to `end`
    /// inclusive and records whether `predicate` accepts each result.
    pub fn sweep(
        &self,
        input: &str,
        start: f64,
        end: f64,
        step: f64,
        predicate: impl Fn(&FormState) -> bool,
    ) -> Vec<SweepPoint> {
        if step <= 0.0 || !step.is_finite() {
            log::warn!("sweep over '{input}' needs a positive finite step, got {step}");
            return Vec::new();
        }
        if !start.is_finite() || !end.is_finite() {
            log::warn!("sweep over '{input}' needs finite bounds, got {start} to {end}");
            return Vec::new();
        }
        let mut points = Vec::new();
        let mut index: u64 = 0;
        loop {
            let current = start + step * index as f64;
            if current > end {
                break;
            }
            let output = self.compute([(input, current)]);
            let valid = predicate(&output);
            points.push(SweepPoint {
                input: current,
                output,
                valid,
            });
            index += 1;
        }
        points
    }

    /// Computes the mesh for `inputs` and captures every variable as the
    /// expected output.
    pub fn record(&self, inputs: IndexMap<String, Value>) -> TestCase {
        let outputs = self
            .compute(inputs.clone())
            .iter()
            .map(|(variable, value)| (variable.to_string(), value.clone()))
            .collect();
        TestCase { inputs, outputs }
    }

    /// Re-runs recorded cases. Returns the mismatches of each failing case
    /// keyed by its position.
    pub fn verify(&self, cases: &[TestCase], tolerance: f64) -> IndexMap<usize, Vec<Mismatch>> {
        let mut failures = IndexMap::new();
        for (index, case) in cases.iter().enumerate() {
            let computed = self.compute(case.inputs.clone());
            let case_mismatches = mismatches(&computed, &case.outputs, tolerance);
            if case_mismatches.is_empty() {
                log::debug!("test case {} passed", index + 1);
            } else {
                for mismatch in &case_mismatches {
                    log::debug!("test case {}: {mismatch}", index + 1);
                }
                failures.insert(index, case_mismatches);
            }
        }
        failures
    }
}

fn mismatches(computed: &FormState, expected: &IndexMap<String, Value>, tolerance: f64) -> Vec<Mismatch> {
    expected
        .iter()
        .filter_map(|(variable, expected)| {
            let actual = computed.get(variable);
            let matches = match (actual.as_f64(), expected.as_f64()) {
                (Some(actual), Some(expected)) => (actual - expected).abs() <= tolerance,
                _ => actual == expected,
            };
            (!matches).then(|| Mismatch {
                variable: variable.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            })
        })
        .collect()
}

pub fn export_test_cases(cases: &[TestCase], path: impl AsRef<Path>) -> Result<(), TestCaseError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(cases).map_err(|error| TestCaseError::Json {
        path: path.to_path_buf(),
        error,
    })?;
    std::fs::write(path, json).map_err(|error| TestCaseError::Io {
        path: path.to_path_buf(),
        error,
    })
}

pub fn import_test_cases(path: impl AsRef<Path>) -> Result<Vec<TestCase>, TestCaseError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|error| TestCaseError::Io {
        path: path.to_path_buf(),
        error,
    })?;
    serde_json::from_str(&json).map_err(|error| TestCaseError::Json {
        path: path.to_path_buf(),
        error,
    })
}
