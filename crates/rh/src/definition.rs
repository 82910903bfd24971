//! Build-time input: the mesh, its computations and initial values.

use crate::conditions::FieldCondition;
use crate::schema::FieldOverrides;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshSpec {
    /// Derived variable -> ordered dependency names.
    #[serde(rename = "mesh_spec")]
    pub mesh: IndexMap<String, Vec<String>>,
    /// Derived variable -> computation source.
    #[serde(rename = "functions_spec")]
    pub functions: IndexMap<String, String>,
    #[serde(default)]
    pub initial_values: IndexMap<String, Value>,
    #[serde(default)]
    pub field_overrides: IndexMap<String, FieldOverrides>,
    #[serde(default)]
    pub conditional_fields: IndexMap<String, FieldCondition>,
    /// Renderer settings, carried through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub ui_config: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum LoadError {
    Io { path: PathBuf, error: std::io::Error },
    Json { path: PathBuf, error: serde_json::Error },
    Toml { path: PathBuf, error: toml::de::Error },
    UnsupportedExtension(PathBuf),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, error } => write!(f, "cannot read {}: {error}", path.display()),
            LoadError::Json { path, error } => {
                write!(f, "invalid mesh JSON in {}: {error}", path.display())
            }
            LoadError::Toml { path, error } => {
                write!(f, "invalid mesh TOML in {}: {error}", path.display())
            }
            LoadError::UnsupportedExtension(path) => write!(
                f,
                "unsupported mesh file {} (expected .json or .toml)",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { error, .. } => Some(error),
            LoadError::Json { error, .. } => Some(error),
            LoadError::Toml { error, .. } => Some(error),
            LoadError::UnsupportedExtension(_) => None,
        }
    }
}

impl MeshSpec {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_toml(toml: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml)
    }

    /// Loads a `.json` or `.toml` mesh file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        let read = || {
            std::fs::read_to_string(path).map_err(|error| LoadError::Io {
                path: path.to_path_buf(),
                error,
            })
        };
        match extension.as_deref() {
            Some("json") => Self::from_json(&read()?).map_err(|error| LoadError::Json {
                path: path.to_path_buf(),
                error,
            }),
            Some("toml") => Self::from_toml(&read()?).map_err(|error| LoadError::Toml {
                path: path.to_path_buf(),
                error,
            }),
            _ => Err(LoadError::UnsupportedExtension(path.to_path_buf())),
        }
    }

    /// The temperature converter used by `rh init`.
    pub fn template() -> Self {
        let mut spec = MeshSpec::default();
        for (variable, source) in [
            ("fahrenheit", "return celsius * 9/5 + 32;"),
            ("kelvin", "return celsius + 273.15;"),
        ] {
            spec.mesh.insert(variable.to_string(), vec!["celsius".to_string()]);
            spec.functions.insert(variable.to_string(), source.to_string());
        }
        spec.initial_values
            .insert("celsius".to_string(), Value::Number(20.0));
        spec.meta = Some(serde_json::json!({
            "description": "A temperature converter example",
            "features": [
                "Convert Celsius to Fahrenheit",
                "Convert Celsius to Kelvin",
                "Real-time updates",
            ],
        }));
        spec
    }
}
