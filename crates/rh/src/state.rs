use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Current value of every variable, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormState(IndexMap<String, Value>);

/// One variable whose value differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub variable: String,
    pub before: Value,
    pub after: Value,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing variables read as `undefined`.
    pub fn get(&self, variable: &str) -> &Value {
        const UNDEFINED: &Value = &Value::Undefined;
        self.0.get(variable).unwrap_or(UNDEFINED)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.0.contains_key(variable)
    }

    pub fn insert(&mut self, variable: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(variable.into(), value.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(variable, value)| (variable.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Variables whose value in `self` differs from `earlier`, in the order
    /// of `self` followed by variables only `earlier` knows.
    pub fn changes_since(&self, earlier: &FormState) -> Vec<Change> {
        let mut changes: Vec<Change> = self
            .iter()
            .filter(|(variable, value)| earlier.get(variable) != *value)
            .map(|(variable, value)| Change {
                variable: variable.to_string(),
                before: earlier.get(variable).clone(),
                after: value.clone(),
            })
            .collect();
        changes.extend(
            earlier
                .iter()
                .filter(|(variable, value)| !self.contains(variable) && !value.is_undefined())
                .map(|(variable, value)| Change {
                    variable: variable.to_string(),
                    before: value.clone(),
                    after: Value::Undefined,
                }),
        );
        changes
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(variable, value)| (variable.to_string(), value.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FormState {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(variable, value)| (variable.into(), value.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for FormState {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        self.0.extend(
            iter.into_iter()
                .map(|(variable, value)| (variable.into(), value.into())),
        );
    }
}
