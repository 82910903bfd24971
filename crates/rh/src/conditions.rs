//! Fields shown only while another field satisfies a condition.

use crate::state::FormState;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[default]
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub condition_field: String,
    pub condition_value: Value,
    #[serde(default)]
    pub condition_operator: ConditionOperator,
}

impl FieldCondition {
    /// Ordering comparisons only hold between two numbers or two texts.
    pub fn is_met(&self, state: &FormState) -> bool {
        let current = state.get(&self.condition_field);
        let expected = &self.condition_value;
        let ordering = match (current.as_f64(), expected.as_f64()) {
            (Some(current), Some(expected)) => current.partial_cmp(&expected),
            _ => match (current.as_str(), expected.as_str()) {
                (Some(current), Some(expected)) => Some(current.cmp(expected)),
                _ => None,
            },
        };
        match self.condition_operator {
            ConditionOperator::Equal => current == expected,
            ConditionOperator::NotEqual => current != expected,
            ConditionOperator::Greater => ordering == Some(Ordering::Greater),
            ConditionOperator::Less => ordering == Some(Ordering::Less),
            ConditionOperator::GreaterOrEqual => ordering.is_some_and(Ordering::is_ge),
            ConditionOperator::LessOrEqual => ordering.is_some_and(Ordering::is_le),
        }
    }
}
