//! Naming conventions that turn variable names into UI hints.

use crate::schema::{FieldOverrides, UI_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};

/// Hints for the external renderer, keyed like `ui:widget` or `ui:readonly`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiHints(pub Map<String, Json>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    Range,
    ReadOnly,
    Widget(&'static str),
    OrderableList,
    Tags,
}

const WIDGET_PREFIXES: &[(&str, &str)] = &[
    ("hidden_", "hidden"),
    ("color_", "color"),
    ("date_", "date"),
    ("time_", "time"),
    ("datetime_", "datetime-local"),
    ("email_", "email"),
    ("url_", "url"),
    ("tel_", "tel"),
    ("textarea_", "textarea"),
    ("password_", "password"),
    ("number_", "updown"),
    ("checkbox_", "checkbox"),
];

impl Convention {
    /// The first matching name prefix, if any.
    pub fn for_name(name: &str) -> Option<Self> {
        if name.starts_with("slider_") || name.starts_with("range_") {
            return Some(Convention::Range);
        }
        if name.starts_with("readonly_") {
            return Some(Convention::ReadOnly);
        }
        if let Some((_, widget)) = WIDGET_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(*prefix))
        {
            return Some(Convention::Widget(*widget));
        }
        if name.starts_with("list_") || name.starts_with("array_") {
            return Some(Convention::OrderableList);
        }
        if name.starts_with("tags_") {
            return Some(Convention::Tags);
        }
        None
    }

    fn apply(self, hints: &mut Map<String, Json>) {
        match self {
            Convention::Range => {
                hints.insert("ui:widget".to_string(), json!("range"));
                hints.insert("minimum".to_string(), json!(0));
                hints.insert("maximum".to_string(), json!(100));
            }
            Convention::ReadOnly => {
                hints.insert("ui:readonly".to_string(), json!(true));
            }
            Convention::Widget(widget) => {
                hints.insert("ui:widget".to_string(), json!(widget));
            }
            Convention::OrderableList => {
                hints.insert(
                    "ui:options".to_string(),
                    json!({"addable": true, "removable": true, "orderable": true}),
                );
            }
            Convention::Tags => {
                hints.insert(
                    "ui:options".to_string(),
                    json!({"addable": true, "removable": true}),
                );
            }
        }
    }
}

/// What the resolver needs to know about a variable besides its name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Membership {
    /// The variable is a key of the forward mesh.
    pub derived: bool,
    pub has_initial_value: bool,
}

impl UiHints {
    /// Prefix convention, then the derived-variable read-only rule, then the
    /// `ui:` keys of `overrides`.
    ///
    /// A derived variable is read-only unless it has an initial value or is
    /// a slider/range.
    pub fn resolve(name: &str, membership: Membership, overrides: Option<&FieldOverrides>) -> Self {
        let mut hints = Map::new();
        let convention = Convention::for_name(name);
        if let Some(convention) = convention {
            convention.apply(&mut hints);
        }

        if membership.derived
            && !membership.has_initial_value
            && convention != Some(Convention::Range)
            && !hints.contains_key("ui:readonly")
        {
            hints.insert("ui:readonly".to_string(), json!(true));
        }

        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                if key.starts_with(UI_PREFIX) {
                    hints.insert(key.clone(), value.clone());
                }
            }
        }
        UiHints(hints)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn widget(&self) -> Option<&str> {
        self.0.get("ui:widget").and_then(Json::as_str)
    }

    pub fn is_readonly(&self) -> bool {
        self.0
            .get("ui:readonly")
            .and_then(Json::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: Membership = Membership {
        derived: false,
        has_initial_value: true,
    };
    const COMPUTED: Membership = Membership {
        derived: true,
        has_initial_value: false,
    };

    #[test]
    fn test_prefix_widgets() {
        assert_eq!(UiHints::resolve("color_theme", INPUT, None).widget(), Some("color"));
        assert_eq!(
            UiHints::resolve("datetime_start", INPUT, None).widget(),
            Some("datetime-local")
        );
        assert_eq!(UiHints::resolve("number_count", INPUT, None).widget(), Some("updown"));
        assert!(UiHints::resolve("readonly_id", INPUT, None).is_readonly());
        assert!(UiHints::resolve("plain", INPUT, None).is_empty());
    }

    #[test]
    fn test_range_prefixes_carry_default_bounds() {
        for name in ["slider_volume", "range_volume"] {
            let hints = UiHints::resolve(name, INPUT, None);
            assert_eq!(hints.widget(), Some("range"));
            assert_eq!(hints.0["minimum"], json!(0));
            assert_eq!(hints.0["maximum"], json!(100));
        }
    }

    #[test]
    fn test_array_options() {
        assert_eq!(
            UiHints::resolve("list_items", INPUT, None).0["ui:options"],
            json!({"addable": true, "removable": true, "orderable": true})
        );
        assert_eq!(
            UiHints::resolve("tags_labels", INPUT, None).0["ui:options"],
            json!({"addable": true, "removable": true})
        );
    }

    #[test]
    fn test_derived_variables_are_readonly_by_default() {
        assert!(UiHints::resolve("total", COMPUTED, None).is_readonly());
        let editable = Membership {
            derived: true,
            has_initial_value: true,
        };
        assert!(!UiHints::resolve("total", editable, None).is_readonly());
        assert!(!UiHints::resolve("slider_total", COMPUTED, None).is_readonly());
        assert!(!UiHints::resolve("range_total", COMPUTED, None).is_readonly());
    }

    #[test]
    fn test_overrides_apply_last_and_only_ui_keys() {
        let overrides = json!({"ui:readonly": false, "ui:widget": "textarea", "minimum": 3});
        let hints = UiHints::resolve("total", COMPUTED, overrides.as_object());
        assert!(!hints.is_readonly());
        assert_eq!(hints.widget(), Some("textarea"));
        assert!(!hints.0.contains_key("minimum"));
    }
}
