use crate::builder::Configuration;
use crate::propagation::Propagation;
use crate::state::{Change, FormState};
use crate::value::Value;
use std::sync::Arc;

/// Notified after an edit or settle that changed at least one variable.
pub trait StateObserver {
    fn state_changed(&mut self, state: &FormState, changes: &[Change]);
}

impl<F: FnMut(&FormState, &[Change])> StateObserver for F {
    fn state_changed(&mut self, state: &FormState, changes: &[Change]) {
        self(state, changes)
    }
}

/// One running form. Owns its state; the configuration is shared.
pub struct Session {
    configuration: Arc<Configuration>,
    state: FormState,
    observers: Vec<Box<dyn StateObserver + Send>>,
}

impl Session {
    pub fn new(configuration: Arc<Configuration>) -> Self {
        let state = configuration.initial_state();
        Self {
            configuration,
            state,
            observers: Vec::new(),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn observe(&mut self, observer: impl StateObserver + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Applies a direct edit and propagates it. Returns the variables whose
    /// values changed, the edited one included.
    pub fn edit(&mut self, variable: &str, value: impl Into<Value>) -> Vec<Change> {
        let propagation =
            self.configuration
                .propagator()
                .propagate_with_report(&self.state, variable, value);
        self.commit(propagation)
    }

    /// Recomputes the whole mesh without an edit target.
    pub fn settle(&mut self) -> Vec<Change> {
        let propagation = self.configuration.propagator().settle(&self.state);
        self.commit(propagation)
    }

    /// Back to the initial values. Observers are notified like for an edit.
    pub fn reset(&mut self) -> Vec<Change> {
        let initial = self.configuration.initial_state();
        let changes = initial.changes_since(&self.state);
        self.state = initial;
        self.notify(&changes);
        changes
    }

    fn commit(&mut self, propagation: Propagation) -> Vec<Change> {
        let changes = propagation.state.changes_since(&self.state);
        self.state = propagation.state;
        self.notify(&changes);
        changes
    }

    fn notify(&mut self, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        for observer in &mut self.observers {
            observer.state_changed(&self.state, changes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MeshBuilder;
    use crate::definition::MeshSpec;
    use std::sync::Mutex;

    fn configuration() -> Arc<Configuration> {
        let spec = MeshSpec::from_json(
            r#"{
                "mesh_spec": {"area": ["width", "height"]},
                "functions_spec": {"area": "width * height"},
                "initial_values": {"width": 2, "height": 3}
            }"#,
        )
        .unwrap();
        Arc::new(MeshBuilder::new(spec).build())
    }

    #[test]
    fn test_edit_reports_changes_and_notifies() {
        let notifications = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::new(configuration());
        let sink = Arc::clone(&notifications);
        session.observe(move |_: &FormState, changes: &[Change]| {
            sink.lock().unwrap().push(changes.len());
        });

        let changes = session.edit("width", 5);
        let changed: Vec<_> = changes.iter().map(|change| change.variable.as_str()).collect();
        assert_eq!(changed, ["width", "area"]);
        assert_eq!(session.state().get("area"), &Value::Integer(15));

        // Same value again: nothing changes, nobody is notified.
        assert!(session.edit("width", 5).is_empty());
        assert_eq!(*notifications.lock().unwrap(), [2]);
    }

    #[test]
    fn test_sessions_share_configuration_but_not_state() {
        let configuration = configuration();
        let mut first = Session::new(Arc::clone(&configuration));
        let second = Session::new(configuration);
        first.edit("height", 10);
        assert_eq!(first.state().get("area"), &Value::Integer(20));
        assert!(second.state().get("area").is_undefined());
    }

    #[test]
    fn test_settle_and_reset() {
        let mut session = Session::new(configuration());
        session.settle();
        assert_eq!(session.state().get("area"), &Value::Integer(6));
        let changes = session.reset();
        assert_eq!(changes.len(), 1);
        assert!(session.state().get("area").is_undefined());
    }
}
