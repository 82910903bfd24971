//! Fixed-point propagation of an edit through the mesh.
//!
//! Every round re-evaluates all derived variables in declaration order and
//! writes results in place, so later variables in the same round already see
//! earlier results. Rounds repeat until one produces no change or the round
//! cap is reached. Hitting the cap is not an error: the last state is
//! returned with `converged == false`.

use crate::evaluator::EvalError;
use crate::graph::DependencyGraph;
use crate::registry::FunctionRegistry;
use crate::state::FormState;
use crate::value::Value;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub const DEFAULT_MAX_ROUNDS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Recompute the whole mesh every round.
    #[default]
    FullSweep,
    /// Visit strongly connected components dependencies-first, evaluating
    /// acyclic variables once and iterating only inside cycles.
    ///
    /// Matches [`Strategy::FullSweep`] when every cycle has a single fixed
    /// point for its settled inputs. A cycle with several fixed points may
    /// settle on a different one: a full sweep can let cycle members read
    /// stale upstream values in early rounds, while here upstream values
    /// are always final before the cycle runs.
    Components,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputationFailure {
    pub variable: String,
    pub round: usize,
    pub error: EvalError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    pub state: FormState,
    /// Rounds run, including the final round that confirmed the fixed point.
    /// With [`Strategy::Components`] this is the most iterations any single
    /// component needed.
    pub rounds: usize,
    pub converged: bool,
    /// Latest failure per variable, in the order they first failed.
    pub failures: Vec<ComputationFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct Propagator<'a> {
    graph: &'a DependencyGraph,
    registry: &'a FunctionRegistry,
    max_rounds: usize,
    strategy: Strategy,
}

struct Run<'a> {
    state: FormState,
    /// The direct edit target. Never overwritten by a computation.
    pinned: Option<String>,
    round: usize,
    failures: Vec<ComputationFailure>,
    warned: FxHashSet<&'a str>,
}

impl<'a> Propagator<'a> {
    pub fn new(graph: &'a DependencyGraph, registry: &'a FunctionRegistry) -> Self {
        Self {
            graph,
            registry,
            max_rounds: DEFAULT_MAX_ROUNDS,
            strategy: Strategy::default(),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Sets `changed` to `value` and recomputes until a fixed point.
    pub fn propagate(&self, state: &FormState, changed: &str, value: impl Into<Value>) -> FormState {
        self.propagate_with_report(state, changed, value).state
    }

    pub fn propagate_with_report(
        &self,
        state: &FormState,
        changed: &str,
        value: impl Into<Value>,
    ) -> Propagation {
        let mut state = state.clone();
        state.insert(changed, value);
        log::debug!("propagating edit of '{changed}'");
        self.run(state, Some(changed.to_string()))
    }

    /// Recomputes from `state` with no edit target, e.g. to derive a
    /// consistent initial state.
    pub fn settle(&self, state: &FormState) -> Propagation {
        self.run(state.clone(), None)
    }

    fn run(&self, state: FormState, pinned: Option<String>) -> Propagation {
        let mut run = Run {
            state,
            pinned,
            round: 0,
            failures: Vec::new(),
            warned: FxHashSet::default(),
        };
        let (rounds, converged) = match self.strategy {
            Strategy::FullSweep => self.full_sweep(&mut run),
            Strategy::Components => self.by_components(&mut run),
        };
        if converged {
            log::debug!("fixed point reached after {rounds} round(s)");
        } else {
            log::debug!(
                "stopped after {rounds} round(s) without reaching a fixed point, returning last state"
            );
        }
        Propagation {
            state: run.state,
            rounds,
            converged,
            failures: run.failures,
        }
    }

    fn full_sweep(&self, run: &mut Run<'a>) -> (usize, bool) {
        let all: Vec<usize> = (0..self.graph.forward().len()).collect();
        for round in 1..=self.max_rounds {
            run.round = round;
            let changed = self.sweep(&all, run);
            log::trace!("round {round}: {changed} variable(s) changed");
            if changed == 0 {
                return (round, true);
            }
        }
        (self.max_rounds, false)
    }

    fn by_components(&self, run: &mut Run<'a>) -> (usize, bool) {
        let mut rounds = 0;
        let mut converged = true;
        for component in self.graph.components() {
            if !component.cyclic {
                run.round = 1;
                self.sweep(&component.members, run);
                rounds = rounds.max(1);
                continue;
            }
            let mut component_converged = false;
            for round in 1..=self.max_rounds {
                run.round = round;
                let changed = self.sweep(&component.members, run);
                log::trace!(
                    "cycle {:?} round {round}: {changed} variable(s) changed",
                    self.graph.names(&component.members)
                );
                rounds = rounds.max(round);
                if changed == 0 {
                    component_converged = true;
                    break;
                }
            }
            converged &= component_converged;
        }
        (rounds, converged)
    }

    /// Evaluates the derived variables at `members` in order, writing changes
    /// in place. Returns how many variables changed.
    fn sweep(&self, members: &[usize], run: &mut Run<'a>) -> usize {
        let mut changed = 0;
        for member in members {
            if self.evaluate(*member, run) {
                changed += 1;
            }
        }
        changed
    }

    fn evaluate(&self, member: usize, run: &mut Run<'a>) -> bool {
        let Some((variable, dependencies)) = self.graph.forward().get_index(member) else {
            return false;
        };
        if run.pinned.as_deref() == Some(variable.as_str()) {
            return false;
        }
        let Some(computation) = self.registry.get(variable) else {
            return false;
        };
        let arguments: SmallVec<[Value; 4]> = dependencies
            .iter()
            .map(|dependency| run.state.get(dependency).clone())
            .collect();
        match computation.call(&arguments) {
            Ok(None) => false,
            Ok(Some(value)) => {
                if run.state.get(variable) == &value {
                    return false;
                }
                run.state.insert(variable.as_str(), value);
                true
            }
            Err(error) => {
                if run.warned.insert(variable.as_str()) {
                    log::warn!("error computing '{variable}': {error}");
                } else {
                    log::trace!("error computing '{variable}' again: {error}");
                }
                let failure = ComputationFailure {
                    variable: variable.clone(),
                    round: run.round,
                    error,
                };
                match run
                    .failures
                    .iter_mut()
                    .find(|existing| existing.variable == failure.variable)
                {
                    Some(existing) => *existing = failure,
                    None => run.failures.push(failure),
                }
                false
            }
        }
    }
}
