//! Scenario runner for reducers
//!
//! Drives a reducer directly, with no store or executor, so a test can
//! state a starting raffle, feed it one or more actions and check what the
//! reducer left behind: the new state and the effects it asked for.
//! Effects are inspected, never executed.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use raffle_core::{effect::Effect, reducer::Reducer};

/// A check registered with `then_state` or `then_effects`
enum Check<S, A> {
    State(Box<dyn FnOnce(&S)>),
    Effects(Box<dyn FnOnce(&[Effect<A>])>),
}

/// Scenario for one reducer: a starting state, some actions, some checks
///
/// Checks run in the order they were registered, after every action has
/// been reduced. Effect checks see the effects of the final action only.
///
/// ```ignore
/// ReducerTest::new(RaffleReducer::new())
///     .with_env(environment())
///     .given_state(configured())
///     .when_action(RaffleAction::SelectNumber { number })
///     .then_state(|state| assert!(state.selection.contains(&number)))
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    state: Option<S>,
    actions: Vec<A>,
    checks: Vec<Check<S, A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Start a scenario for `reducer`
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            state: None,
            actions: Vec::new(),
            checks: Vec::new(),
        }
    }

    /// Environment handed to every `reduce` call
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// State before the first action
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// Queue an action
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Check the state left after the last action
    #[must_use]
    pub fn then_state<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.checks.push(Check::State(Box::new(check)));
        self
    }

    /// Check the effects returned by the last action
    #[must_use]
    pub fn then_effects<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.checks.push(Check::Effects(Box::new(check)));
        self
    }

    /// Reduce every queued action, then run the checks
    ///
    /// # Panics
    ///
    /// Panics when the scenario has no starting state, no environment or no
    /// action, and whenever a check fails.
    #[allow(clippy::panic)] // Test harness reports misuse by panicking
    pub fn run(self) {
        let Self {
            reducer,
            environment,
            state,
            actions,
            checks,
        } = self;

        let Some(env) = environment else {
            panic!("scenario has no environment: call with_env()");
        };
        let Some(mut state) = state else {
            panic!("scenario has no starting state: call given_state()");
        };
        if actions.is_empty() {
            panic!("scenario has no action: call when_action()");
        }

        let mut last_effects = Vec::new();
        for action in actions {
            last_effects = reducer.reduce(&mut state, action, &env).into_vec();
        }

        for check in checks {
            match check {
                Check::State(check) => check(&state),
                Check::Effects(check) => check(&last_effects),
            }
        }
    }
}

/// Checks over a reducer's returned effects
///
/// `Parallel` and `Sequential` groups are looked through, so a check holds
/// however the reducer chose to bundle its work.
pub mod assertions {
    use raffle_core::effect::Effect;

    fn leaves<A>(effects: &[Effect<A>]) -> Vec<&Effect<A>> {
        effects
            .iter()
            .flat_map(|effect| match effect {
                Effect::Parallel(group) | Effect::Sequential(group) => leaves(group),
                leaf => vec![leaf],
            })
            .collect()
    }

    /// Fail unless every effect is `Effect::None`
    ///
    /// # Panics
    ///
    /// Panics when any effect would do work.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        let busy = leaves(effects)
            .into_iter()
            .filter(|effect| !matches!(effect, Effect::None))
            .count();
        assert!(busy == 0, "expected an idle reducer, got {busy} working effect(s): {effects:?}");
    }

    /// Fail unless exactly `expected` top-level effects were returned
    ///
    /// # Panics
    ///
    /// Panics on a different count.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(effects.len(), expected, "unexpected number of top-level effects");
    }

    /// Number of async jobs, groups included
    #[must_use]
    pub fn count_future_effects<A>(effects: &[Effect<A>]) -> usize {
        leaves(effects)
            .into_iter()
            .filter(|effect| matches!(effect, Effect::Future(_)))
            .count()
    }

    /// Fail unless some async job was requested
    ///
    /// # Panics
    ///
    /// Panics when no `Effect::Future` is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(count_future_effects(effects) > 0, "expected an async job, found none");
    }

    /// Fail unless a timer was scheduled
    ///
    /// # Panics
    ///
    /// Panics when no `Effect::Delay` is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay_effect<A>(effects: &[Effect<A>]) {
        assert!(
            leaves(effects)
                .into_iter()
                .any(|effect| matches!(effect, Effect::Delay { .. })),
            "expected a scheduled timer, found none"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raffle_core::effect::Effect;
    use raffle_core::reducer::Reducer;
    use smallvec::{smallvec, SmallVec};
    use std::collections::BTreeSet;
    use std::time::Duration;

    /// Numbers on hold at a single sales desk
    #[derive(Clone, Debug, Default)]
    struct Desk {
        held: BTreeSet<u32>,
    }

    #[derive(Clone, Debug)]
    enum DeskAction {
        Hold(u32),
        Release(u32),
        HoldExpired(u32),
    }

    struct DeskReducer;

    struct Counter {
        hold_for: Duration,
    }

    impl Reducer for DeskReducer {
        type State = Desk;
        type Action = DeskAction;
        type Environment = Counter;

        fn reduce(
            &self,
            state: &mut Desk,
            action: DeskAction,
            env: &Counter,
        ) -> SmallVec<[Effect<DeskAction>; 4]> {
            match action {
                DeskAction::Hold(number) => {
                    if !state.held.insert(number) {
                        return smallvec![Effect::None];
                    }
                    smallvec![Effect::merge(vec![
                        Effect::future(async { None }),
                        Effect::Delay {
                            duration: env.hold_for,
                            action: Box::new(DeskAction::HoldExpired(number)),
                        },
                    ])]
                },
                DeskAction::Release(number) | DeskAction::HoldExpired(number) => {
                    state.held.remove(&number);
                    smallvec![Effect::None]
                },
            }
        }
    }

    fn counter() -> Counter {
        Counter {
            hold_for: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_hold_persists_and_arms_timer() {
        ReducerTest::new(DeskReducer)
            .with_env(counter())
            .given_state(Desk::default())
            .when_action(DeskAction::Hold(12))
            .then_state(|desk| assert!(desk.held.contains(&12)))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
                assertions::assert_has_delay_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_effects_come_from_last_action_only() {
        ReducerTest::new(DeskReducer)
            .with_env(counter())
            .given_state(Desk::default())
            .when_action(DeskAction::Hold(3))
            .when_action(DeskAction::Hold(4))
            .when_action(DeskAction::Release(3))
            .then_state(|desk| assert_eq!(desk.held, BTreeSet::from([4])))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_repeated_hold_is_idle() {
        let mut desk = Desk::default();
        desk.held.insert(8);
        ReducerTest::new(DeskReducer)
            .with_env(counter())
            .given_state(desk)
            .when_action(DeskAction::Hold(8))
            .then_effects(|effects| assert_eq!(assertions::count_future_effects(effects), 0))
            .run();
    }

    #[test]
    fn test_future_count_looks_inside_groups() {
        let effects: Vec<Effect<DeskAction>> = vec![
            Effect::chain(vec![
                Effect::future(async { None }),
                Effect::merge(vec![Effect::future(async { None }), Effect::None]),
            ]),
            Effect::future(async { None }),
        ];
        assert_eq!(assertions::count_future_effects(&effects), 3);
        assertions::assert_effects_count(&effects, 2);
    }

    #[test]
    #[should_panic(expected = "no starting state")]
    fn test_missing_state_is_reported() {
        ReducerTest::new(DeskReducer)
            .with_env(counter())
            .when_action(DeskAction::Release(1))
            .run();
    }
}
