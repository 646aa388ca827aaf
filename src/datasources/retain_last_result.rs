use tokio::sync::watch;
use crate::datasources::datasource::{BoxDatasource, Datasource};
use crate::error::DatasourceError;
use crate::load_impulse::{LoadImpulse, Parameters};
use crate::state::{State, StateValue};
use crate::task::AbortOnDrop;

/// Decorator that keeps the last value and error of the inner datasource on screen while it reloads.
///
/// Retained data is only attached when it is cache compatible with the impulse of the state it is
/// attached to. A result that carries neither a compatible value nor a compatible error collapses
/// to [`State::NotReady`], so a response of a superseded request is never shown.
pub struct LastResultRetainingDatasource<V, P, E> {
    state: watch::Receiver<State<V, P, E>>,
    loads_synchronously: bool,
    _inner: BoxDatasource<V, P, E>,
    _task: AbortOnDrop,
}

impl <V, P, E> LastResultRetainingDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new<D: Datasource<V, P, E>>(inner: D) -> Self {
        let mut inner_state = inner.state();
        let mut retained = Retained::default();
        let initial = retained.apply(inner_state.borrow_and_update().clone());
        let (sender, state) = watch::channel(initial);
        let task = AbortOnDrop::spawn(async move {
            while inner_state.changed().await.is_ok() {
                let raw = inner_state.borrow_and_update().clone();
                let next = retained.apply(raw);
                sender.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
        });
        LastResultRetainingDatasource {
            state,
            loads_synchronously: inner.loads_synchronously(),
            _inner: Box::new(inner),
            _task: task,
        }
    }
}

/// Last result with a value and last result with an error.
struct Retained<V, P, E> {
    value_result: Option<State<V, P, E>>,
    error_result: Option<State<V, P, E>>,
}

impl <V, P, E> Default for Retained<V, P, E> {
    fn default() -> Self {
        Retained {
            value_result: None,
            error_result: None,
        }
    }
}

impl <V, P, E> Retained<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn remember(&mut self, state: &State<V, P, E>) {
        let State::Result { value, error, .. } = state else {
            return;
        };
        if value.is_some() && self.value_result.as_ref().and_then(State::value) != value.as_ref() {
            self.value_result = Some(state.clone());
        }
        if error.is_some() && self.error_result.as_ref().and_then(State::error) != error.as_ref() {
            self.error_result = Some(state.clone());
        }
    }

    fn value_for(&self, impulse: &LoadImpulse<P>) -> Option<V> {
        self.value_result.as_ref()?.cache_compatible_value(impulse).cloned()
    }

    fn error_for(&self, impulse: &LoadImpulse<P>) -> Option<E> {
        self.error_result.as_ref()?.cache_compatible_error(impulse).cloned()
    }

    fn apply(&mut self, state: State<V, P, E>) -> State<V, P, E> {
        self.remember(&state);
        match &state {
            State::NotReady => State::NotReady,
            State::Loading { load_impulse, .. } => {
                let value = state.cache_compatible_value(load_impulse)
                    .cloned()
                    .or_else(|| self.value_for(load_impulse));
                let error = state.cache_compatible_error(load_impulse)
                    .cloned()
                    .or_else(|| self.error_for(load_impulse));
                State::loading(load_impulse.clone(), value, error)
            }
            State::Result { load_impulse, .. } => {
                if let Some(error) = state.cache_compatible_error(load_impulse) {
                    let value = state.cache_compatible_value(load_impulse)
                        .cloned()
                        .or_else(|| self.value_for(load_impulse));
                    State::failure(load_impulse.clone(), error.clone(), value)
                } else if let Some(value) = state.cache_compatible_value(load_impulse) {
                    // a clean success drops every fallback error
                    State::success(load_impulse.clone(), value.clone())
                } else {
                    State::NotReady
                }
            }
        }
    }
}

impl <V, P, E> Datasource<V, P, E> for LastResultRetainingDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn state(&self) -> watch::Receiver<State<V, P, E>> {
        self.state.clone()
    }

    fn loads_synchronously(&self) -> bool {
        self.loads_synchronously
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use super::*;
    use crate::datasources::datasource::DatasourceExt;
    use crate::datasources::manual::ManualDatasource;
    use crate::state::tests::{impulse, Account, TestError, TestState};

    fn apply_all(states: Vec<TestState>) -> TestState {
        let mut retained = Retained::default();
        let mut last = TestState::NotReady;
        for state in states {
            last = retained.apply(state);
        }
        last
    }

    #[test]
    fn loading_keeps_previous_value() {
        let out = apply_all(vec![
            State::success(impulse(1, 1), "first".into()),
            State::loading(impulse(1, 2), None, None),
        ]);
        assert_eq!(out, State::loading(impulse(1, 2), Some("first".into()), None));
    }

    #[test]
    fn loading_keeps_previous_error() {
        let out = apply_all(vec![
            State::failure(impulse(1, 1), TestError::Remote("down".into()), None),
            State::loading(impulse(1, 1), None, None),
        ]);
        assert_eq!(out, State::loading(impulse(1, 1), None, Some(TestError::Remote("down".into()))));
    }

    #[test]
    fn loading_for_other_user_drops_retained_data() {
        let out = apply_all(vec![
            State::success(impulse(1, 1), "first".into()),
            State::loading(impulse(2, 1), None, None),
        ]);
        assert_eq!(out, State::loading(impulse(2, 1), None, None));
    }

    #[test]
    fn error_for_other_user_drops_retained_value() {
        let out = apply_all(vec![
            State::success(impulse(1, 1), "first".into()),
            State::loading(impulse(2, 1), None, None),
            State::failure(impulse(2, 1), TestError::Remote("down".into()), None),
        ]);
        assert_eq!(out, State::failure(impulse(2, 1), TestError::Remote("down".into()), None));
        assert_eq!(out.value(), None);
    }

    #[test]
    fn error_gets_retained_value() {
        let out = apply_all(vec![
            State::success(impulse(1, 1), "first".into()),
            State::loading(impulse(1, 1), None, None),
            State::failure(impulse(1, 1), TestError::Remote("down".into()), None),
        ]);
        assert_eq!(out, State::failure(impulse(1, 1), TestError::Remote("down".into()), Some("first".into())));
    }

    #[test]
    fn success_erases_errors() {
        let out = apply_all(vec![
            State::failure(impulse(1, 1), TestError::Remote("down".into()), None),
            State::loading(impulse(1, 1), None, None),
            State::success(impulse(1, 1), "recovered".into()),
        ]);
        assert_eq!(out, State::success(impulse(1, 1), "recovered".to_string()));
        assert_eq!(out.error(), None);
    }

    #[test]
    fn empty_result_is_not_ready() {
        let out = apply_all(vec![
            State::success(impulse(1, 1), "first".into()),
            State::Result { load_impulse: impulse(1, 1), value: None, error: None },
        ]);
        assert_eq!(out, State::NotReady);
    }

    #[test]
    fn not_ready_passes_through() {
        let out = apply_all(vec![State::success(impulse(1, 1), "first".into()), State::NotReady]);
        assert_eq!(out, State::NotReady);
    }

    #[tokio::test]
    async fn decorates_datasource() {
        let inner = Arc::new(ManualDatasource::<String, Account, TestError>::new());
        let retaining = inner.clone().retain_last_result();
        assert!(!retaining.loads_synchronously());
        let mut state = retaining.state();

        inner.send(State::success(impulse(1, 1), "first".into()));
        timeout(Duration::from_secs(5), state.wait_for(|s| s.is_success())).await.unwrap().unwrap();

        inner.send(State::loading(impulse(1, 2), None, None));
        let loading = timeout(Duration::from_secs(5), state.wait_for(|s| !s.is_result())).await.unwrap().unwrap().clone();
        assert_eq!(loading, State::loading(impulse(1, 2), Some("first".into()), None));
    }
}
