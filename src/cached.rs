use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, watch};
use tokio::sync::broadcast::error::RecvError;
use crate::datasources::datasource::{BoxDatasource, Datasource};
use crate::emitters::load_impulse_emitter::{LoadImpulseEmitter, LoadImpulses};
use crate::error::{DatasourceError, DeferredLoadError};
use crate::load_impulse::{LoadImpulse, Parameters};
use crate::persisters::state_persister::StatePersister;
use crate::state::{State, StateValue};
use crate::task::AbortOnDrop;

const LOADING_ENDED_CAPACITY: usize = 16;

/// Combines a primary state, a cache state and the current load impulse into one state.
///
/// Values and errors are only taken over when they are cache compatible with `impulse`.
/// A primary result that matches nothing collapses to [`State::NotReady`]: it belongs to
/// a superseded request and must not be shown.
pub fn reconcile<V, P, E>(primary: &State<V, P, E>, cache: &State<V, P, E>, impulse: Option<&LoadImpulse<P>>) -> State<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    let Some(impulse) = impulse else {
        return State::NotReady;
    };
    let primary_value = primary.cache_compatible_value(impulse).cloned();
    let primary_error = primary.cache_compatible_error(impulse).cloned();
    match primary {
        State::NotReady | State::Loading { .. } => {
            if primary_value.is_some() {
                State::loading(impulse.clone(), primary_value, primary_error)
            } else if let Some(cached) = cache.cache_compatible_value(impulse) {
                State::loading(impulse.clone(), Some(cached.clone()), None)
            } else if matches!(primary, State::Loading { .. }) {
                State::loading(impulse.clone(), None, primary_error)
            } else {
                State::NotReady
            }
        }
        State::Result { .. } => match (primary_value, primary_error) {
            (Some(value), Some(error)) => State::failure(impulse.clone(), error, Some(value)),
            (Some(value), None) => State::success(impulse.clone(), value),
            (None, Some(error)) => {
                let cached = cache.cache_compatible_value(impulse).cloned();
                State::failure(impulse.clone(), error, cached)
            }
            (None, None) => State::NotReady,
        },
    }
}

/// Datasource merging a primary (remote) datasource with a cache datasource.
///
/// Every change of the primary state, the cache state or the load impulse recomputes the state
/// with [`reconcile`]. Successful primary results are persisted as a side effect; failures to
/// persist are logged and otherwise ignored.
///
/// The first state is computed before [`CachedDatasource::new`] returns, so a current state is
/// always available.
pub struct CachedDatasource<V, P, E> {
    name: String,
    emitter: Arc<dyn LoadImpulseEmitter<P>>,
    state: watch::Receiver<State<V, P, E>>,
    loading_ended: broadcast::Sender<State<V, P, E>>,
    loaded_successfully: Arc<AtomicBool>,
    _primary: BoxDatasource<V, P, E>,
    _cache: BoxDatasource<V, P, E>,
    _task: AbortOnDrop,
}

impl <V, P, E> CachedDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// `primary` and `cache` must react to impulses of `emitter`. `name` identifies the
    /// datasource in logs.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new<Primary, Cache, Emitter, Persister>(
        name: impl Into<String>,
        primary: Primary,
        cache: Cache,
        emitter: Arc<Emitter>,
        persister: Arc<Persister>,
    ) -> Self
    where
        Primary: Datasource<V, P, E>,
        Cache: Datasource<V, P, E>,
        Emitter: LoadImpulseEmitter<P>,
        Persister: StatePersister<V, P, E> + ?Sized,
    {
        let name = name.into();
        let mut impulses = emitter.subscribe();
        let (sender, state) = watch::channel(State::NotReady);
        let (loading_ended, _) = broadcast::channel(LOADING_ENDED_CAPACITY);
        let loaded_successfully = Arc::new(AtomicBool::new(false));

        let mut reconciler = Reconciler {
            name: name.clone(),
            primary: primary.state(),
            cache: cache.state(),
            impulse: impulses.latest(),
            unreported_result: false,
            persister,
            sender,
            loading_ended: loading_ended.clone(),
            loaded_successfully: loaded_successfully.clone(),
        };
        reconciler.tick(true);

        CachedDatasource {
            name,
            emitter,
            state,
            loading_ended,
            loaded_successfully,
            _primary: Box::new(primary),
            _cache: Box::new(cache),
            _task: AbortOnDrop::spawn(reconciler.run(impulses)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emits `impulse` unless it asks to skip when a result is available and this datasource
    /// already produced a successful state. Returns whether a load was triggered.
    pub fn load(&self, impulse: LoadImpulse<P>) -> bool {
        if impulse.skip_if_result_available && self.loaded_successfully.load(Ordering::Acquire) {
            tracing::debug!(datasource = %self.name, parameters = ?impulse.parameters, "result available, load skipped");
            return false;
        }
        tracing::debug!(datasource = %self.name, parameters = ?impulse.parameters, "load");
        self.emitter.emit(impulse);
        true
    }

    /// Loads and resolves with the state the load ended in, skipping intermediate states.
    ///
    /// A skipped load resolves with the current state if it is a result. Otherwise it waits
    /// for the load in progress to end, whatever its parameters.
    ///
    /// Never resolves if the load is superseded by an impulse with other parameters before
    /// the primary datasource finished it.
    ///
    /// # Errors
    /// [`DeferredLoadError::Closed`] if the datasource stops first.
    pub async fn load_deferred(&self, impulse: LoadImpulse<P>) -> Result<State<V, P, E>, DeferredLoadError> {
        let mut ended = self.loading_ended.subscribe();
        let mut state = self.state.clone();
        let parameters = impulse.parameters.clone();
        let wanted = if self.load(impulse) {
            Some(parameters)
        } else {
            let current = state.borrow_and_update().clone();
            if current.is_result() {
                return Ok(current);
            }
            None
        };
        loop {
            tokio::select! {
                biased;
                received = ended.recv() => match received {
                    Ok(ended_state) => {
                        let matches = wanted.as_ref().map_or(true, |wanted| {
                            ended_state.load_impulse().is_some_and(|own| &own.parameters == wanted)
                        });
                        if matches {
                            return Ok(ended_state);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(datasource = %self.name, skipped, "deferred load lagged behind, ended loads skipped");
                    }
                    Err(RecvError::Closed) => return Err(DeferredLoadError::Closed),
                },
                changed = state.changed() => {
                    // the reconciliation task owns the state sender
                    if changed.is_err() {
                        return Err(DeferredLoadError::Closed);
                    }
                }
            }
        }
    }

    /// Receives the combined state once per finished load, e.g. to hide a spinner.
    /// Subscribe before calling [`load`](Self::load).
    pub fn loading_ended(&self) -> broadcast::Receiver<State<V, P, E>> {
        self.loading_ended.subscribe()
    }
}

impl <V, P, E> Datasource<V, P, E> for CachedDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn state(&self) -> watch::Receiver<State<V, P, E>> {
        self.state.clone()
    }

    fn loads_synchronously(&self) -> bool {
        true
    }
}

struct Reconciler<V, P, E, Persister: ?Sized> {
    name: String,
    primary: watch::Receiver<State<V, P, E>>,
    cache: watch::Receiver<State<V, P, E>>,
    impulse: Option<LoadImpulse<P>>,
    // primary finished a load that loading_ended hasn't reported yet
    unreported_result: bool,
    persister: Arc<Persister>,
    sender: watch::Sender<State<V, P, E>>,
    loading_ended: broadcast::Sender<State<V, P, E>>,
    loaded_successfully: Arc<AtomicBool>,
}

impl <V, P, E, Persister> Reconciler<V, P, E, Persister>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
    Persister: StatePersister<V, P, E> + ?Sized,
{
    async fn run(mut self, mut impulses: LoadImpulses<P>) {
        loop {
            // impulses first, so a primary reacting to a new impulse is judged against it
            let primary_changed = tokio::select! {
                biased;
                impulse = impulses.recv() => {
                    let Some(impulse) = impulse else {
                        break;
                    };
                    if self.impulse.as_ref() == Some(&impulse) {
                        continue;
                    }
                    // a result the primary finished before this impulse belongs to an older cycle
                    self.unreported_result = false;
                    self.impulse = Some(impulse);
                    false
                }
                changed = self.primary.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    true
                }
                changed = self.cache.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
            };
            self.tick(primary_changed);
        }
        tracing::debug!(datasource = %self.name, "reconciliation stopped");
    }

    fn tick(&mut self, primary_changed: bool) {
        let primary = self.primary.borrow_and_update().clone();
        let cache = self.cache.borrow_and_update().clone();

        if primary_changed {
            self.unreported_result = primary.is_result();
            if primary.is_success() {
                if let Err(err) = self.persister.persist(&primary) {
                    tracing::warn!(datasource = %self.name, error = %err, "failed to persist state");
                }
            }
        }

        let next = reconcile(&primary, &cache, self.impulse.as_ref());
        tracing::trace!(datasource = %self.name, provisioning_state = ?next.provisioning_state(), "reconciled");
        if next.is_success() {
            self.loaded_successfully.store(true, Ordering::Release);
        }

        let finished = self.unreported_result
            && primary.load_impulse().is_some()
            && primary.load_impulse() == self.impulse.as_ref();
        if finished {
            self.unreported_result = false;
            let _ = self.loading_ended.send(next.clone());
        }

        self.sender.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
