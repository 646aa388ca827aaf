use std::sync::Arc;
use tokio::sync::watch;
use crate::datasources::datasource::Datasource;
use crate::emitters::load_impulse_emitter::{LoadImpulseEmitter, LoadImpulses};
use crate::error::{CacheLoadError, DatasourceError};
use crate::load_impulse::{LoadImpulse, Parameters};
use crate::persisters::state_persister::StatePersister;
use crate::state::{State, StateValue};
use crate::task::AbortOnDrop;

/// Datasource that reads the persisted state once per distinct load impulse.
///
/// A miss produces a result with an error made by
/// [`DatasourceError::from_cache_load_error`] and no value.
pub struct PlainCacheDatasource<V, P, E> {
    state: watch::Receiver<State<V, P, E>>,
    _task: AbortOnDrop,
}

impl <V, P, E> PlainCacheDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// An impulse already replayed by `emitter` is read before this returns.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new<Persister, Emitter>(persister: Arc<Persister>, emitter: &Emitter) -> Self
    where
        Persister: StatePersister<V, P, E> + ?Sized,
        Emitter: LoadImpulseEmitter<P> + ?Sized,
    {
        let mut impulses = emitter.subscribe();
        let current = impulses.latest();
        let initial = match &current {
            Some(impulse) => read(persister.as_ref(), impulse),
            None => State::NotReady,
        };
        let (sender, state) = watch::channel(initial);
        PlainCacheDatasource {
            state,
            _task: AbortOnDrop::spawn(run(persister, impulses, current, sender)),
        }
    }
}

fn read<V, P, E, Persister>(persister: &Persister, impulse: &LoadImpulse<P>) -> State<V, P, E>
where
    Persister: StatePersister<V, P, E> + ?Sized,
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    match persister.load(&impulse.parameters) {
        Some(state) => {
            tracing::debug!(parameters = ?impulse.parameters, "cache hit");
            state
        }
        None => {
            tracing::debug!(parameters = ?impulse.parameters, "cache miss");
            State::failure(impulse.clone(), E::from_cache_load_error(CacheLoadError), None)
        }
    }
}

async fn run<V, P, E, Persister>(
    persister: Arc<Persister>,
    mut impulses: LoadImpulses<P>,
    mut current: Option<LoadImpulse<P>>,
    sender: watch::Sender<State<V, P, E>>,
)
where
    Persister: StatePersister<V, P, E> + ?Sized,
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    while let Some(impulse) = impulses.recv().await {
        if current.as_ref() == Some(&impulse) {
            continue;
        }
        sender.send_replace(read(persister.as_ref(), &impulse));
        current = Some(impulse);
    }
}

impl <V, P, E> Datasource<V, P, E> for PlainCacheDatasource<V, P, E>
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
