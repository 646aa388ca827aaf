use std::future::Future;
use tokio::sync::watch;
use crate::datasources::datasource::Datasource;
use crate::emitters::load_impulse_emitter::{LoadImpulseEmitter, LoadImpulses};
use crate::error::DatasourceError;
use crate::load_impulse::Parameters;
use crate::state::{State, StateValue};
use crate::task::AbortOnDrop;

/// Remote data loader.
/// A loader fetches data for a set of parameters from an external source, typically the network.
/// # Errors
/// Any error of the datasource's error type. It is carried into the state stream unchanged.
pub trait Loader<V, P, E>: Send + Sync + 'static {
    /// Try to load data for `parameters`
    fn load(&self, parameters: P) -> impl Future<Output = Result<V, E>> + Send;
}

impl <V, P, E, F, Fut> Loader<V, P, E> for F
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send,
{
    fn load(&self, parameters: P) -> impl Future<Output = Result<V, E>> + Send {
        self(parameters)
    }
}

/// Primary datasource driven by a [`Loader`].
///
/// Every impulse emits [`State::Loading`] followed by a [`State::Result`] for that impulse.
/// An impulse arriving while a load is in flight drops the running load, so only the latest
/// request reaches the state stream.
pub struct LoaderDatasource<V, P, E> {
    state: watch::Receiver<State<V, P, E>>,
    _task: AbortOnDrop,
}

impl <V, P, E> LoaderDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new<L, Emitter>(loader: L, emitter: &Emitter) -> Self
    where
        L: Loader<V, P, E>,
        Emitter: LoadImpulseEmitter<P> + ?Sized,
    {
        let (sender, state) = watch::channel(State::NotReady);
        let impulses = emitter.subscribe();
        LoaderDatasource {
            state,
            _task: AbortOnDrop::spawn(run(loader, impulses, sender)),
        }
    }
}

async fn run<V, P, E, L>(loader: L, mut impulses: LoadImpulses<P>, sender: watch::Sender<State<V, P, E>>)
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
    L: Loader<V, P, E>,
{
    let Some(mut impulse) = impulses.recv().await else {
        return;
    };
    loop {
        sender.send_replace(State::loading(impulse.clone(), None, None));
        tracing::debug!(parameters = ?impulse.parameters, "loading");
        let load = loader.load(impulse.parameters.clone());
        tokio::pin!(load);
        let next = tokio::select! {
            result = &mut load => {
                if let Err(err) = &result {
                    tracing::debug!(parameters = ?impulse.parameters, error = ?err, "load failed");
                }
                sender.send_replace(State::from_result(impulse, result));
                impulses.recv().await
            }
            next = impulses.recv() => {
                tracing::debug!(parameters = ?impulse.parameters, "load superseded");
                next
            }
        };
        match next {
            Some(next) => impulse = next,
            None => return,
        }
    }
}

impl <V, P, E> Datasource<V, P, E> for LoaderDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn state(&self) -> watch::Receiver<State<V, P, E>> {
        self.state.clone()
    }

    fn loads_synchronously(&self) -> bool {
        false
    }
}
