use tokio::sync::watch;
use crate::datasources::datasource::Datasource;
use crate::error::DatasourceError;
use crate::load_impulse::Parameters;
use crate::state::{State, StateValue};

/// Datasource whose states are pushed by its owner.
///
/// Bridges producers that don't fit [`Loader`](crate::datasources::loader::Loader),
/// e.g. a push-based subscription.
#[derive(Debug)]
pub struct ManualDatasource<V, P, E> {
    sender: watch::Sender<State<V, P, E>>,
    loads_synchronously: bool,
}

impl <V, P, E> ManualDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// Starts at [`State::NotReady`].
    pub fn new() -> Self {
        let (sender, _) = watch::channel(State::NotReady);
        ManualDatasource {
            sender,
            loads_synchronously: false,
        }
    }

    /// Starts at `initial` and reports synchronous loading.
    pub fn with_initial(initial: State<V, P, E>) -> Self {
        let (sender, _) = watch::channel(initial);
        ManualDatasource {
            sender,
            loads_synchronously: true,
        }
    }

    pub fn send(&self, state: State<V, P, E>) {
        self.sender.send_replace(state);
    }
}

impl <V, P, E> Default for ManualDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn default() -> Self {
        Self::new()
    }
}

impl <V, P, E> Datasource<V, P, E> for ManualDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn state(&self) -> watch::Receiver<State<V, P, E>> {
        self.sender.subscribe()
    }

    fn loads_synchronously(&self) -> bool {
        self.loads_synchronously
    }
}
