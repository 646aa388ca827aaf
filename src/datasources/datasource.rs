use std::sync::Arc;
use tokio::sync::watch;
use crate::datasources::retain_last_result::LastResultRetainingDatasource;
use crate::error::DatasourceError;
use crate::load_impulse::Parameters;
use crate::state::{State, StateValue};

/// Source of [`State`]s.
///
/// The state channel always holds a current value. A datasource that can't produce a value
/// on subscription (`loads_synchronously() == false`) starts its channel with
/// [`State::NotReady`].
pub trait Datasource<V, P, E>: Send + Sync + 'static
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// Receiver of the state stream. Never completes while the datasource is alive.
    fn state(&self) -> watch::Receiver<State<V, P, E>>;

    /// Whether the first state is available immediately after construction.
    fn loads_synchronously(&self) -> bool;

    /// Latest state.
    fn current_state(&self) -> State<V, P, E> {
        self.state().borrow().clone()
    }
}

/// Type-erased datasource.
pub type BoxDatasource<V, P, E> = Box<dyn Datasource<V, P, E>>;

impl <V, P, E> Datasource<V, P, E> for BoxDatasource<V, P, E>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    fn state(&self) -> watch::Receiver<State<V, P, E>> {
        (**self).state()
    }

    fn loads_synchronously(&self) -> bool {
        (**self).loads_synchronously()
    }
}

impl <V, P, E, D> Datasource<V, P, E> for Arc<D>
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
    D: Datasource<V, P, E> + ?Sized,
{
    fn state(&self) -> watch::Receiver<State<V, P, E>> {
        (**self).state()
    }

    fn loads_synchronously(&self) -> bool {
        (**self).loads_synchronously()
    }
}

/// Composition helpers for every [`Datasource`].
pub trait DatasourceExt<V, P, E>: Datasource<V, P, E> + Sized
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
{
    /// Keeps the last value and error visible while the datasource reloads.
    fn retain_last_result(self) -> LastResultRetainingDatasource<V, P, E> {
        LastResultRetainingDatasource::new(self)
    }

    fn boxed(self) -> BoxDatasource<V, P, E> {
        Box::new(self)
    }
}

impl <V, P, E, D> DatasourceExt<V, P, E> for D
where
    V: StateValue,
    P: Parameters,
    E: DatasourceError,
    D: Datasource<V, P, E>,
{}
