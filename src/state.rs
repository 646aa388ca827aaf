use std::fmt::Debug;
use serde::{Deserialize, Serialize};
use crate::load_impulse::{LoadImpulse, Parameters};

/// Bounds every loaded value has to satisfy.
pub trait StateValue: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl <T: Clone + PartialEq + Debug + Send + Sync + 'static> StateValue for T {}

/// Lifecycle phase of a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningState {
    NotReady,
    Loading,
    Result,
}

/// Lifecycle of a load operation.
///
/// Values and errors always belong to the `load_impulse` of the state. Data from an earlier
/// load is only attached after [`LoadImpulse::is_cache_compatible`] confirmed it may be shown
/// for the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provisioning_state", rename_all = "snake_case")]
pub enum State<V, P, E> {
    /// No data, no error, nothing loading.
    NotReady,
    /// A load is in progress. Fallbacks keep previous data on screen.
    Loading {
        load_impulse: LoadImpulse<P>,
        fallback_value: Option<V>,
        fallback_error: Option<E>,
    },
    /// Outcome of a load. An error may carry a fallback value.
    Result {
        load_impulse: LoadImpulse<P>,
        value: Option<V>,
        error: Option<E>,
    },
}

impl <V, P, E> Default for State<V, P, E> {
    fn default() -> Self {
        State::NotReady
    }
}

impl <V, P, E> State<V, P, E> {
    /// Successful result.
    pub fn success(load_impulse: LoadImpulse<P>, value: V) -> Self {
        State::Result {
            load_impulse,
            value: Some(value),
            error: None,
        }
    }

    /// Failed result, optionally keeping a value to show alongside the error.
    pub fn failure(load_impulse: LoadImpulse<P>, error: E, fallback_value: Option<V>) -> Self {
        State::Result {
            load_impulse,
            value: fallback_value,
            error: Some(error),
        }
    }

    /// Result of a finished load.
    pub fn from_result(load_impulse: LoadImpulse<P>, result: Result<V, E>) -> Self {
        match result {
            Ok(value) => State::success(load_impulse, value),
            Err(error) => State::failure(load_impulse, error, None),
        }
    }

    pub fn loading(load_impulse: LoadImpulse<P>, fallback_value: Option<V>, fallback_error: Option<E>) -> Self {
        State::Loading {
            load_impulse,
            fallback_value,
            fallback_error,
        }
    }

    pub fn provisioning_state(&self) -> ProvisioningState {
        match self {
            State::NotReady => ProvisioningState::NotReady,
            State::Loading { .. } => ProvisioningState::Loading,
            State::Result { .. } => ProvisioningState::Result,
        }
    }

    pub fn load_impulse(&self) -> Option<&LoadImpulse<P>> {
        match self {
            State::NotReady => None,
            State::Loading { load_impulse, .. } | State::Result { load_impulse, .. } => Some(load_impulse),
        }
    }

    /// Value of a result, or fallback value while loading.
    pub fn value(&self) -> Option<&V> {
        match self {
            State::NotReady => None,
            State::Loading { fallback_value, .. } => fallback_value.as_ref(),
            State::Result { value, .. } => value.as_ref(),
        }
    }

    /// Error of a result, or fallback error while loading.
    pub fn error(&self) -> Option<&E> {
        match self {
            State::NotReady => None,
            State::Loading { fallback_error, .. } => fallback_error.as_ref(),
            State::Result { error, .. } => error.as_ref(),
        }
    }

    /// A result with a value and without an error.
    pub fn is_success(&self) -> bool {
        matches!(self, State::Result { value: Some(_), error: None, .. })
    }

    pub fn is_result(&self) -> bool {
        matches!(self, State::Result { .. })
    }
}

impl <V, P: Parameters, E> State<V, P, E> {
    fn is_cache_compatible(&self, load_impulse: &LoadImpulse<P>) -> bool {
        self.load_impulse()
            .is_some_and(|own| own.is_cache_compatible(load_impulse))
    }

    /// The value, if it may be shown for `load_impulse`.
    pub fn cache_compatible_value(&self, load_impulse: &LoadImpulse<P>) -> Option<&V> {
        if self.is_cache_compatible(load_impulse) {
            self.value()
        } else {
            None
        }
    }

    /// The error, if it may be shown for `load_impulse`.
    pub fn cache_compatible_error(&self, load_impulse: &LoadImpulse<P>) -> Option<&E> {
        if self.is_cache_compatible(load_impulse) {
            self.error()
        } else {
            None
        }
    }
}
