use std::fmt::Debug;
use serde::{Deserialize, Serialize};

/// Inputs of a load request.
///
/// Parameters decide whether previously loaded data may be shown for the current request.
/// A typical implementation compares the user or tenant a response belongs to, so that
/// a cached response of one account is never shown to another.
pub trait Parameters: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Whether data loaded with `self` may stand in for data requested with `candidate`.
    fn is_cache_compatible(&self, candidate: &Self) -> bool;
}

/// Parameters for sources that take no inputs. Always cache compatible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoParameters;

impl Parameters for NoParameters {
    fn is_cache_compatible(&self, _candidate: &Self) -> bool {
        true
    }
}

/// Instruction to (re)load data.
///
/// Two impulses are equal when their parameters are equal. The `skip_if_result_available`
/// flag is ignored by comparison so that impulse streams can be de-duplicated by what they load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadImpulse<P> {
    pub parameters: P,
    /// Don't load if the datasource already produced a successful result.
    pub skip_if_result_available: bool,
}

impl <P> LoadImpulse<P> {
    pub fn new(parameters: P) -> Self {
        LoadImpulse {
            parameters,
            skip_if_result_available: false,
        }
    }

    /// Impulse that is dropped when a successful result is already available.
    pub fn skipping_if_available(parameters: P) -> Self {
        LoadImpulse {
            parameters,
            skip_if_result_available: true,
        }
    }
}

impl <P: Parameters> LoadImpulse<P> {
    /// Whether data loaded for `self` may be shown for `other`.
    pub fn is_cache_compatible(&self, other: &LoadImpulse<P>) -> bool {
        self.parameters.is_cache_compatible(&other.parameters)
    }
}

impl <P: PartialEq> PartialEq for LoadImpulse<P> {
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
    }
}

impl <P: Eq> Eq for LoadImpulse<P> {}
