/// Emitter trait, subscriptions and the broadcast-backed default emitter
pub mod load_impulse_emitter;

/// Emitter that repeats its last impulse on a timer
pub mod recurring;
