use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::emitters::load_impulse_emitter::{LoadImpulseEmitter, LoadImpulses};
use crate::load_impulse::{LoadImpulse, Parameters};
use crate::task::AbortOnDrop;

/// Whether and how often the last impulse is re-emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimerMode {
    #[default]
    Off,
    RepeatEvery(Duration),
}

struct Recurrence<P> {
    mode: TimerMode,
    last_impulse: Option<LoadImpulse<P>>,
    timer: Option<AbortOnDrop>,
}

/// Emitter that keeps re-emitting its last impulse while a [`TimerMode::RepeatEvery`] is set.
///
/// Emitting a new impulse or changing the timer mode cancels the pending repetition and
/// schedules a new one. Used for data that has to stay live, e.g. polling every few seconds.
pub struct RecurringLoadImpulseEmitter<P: Parameters, Base: LoadImpulseEmitter<P>> {
    base: Arc<Base>,
    recurrence: Mutex<Recurrence<P>>,
}

impl <P: Parameters, Base: LoadImpulseEmitter<P>> RecurringLoadImpulseEmitter<P, Base> {
    /// Wraps `base`. A replayed impulse of `base` is repeated like an emitted one.
    ///
    /// # Panics
    /// Panics when a timer has to be scheduled outside of a tokio runtime.
    pub fn new(base: Base, mode: TimerMode) -> Self {
        let base = Arc::new(base);
        let last_impulse = base.replayed_impulse();
        let timer = last_impulse.clone().and_then(|impulse| schedule(&base, mode, impulse));
        RecurringLoadImpulseEmitter {
            base,
            recurrence: Mutex::new(Recurrence {
                mode,
                last_impulse,
                timer,
            }),
        }
    }

    pub fn timer_mode(&self) -> TimerMode {
        self.lock().mode
    }

    /// Replaces the timer mode and restarts the repetition of the last impulse under it.
    /// The last impulse is not emitted immediately.
    pub fn set_timer_mode(&self, mode: TimerMode) {
        let mut recurrence = self.lock();
        recurrence.mode = mode;
        recurrence.timer = recurrence.last_impulse
            .clone()
            .and_then(|impulse| schedule(&self.base, mode, impulse));
        tracing::debug!(?mode, "timer mode changed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recurrence<P>> {
        self.recurrence.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn schedule<P: Parameters, Base: LoadImpulseEmitter<P>>(base: &Arc<Base>, mode: TimerMode, impulse: LoadImpulse<P>) -> Option<AbortOnDrop> {
    let TimerMode::RepeatEvery(interval) = mode else {
        return None;
    };
    let base = base.clone();
    Some(AbortOnDrop::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            tracing::trace!(parameters = ?impulse.parameters, "repeating load impulse");
            base.emit(impulse.clone());
        }
    }))
}

impl <P: Parameters, Base: LoadImpulseEmitter<P>> LoadImpulseEmitter<P> for RecurringLoadImpulseEmitter<P, Base> {
    fn emit(&self, impulse: LoadImpulse<P>) {
        let mut recurrence = self.lock();
        // the old timer must be gone before the new impulse goes out
        recurrence.timer = None;
        self.base.emit(impulse.clone());
        recurrence.timer = schedule(&self.base, recurrence.mode, impulse.clone());
        recurrence.last_impulse = Some(impulse);
    }

    fn subscribe(&self) -> LoadImpulses<P> {
        self.base.subscribe()
    }

    fn replayed_impulse(&self) -> Option<LoadImpulse<P>> {
        self.base.replayed_impulse()
    }
}
