use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use crate::load_impulse::{LoadImpulse, Parameters};

/// Number of impulses a slow subscriber may fall behind before it skips ahead.
pub const IMPULSE_CAPACITY: usize = 16;

/// Hot, multicast source of load impulses.
pub trait LoadImpulseEmitter<P: Parameters>: Send + Sync + 'static {
    /// Pushes `impulse` to all current subscribers.
    fn emit(&self, impulse: LoadImpulse<P>);

    /// Subscribes to impulses emitted from now on.
    /// Emitters with replay deliver their latest impulse first.
    fn subscribe(&self) -> LoadImpulses<P>;

    /// Impulse a new subscriber would receive first, if replay is enabled.
    fn replayed_impulse(&self) -> Option<LoadImpulse<P>> {
        None
    }
}

/// Subscription to a [`LoadImpulseEmitter`].
#[derive(Debug)]
pub struct LoadImpulses<P> {
    replayed: Option<LoadImpulse<P>>,
    receiver: broadcast::Receiver<LoadImpulse<P>>,
}

impl <P: Clone> LoadImpulses<P> {
    pub fn new(replayed: Option<LoadImpulse<P>>, receiver: broadcast::Receiver<LoadImpulse<P>>) -> Self {
        LoadImpulses {
            replayed,
            receiver,
        }
    }

    /// Waits for the next impulse. `None` once the emitter is gone.
    ///
    /// Cancel safe, so it can be used as a `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<LoadImpulse<P>> {
        if let Some(impulse) = self.replayed.take() {
            return Some(impulse);
        }
        loop {
            match self.receiver.recv().await {
                Ok(impulse) => return Some(impulse),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "load impulse subscriber lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next impulse if one is already waiting.
    pub fn try_recv(&mut self) -> Option<LoadImpulse<P>> {
        if let Some(impulse) = self.replayed.take() {
            return Some(impulse);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(impulse) => return Some(impulse),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "load impulse subscriber lagged behind");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drains all waiting impulses and returns the latest.
    pub fn latest(&mut self) -> Option<LoadImpulse<P>> {
        let mut latest = None;
        while let Some(impulse) = self.try_recv() {
            latest = Some(impulse);
        }
        latest
    }
}

/// Emitter backed by a broadcast channel.
///
/// Constructed with an initial impulse, it replays the most recent impulse to every new
/// subscriber, so datasources created after the first `emit` still start on current
/// parameters. Constructed without one, it only delivers impulses emitted after subscribing.
#[derive(Debug)]
pub struct DefaultLoadImpulseEmitter<P> {
    sender: broadcast::Sender<LoadImpulse<P>>,
    // latest impulse, None when replay is disabled
    replay: Option<Mutex<LoadImpulse<P>>>,
}

impl <P: Parameters> DefaultLoadImpulseEmitter<P> {
    pub fn new(initial: Option<LoadImpulse<P>>) -> Self {
        let (sender, _) = broadcast::channel(IMPULSE_CAPACITY);
        DefaultLoadImpulseEmitter {
            sender,
            replay: initial.map(Mutex::new),
        }
    }
}

impl <P: Parameters> LoadImpulseEmitter<P> for DefaultLoadImpulseEmitter<P> {
    fn emit(&self, impulse: LoadImpulse<P>) {
        tracing::trace!(parameters = ?impulse.parameters, "emitting load impulse");
        match &self.replay {
            Some(latest) => {
                // hold the lock while sending so subscribe() can't observe a torn update
                let mut latest = latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                *latest = impulse.clone();
                let _ = self.sender.send(impulse);
            }
            None => {
                let _ = self.sender.send(impulse);
            }
        }
    }

    fn subscribe(&self) -> LoadImpulses<P> {
        match &self.replay {
            Some(latest) => {
                let latest = latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                LoadImpulses::new(Some(latest.clone()), self.sender.subscribe())
            }
            None => LoadImpulses::new(None, self.sender.subscribe()),
        }
    }

    fn replayed_impulse(&self) -> Option<LoadImpulse<P>> {
        self.replay.as_ref().map(|latest| {
            latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
        })
    }
}

impl <P: Parameters, T: LoadImpulseEmitter<P> + ?Sized> LoadImpulseEmitter<P> for std::sync::Arc<T> {
    fn emit(&self, impulse: LoadImpulse<P>) {
        (**self).emit(impulse)
    }

    fn subscribe(&self) -> LoadImpulses<P> {
        (**self).subscribe()
    }

    fn replayed_impulse(&self) -> Option<LoadImpulse<P>> {
        (**self).replayed_impulse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_impulse::NoParameters;
    use crate::state::tests::{impulse, Account};

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let emitter = DefaultLoadImpulseEmitter::<Account>::new(None);
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();
        emitter.emit(impulse(1, 1));
        assert_eq!(first.recv().await, Some(impulse(1, 1)));
        assert_eq!(second.recv().await, Some(impulse(1, 1)));
    }

    #[tokio::test]
    async fn hot_emitter_does_not_replay() {
        let emitter = DefaultLoadImpulseEmitter::<Account>::new(None);
        emitter.emit(impulse(1, 1));
        let mut late = emitter.subscribe();
        assert_eq!(late.try_recv(), None);
        assert_eq!(emitter.replayed_impulse(), None);
    }

    #[tokio::test]
    async fn replays_latest_impulse_to_late_subscribers() {
        let emitter = DefaultLoadImpulseEmitter::new(Some(impulse(1, 1)));
        let mut early = emitter.subscribe();
        assert_eq!(early.recv().await, Some(impulse(1, 1)));

        emitter.emit(impulse(1, 2));
        let mut late = emitter.subscribe();
        assert_eq!(late.recv().await, Some(impulse(1, 2)));
        assert_eq!(late.try_recv(), None);
        assert_eq!(early.recv().await, Some(impulse(1, 2)));
    }

    #[tokio::test]
    async fn latest_drains_pending_impulses() {
        let emitter = DefaultLoadImpulseEmitter::new(Some(impulse(1, 1)));
        let mut subscription = emitter.subscribe();
        emitter.emit(impulse(1, 2));
        emitter.emit(impulse(1, 3));
        assert_eq!(subscription.latest(), Some(impulse(1, 3)));
        assert_eq!(subscription.try_recv(), None);
    }

    #[tokio::test]
    async fn closes_when_emitter_dropped() {
        let emitter = DefaultLoadImpulseEmitter::new(Some(LoadImpulse::new(NoParameters)));
        let mut subscription = emitter.subscribe();
        drop(emitter);
        assert!(subscription.recv().await.is_some());
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let emitter = DefaultLoadImpulseEmitter::<Account>::new(None);
        let mut subscription = emitter.subscribe();
        for page in 0..(IMPULSE_CAPACITY as u32 + 4) {
            emitter.emit(impulse(1, page));
        }
        assert_eq!(subscription.recv().await, Some(impulse(1, 4)));
    }
}
