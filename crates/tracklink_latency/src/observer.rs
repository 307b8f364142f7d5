//! Result observers and channel subscriptions.
//!
//! Registration happens off the per-frame path, so a plain mutex guards it.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::debug;

use crate::results::LatencyStatisticsResults;

/// Capacity of each subscription channel; slow subscribers lose epochs.
pub const SUBSCRIPTION_CAPACITY: usize = 16;

/// Receives every emitted epoch.
pub trait LatencyObserver: Send + Sync {
    /// Called under the registry lock, on the thread that ended the frame.
    fn on_results(&self, results: &LatencyStatisticsResults);
}

impl<F> LatencyObserver for F
where
    F: Fn(&LatencyStatisticsResults) + Send + Sync,
{
    fn on_results(&self, results: &LatencyStatisticsResults) {
        self(results);
    }
}

/// Handle returned by registration, used to remove an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn LatencyObserver>)>,
    subscribers: Vec<Sender<LatencyStatisticsResults>>,
}

/// Observers and subscribers of one aggregator.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: Mutex<Registry>,
}

impl ObserverRegistry {
    /// Registers `observer`.
    pub fn add(&self, observer: Arc<dyn LatencyObserver>) -> ObserverId {
        let mut inner = self.inner.lock();
        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        inner.observers.push((id, observer));
        id
    }

    /// Removes a previously registered observer. Returns false if unknown.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(existing, _)| *existing != id);
        inner.observers.len() != before
    }

    /// New bounded channel receiving every emitted epoch.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<LatencyStatisticsResults> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIPTION_CAPACITY);
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Number of registered observers plus live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.observers.len() + inner.subscribers.len()
    }

    /// True when nobody listens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify(&self, results: &LatencyStatisticsResults) {
        let mut inner = self.inner.lock();
        for (_, observer) in &inner.observers {
            observer.on_results(results);
        }
        inner.subscribers.retain(|tx| match tx.try_send(*results) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("latency subscriber lagging, dropping epoch");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ObserverRegistry")
            .field("observers", &inner.observers.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}
