//! Position samples and the location feed boundary.
//!
//! The crate never talks to a positioning system itself. A host adapts its
//! platform feed to [`LocationSource`]; [`ManualLocationSource`] covers
//! embedding, replay and tests.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::LatLng;

/// One timestamped position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Reported position.
    pub position: LatLng,
    /// Time of the fix.
    pub timestamp: DateTime<Utc>,
    /// Horizontal accuracy in meters, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl PositionSample {
    /// Creates a sample without accuracy information.
    #[must_use]
    pub const fn new(position: LatLng, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            timestamp,
            accuracy_m: None,
        }
    }

    /// Creates a sample stamped with the current time.
    #[must_use]
    pub fn now(lat: f64, lng: f64) -> Self {
        Self::new(LatLng::new(lat, lng), Utc::now())
    }

    /// Sets the reported accuracy.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

/// Callback that receives samples from a [`LocationSource`].
pub type SampleSink = Arc<dyn Fn(PositionSample) + Send + Sync>;

/// A feed of position samples.
pub trait LocationSource: Send + Sync {
    /// Starts delivering samples to `sink` until the subscription is dropped
    /// or unsubscribed.
    fn subscribe(&self, sink: SampleSink) -> Box<dyn LocationSubscription>;
}

/// Handle returned by [`LocationSource::subscribe`].
pub trait LocationSubscription: Send {
    /// Stops delivery. Must be idempotent.
    fn unsubscribe(&mut self);
}

type SinkMap = RwLock<HashMap<Uuid, SampleSink>>;

/// In-process location feed driven by explicit [`ManualLocationSource::push`] calls.
///
/// Delivery is synchronous on the pushing thread. The order among
/// subscribers is unspecified.
#[derive(Clone, Default)]
pub struct ManualLocationSource {
    sinks: Arc<SinkMap>,
}

impl std::fmt::Debug for ManualLocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualLocationSource")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ManualLocationSource {
    /// Creates a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `sample` to every current subscriber.
    pub fn push(&self, sample: PositionSample) {
        let sinks: Vec<SampleSink> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for sink in sinks {
            sink(sample.clone());
        }
    }

    /// Shorthand for pushing a position at `timestamp`.
    pub fn push_at(&self, lat: f64, lng: f64, timestamp: DateTime<Utc>) {
        self.push(PositionSample::new(LatLng::new(lat, lng), timestamp));
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl LocationSource for ManualLocationSource {
    fn subscribe(&self, sink: SampleSink) -> Box<dyn LocationSubscription> {
        let id = Uuid::new_v4();
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sink);
        Box::new(ManualSubscription {
            id,
            sinks: Arc::downgrade(&self.sinks),
        })
    }
}

struct ManualSubscription {
    id: Uuid,
    sinks: Weak<SinkMap>,
}

impl LocationSubscription for ManualSubscription {
    fn unsubscribe(&mut self) {
        if let Some(sinks) = self.sinks.upgrade() {
            sinks.write().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
        }
    }
}

impl Drop for ManualSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_push_reaches_subscribers_until_unsubscribed() {
        let feed = ManualLocationSource::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let mut sub = feed.subscribe(Arc::new(move |s: PositionSample| seen2.lock().unwrap().push(s.position)));

        feed.push(PositionSample::now(1.0, 2.0));
        sub.unsubscribe();
        sub.unsubscribe();
        feed.push(PositionSample::now(3.0, 4.0));

        assert_eq!(*seen.lock().unwrap(), vec![LatLng::new(1.0, 2.0)]);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let feed = ManualLocationSource::new();
        let sub = feed.subscribe(Arc::new(|_: PositionSample| {}));
        assert_eq!(feed.subscriber_count(), 1);
        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_sample_serde_omits_missing_accuracy() {
        let sample = PositionSample::now(10.0, 20.0);
        let json = serde_json::to_value(&sample).unwrap();
        assert!(json.get("accuracy_m").is_none());
        let with = sample.with_accuracy(12.5);
        let back: PositionSample = serde_json::from_value(serde_json::to_value(&with).unwrap()).unwrap();
        assert_eq!(back.accuracy_m, Some(12.5));
    }
}
