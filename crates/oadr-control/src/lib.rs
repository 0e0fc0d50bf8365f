//! The Event Controller: the control loop that derives the
//! currently-in-force signal level from the store's active events and
//! fires a change notification when that level moves.

mod descriptor;
mod error;

pub use error::ControlError;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use oadr_model::{EventKey, VenIdentity};
use oadr_schedule::IntervalChoice;
use oadr_store::EventStore;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

/// Default control-loop tick interval.
pub const DEFAULT_CONTROL_LOOP_INTERVAL: Duration = Duration::from_secs(30);

/// Called whenever the in-force signal level changes. Must not panic -
/// a panic inside the callback is caught and logged, never allowed to
/// bring down the control loop.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn signal_changed(&self, old: f64, new: f64);
}

/// Logs the transition; the default used when no sink is configured.
pub struct LoggingSignalSink;

#[async_trait]
impl SignalSink for LoggingSignalSink {
    async fn signal_changed(&self, old: f64, new: f64) {
        tracing::info!(old_level = old, new_level = new, "signal level changed");
    }
}

struct CurrentSignal {
    level: f64,
    event: Option<EventKey>,
}

pub struct EventController<S: EventStore> {
    identity: Arc<VenIdentity>,
    store: Arc<S>,
    current: RwLock<CurrentSignal>,
    wake: Notify,
    shutdown: AtomicBool,
    sink: Arc<dyn SignalSink>,
    interval: Duration,
}

impl<S: EventStore + 'static> EventController<S> {
    pub fn new(identity: Arc<VenIdentity>, store: Arc<S>, sink: Arc<dyn SignalSink>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            identity,
            store,
            current: RwLock::new(CurrentSignal { level: 0.0, event: None }),
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
            sink,
            interval,
        })
    }

    /// Wake the control loop ahead of its next tick. Idempotent - the
    /// underlying `Notify` coalesces redundant wakeups.
    pub fn signal_updated(&self) {
        self.wake.notify_one();
    }

    pub async fn current_signal(&self) -> (f64, Option<EventKey>) {
        let current = self.current.read().await;
        (current.level, current.event.clone())
    }

    /// Cooperative shutdown: flips the flag, wakes the loop, and the
    /// caller is expected to `await` the returned handle with a bounded
    /// timeout.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Starts the tokio task driving the control loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while !self.shutdown.load(Ordering::SeqCst) {
                let result = AssertUnwindSafe(self.tick()).catch_unwind().await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::error!(error = %err, "control loop tick failed"),
                    Err(_) => tracing::error!("control loop tick panicked"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = self.wake.notified() => {}
                }
            }
            tracing::info!("control loop exiting");
        })
    }

    /// One pass: evaluate every active event, pick the maximum
    /// contributed signal level, remove anything that has ended, and
    /// notify the sink if the in-force level moved.
    async fn tick(&self) -> Result<(), ControlError> {
        let events = self.store.get_active_events().await?;

        let mut highest = 0.0f64;
        let mut winner: Option<EventKey> = None;
        let mut expired = Vec::new();

        for stored in events {
            match self.evaluate(&stored.raw_xml) {
                Ok(Some((level, uid))) => {
                    tracing::debug!(
                        event_id = %stored.key.event_id,
                        interval_uid = uid.as_deref().unwrap_or(""),
                        signal_level = level,
                        "control loop: event contributes signal"
                    );
                    if level > highest {
                        highest = level;
                        winner = Some(stored.key.clone());
                    }
                }
                Ok(None) => {}
                Err(Expired) => {
                    tracing::debug!(event_id = %stored.key.event_id, "event has ended");
                    expired.push(stored.key);
                }
            }
        }

        if !expired.is_empty() {
            self.store.remove(&expired).await?;
        }

        let changed = {
            let current = self.current.read().await;
            current.level != highest
        };
        if changed {
            let old = {
                let mut current = self.current.write().await;
                let old = current.level;
                current.level = highest;
                current.event = winner;
                old
            };
            let sink = self.sink.clone();
            if AssertUnwindSafe(sink.signal_changed(old, highest)).catch_unwind().await.is_err() {
                tracing::error!("signal_changed callback panicked");
            }
        }

        Ok(())
    }

    /// Evaluates one stored event: `Ok(Some((level, uid)))` when it is
    /// active and contributes a signal, `Ok(None)` when it should be
    /// ignored (not yet started, no target match, no usable signal),
    /// `Err(Expired)` when every interval has elapsed and it should be
    /// removed. Per-event parse failures are logged and treated the same
    /// as "ignore" - one malformed event never fails the whole tick.
    fn evaluate(&self, raw_xml: &[u8]) -> Result<Option<(f64, Option<String>)>, Expired> {
        let doc = match oadr_xml::OadrDocument::parse(raw_xml.to_vec(), oadr_xml::Profile::TwoZeroA) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, "error parsing stored event xml");
                return Ok(None);
            }
        };

        let descriptor = match descriptor::extract(&doc) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(error = %err, "error parsing event descriptor");
                return Ok(None);
            }
        };

        if descriptor.targets.is_specified()
            && !descriptor.targets.matches(
                self.identity.party_id.as_deref(),
                self.identity.group_id.as_deref(),
                self.identity.resource_id.as_deref(),
                &self.identity.ven_id,
            )
        {
            tracing::debug!(event_id = %descriptor.event_id, "ignoring event - targeted at a different ven");
            return Ok(None);
        }

        let Some(signal) = descriptor.simple_signal() else {
            tracing::debug!(event_id = %descriptor.event_id, "ignoring event - no valid signals");
            return Ok(None);
        };

        let durations: Vec<_> = signal.intervals.iter().map(|i| i.duration).collect();
        let now = chrono::Utc::now();
        match oadr_schedule::choose_interval(descriptor.active_period_start, &durations, now) {
            IntervalChoice::Ended => Err(Expired),
            IntervalChoice::NotStarted => {
                tracing::debug!(event_id = %descriptor.event_id, "event has not started yet");
                Ok(None)
            }
            IntervalChoice::Active(i) => {
                let interval = &signal.intervals[i];
                let level = interval.value.as_deref().and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
                Ok(Some((level, interval.uid.clone())))
            }
        }
    }
}

/// Internal-only marker distinguishing "ended, remove it" from the other
/// `Ok(None)` outcomes inside `evaluate` without threading a third enum
/// variant through every caller.
struct Expired;
