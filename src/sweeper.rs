use crate::clock;
use crate::events::{EventKind, EventLog};
use crate::token::{DeliveryStore, SessionStore};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Records removed by one sweep cycle
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SweepReport {
    pub sessions: usize,
    pub deliveries: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.sessions + self.deliveries
    }
}

/// Periodically purges expired records from both stores
#[derive(Clone, Debug)]
pub struct Sweeper {
    sessions: SessionStore,
    deliveries: DeliveryStore,
    events: EventLog,
}

impl Sweeper {
    pub fn new(sessions: SessionStore, deliveries: DeliveryStore, events: EventLog) -> Self {
        Self {
            sessions,
            deliveries,
            events,
        }
    }

    /// One cycle. Safe to race with lazy deletion in validators.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let report = SweepReport {
            sessions: self.sessions.sweep(now),
            deliveries: self.deliveries.sweep(now),
        };

        if report.total() > 0 {
            debug!(
                sessions = report.sessions,
                deliveries = report.deliveries,
                remaining_sessions = self.sessions.len(),
                remaining_deliveries = self.deliveries.len(),
                "Swept expired credentials"
            );
            self.events.record(
                EventKind::Swept,
                format!(
                    "sessions={} deliveries={}",
                    report.sessions, report.deliveries
                ),
            );
        }

        report
    }

    /// Start the background task. It runs until `shutdown` is cancelled; a
    /// failing cycle is logged and the next one runs as scheduled.
    pub fn start(self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "Expiry sweeper started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let this = self.clone();
                        let cycle = tokio::spawn(async move { this.sweep_at(clock::now()) });
                        if let Err(error) = cycle.await {
                            error!(?error, "Sweep cycle failed");
                        }
                    }
                }
            }

            info!("Expiry sweeper stopped");
        })
    }
}
