//! Per-work-unit pause/resume state machine and timer registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use relay_core::QuotaSnapshot;

use crate::event::{ResumeEvent, ResumeEventKind};

/// Fallback wait when the quota source supplies no reset time
const DEFAULT_REARM_BACKOFF: Duration = Duration::from_secs(300);

/// Live quota check performed when a resume timer fires
#[async_trait]
pub trait QuotaProbe: Send + Sync {
    async fn check(&self) -> relay_core::Result<QuotaSnapshot>;
}

/// Scheduling state of one work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// No pause record; new pipeline runs are permitted
    Running,
    /// Paused for quota exhaustion, no timer armed yet
    Paused,
    /// Paused with a resume timer armed
    Armed,
    /// Timer fired; live quota state is being re-checked
    Resuming,
}

impl UnitState {
    /// Whether new pipeline runs are permitted in this state
    pub fn permits_run(&self) -> bool {
        matches!(self, Self::Running)
    }
}

struct Entry {
    state: UnitState,
    /// Stamped from the scheduler-wide clock on every arm; a firing timer
    /// with a stale generation has been replaced or cancelled and must do
    /// nothing. The clock outlives the entry, so a timer surviving a
    /// cancel can never match a later pause's generation.
    generation: u64,
    resume_at: DateTime<Utc>,
    reason: String,
}

/// Schedules quota-aware resumption of paused work units.
///
/// At most one timer is armed per unit; arming replaces any prior timer,
/// and a manual cancel defeats a pending timer even if both race on the
/// same instant.
#[derive(Clone)]
pub struct ResumeScheduler {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<AtomicU64>,
    probe: Arc<dyn QuotaProbe>,
    event_tx: mpsc::Sender<ResumeEvent>,
    rearm_backoff: Duration,
}

impl ResumeScheduler {
    /// Create a scheduler and the receiver for its notifications
    pub fn new(probe: Arc<dyn QuotaProbe>) -> (Self, mpsc::Receiver<ResumeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        (
            Self {
                entries: Arc::new(Mutex::new(HashMap::new())),
                clock: Arc::new(AtomicU64::new(0)),
                probe,
                event_tx,
                rearm_backoff: DEFAULT_REARM_BACKOFF,
            },
            event_rx,
        )
    }

    /// Override the fallback wait used when no reset time is supplied
    pub fn with_rearm_backoff(mut self, backoff: Duration) -> Self {
        self.rearm_backoff = backoff;
        self
    }

    /// Pause a unit for quota exhaustion and arm its resume timer.
    ///
    /// Uses the snapshot's reset time when present, otherwise the
    /// fallback backoff. Re-pausing an already paused unit replaces its
    /// timer.
    pub async fn pause(&self, unit_key: &str, reason: &str, snapshot: QuotaSnapshot) {
        let resume_at = snapshot.resets_at.unwrap_or_else(|| self.fallback_resume());
        let generation = self.next_generation();
        {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(unit_key.to_string()).or_insert_with(|| Entry {
                state: UnitState::Paused,
                generation,
                resume_at,
                reason: reason.to_string(),
            });
            entry.generation = generation;
            entry.state = UnitState::Armed;
            entry.resume_at = resume_at;
            entry.reason = reason.to_string();
        }

        info!(
            "Paused unit {} until {} ({})",
            unit_key, resume_at, reason
        );
        let _ = self
            .event_tx
            .send(ResumeEvent::new(
                unit_key,
                ResumeEventKind::Paused {
                    reason: reason.to_string(),
                    resume_at,
                },
            ))
            .await;
        self.spawn_timer(unit_key.to_string(), generation, resume_at);
    }

    /// Cancel a unit's pause unconditionally, without re-checking quota.
    ///
    /// Returns whether a pause record existed.
    pub async fn cancel(&self, unit_key: &str) -> bool {
        let existed = self.entries.lock().await.remove(unit_key).is_some();
        if existed {
            info!("Cancelled scheduled resume for unit {}", unit_key);
            let _ = self
                .event_tx
                .send(ResumeEvent::new(unit_key, ResumeEventKind::Cancelled))
                .await;
        }
        existed
    }

    /// Current state of a unit; `Running` when no pause record exists
    pub async fn state(&self, unit_key: &str) -> UnitState {
        self.entries
            .lock()
            .await
            .get(unit_key)
            .map(|e| e.state)
            .unwrap_or(UnitState::Running)
    }

    /// Whether new pipeline runs are permitted for a unit
    pub async fn permits_run(&self, unit_key: &str) -> bool {
        self.state(unit_key).await.permits_run()
    }

    /// The armed resume time for a unit, if it is paused
    pub async fn scheduled_resume(&self, unit_key: &str) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .await
            .get(unit_key)
            .map(|e| e.resume_at)
    }

    /// The recorded pause reason for a unit, if it is paused
    pub async fn pause_reason(&self, unit_key: &str) -> Option<String> {
        self.entries
            .lock()
            .await
            .get(unit_key)
            .map(|e| e.reason.clone())
    }

    /// Next value of the scheduler-wide monotonic generation clock
    fn next_generation(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn fallback_resume(&self) -> DateTime<Utc> {
        Utc::now()
            + chrono::Duration::from_std(self.rearm_backoff)
                .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }

    fn spawn_timer(&self, unit_key: String, generation: u64, resume_at: DateTime<Utc>) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let delay = (resume_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
            scheduler.fire(&unit_key, generation).await;
        });
    }

    /// Timer fired: re-check live quota, then resume or re-arm
    async fn fire(&self, unit_key: &str, generation: u64) {
        {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(unit_key) {
                Some(entry)
                    if entry.generation == generation && entry.state == UnitState::Armed =>
                {
                    entry.state = UnitState::Resuming;
                }
                _ => {
                    debug!("Timer for unit {} was replaced or cancelled", unit_key);
                    return;
                }
            }
        }

        // Probe outside the lock; a failed re-check is conservatively
        // treated as still exhausted
        let snapshot = match self.probe.check().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Quota re-check failed for unit {}, treating as still exhausted: {}",
                    unit_key, e
                );
                QuotaSnapshot::exhausted(None)
            }
        };

        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(unit_key) else {
            // Cancelled while the probe was in flight; cancel wins
            return;
        };
        if entry.generation != generation {
            return;
        }

        if snapshot.exhausted {
            let resume_at = snapshot.resets_at.unwrap_or_else(|| self.fallback_resume());
            let generation = self.next_generation();
            entry.generation = generation;
            entry.state = UnitState::Armed;
            entry.resume_at = resume_at;
            drop(entries);

            info!("Unit {} still exhausted, re-armed for {}", unit_key, resume_at);
            let _ = self
                .event_tx
                .send(ResumeEvent::new(
                    unit_key,
                    ResumeEventKind::ReArmed { resume_at },
                ))
                .await;
            self.spawn_timer(unit_key.to_string(), generation, resume_at);
        } else {
            entries.remove(unit_key);
            drop(entries);

            info!("Quota recovered, resuming unit {}", unit_key);
            let _ = self
                .event_tx
                .send(ResumeEvent::new(unit_key, ResumeEventKind::Resumed))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProbe(QuotaSnapshot);

    #[async_trait]
    impl QuotaProbe for StaticProbe {
        async fn check(&self) -> relay_core::Result<QuotaSnapshot> {
            Ok(self.0.clone())
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl QuotaProbe for FailingProbe {
        async fn check(&self) -> relay_core::Result<QuotaSnapshot> {
            Err(relay_core::Error::QuotaCheck("usage API offline".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_arms_and_blocks_runs() {
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::available())));
        let future = Utc::now() + chrono::Duration::hours(2);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(future)))
            .await;

        assert_eq!(scheduler.state("unit-1").await, UnitState::Armed);
        assert!(!scheduler.permits_run("unit-1").await);
        assert_eq!(scheduler.scheduled_resume("unit-1").await, Some(future));

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, ResumeEventKind::Paused { .. }));
        assert_eq!(event.unit_key, "unit-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_resume_time_with_recovered_quota_resumes() {
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::available())));
        let past = Utc::now() - chrono::Duration::minutes(1);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(past)))
            .await;

        let paused = rx.recv().await.unwrap();
        assert!(matches!(paused.kind, ResumeEventKind::Paused { .. }));
        let resumed = rx.recv().await.unwrap();
        assert_eq!(resumed.kind, ResumeEventKind::Resumed);
        assert_eq!(scheduler.state("unit-1").await, UnitState::Running);
        assert!(scheduler.permits_run("unit-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_exhausted_rearms_instead_of_resuming() {
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::exhausted(None))));
        let past = Utc::now() - chrono::Duration::minutes(1);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(past)))
            .await;

        let paused = rx.recv().await.unwrap();
        assert!(matches!(paused.kind, ResumeEventKind::Paused { .. }));
        let rearmed = rx.recv().await.unwrap();
        assert!(matches!(rearmed.kind, ResumeEventKind::ReArmed { .. }));
        assert_ne!(scheduler.state("unit-1").await, UnitState::Running);

        scheduler.cancel("unit-1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_is_treated_as_still_exhausted() {
        let (scheduler, mut rx) = ResumeScheduler::new(Arc::new(FailingProbe));
        let past = Utc::now() - chrono::Duration::minutes(1);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(past)))
            .await;

        let _paused = rx.recv().await.unwrap();
        let next = rx.recv().await.unwrap();
        assert!(matches!(next.kind, ResumeEventKind::ReArmed { .. }));

        scheduler.cancel("unit-1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_without_quota_check() {
        // Probe would keep the unit paused forever; cancel must not consult it
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::exhausted(None))));
        let future = Utc::now() + chrono::Duration::hours(5);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(future)))
            .await;

        assert!(scheduler.cancel("unit-1").await);
        assert_eq!(scheduler.state("unit-1").await, UnitState::Running);

        let _paused = rx.recv().await.unwrap();
        let cancelled = rx.recv().await.unwrap();
        assert_eq!(cancelled.kind, ResumeEventKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_defeats_pending_timer() {
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::available())));
        let past = Utc::now() - chrono::Duration::minutes(1);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(past)))
            .await;
        // Cancel before the spawned timer task gets a chance to run
        scheduler.cancel("unit-1").await;

        let _paused = rx.recv().await.unwrap();
        let cancelled = rx.recv().await.unwrap();
        assert_eq!(cancelled.kind, ResumeEventKind::Cancelled);

        // Let the defeated timer fire; it must not emit Resumed
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.state("unit-1").await, UnitState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_from_cancelled_pause_cannot_hijack_new_pause() {
        // A quota hijack here would resume the unit: the probe reports
        // recovered quota, so only generation staleness protects the
        // second pause from the first pause's leftover timer.
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::available())));
        let past = Utc::now() - chrono::Duration::minutes(1);
        let future = Utc::now() + chrono::Duration::hours(3);

        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(past)))
            .await;
        // Cancel before the first timer task runs, then pause again
        scheduler.cancel("unit-1").await;
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(future)))
            .await;

        let _paused = rx.recv().await.unwrap();
        let cancelled = rx.recv().await.unwrap();
        assert_eq!(cancelled.kind, ResumeEventKind::Cancelled);
        let _repaused = rx.recv().await.unwrap();

        // Let the leftover timer from the cancelled pause fire; it must
        // not resume the unit ahead of the new schedule
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.state("unit-1").await, UnitState::Armed);
        assert_eq!(scheduler.scheduled_resume("unit-1").await, Some(future));

        scheduler.cancel("unit-1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repause_replaces_prior_timer() {
        let (scheduler, mut rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::available())));
        let first = Utc::now() + chrono::Duration::hours(1);
        let second = Utc::now() + chrono::Duration::hours(3);
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(first)))
            .await;
        scheduler
            .pause("unit-1", "usage limit reached", QuotaSnapshot::exhausted(Some(second)))
            .await;

        assert_eq!(scheduler.scheduled_resume("unit-1").await, Some(second));
        let _paused = rx.recv().await.unwrap();
        let _repaused = rx.recv().await.unwrap();

        scheduler.cancel("unit-1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_units_are_independent() {
        let (scheduler, _rx) =
            ResumeScheduler::new(Arc::new(StaticProbe(QuotaSnapshot::available())));
        let future = Utc::now() + chrono::Duration::hours(1);
        scheduler
            .pause("unit-a", "usage limit reached", QuotaSnapshot::exhausted(Some(future)))
            .await;

        assert!(!scheduler.permits_run("unit-a").await);
        assert!(scheduler.permits_run("unit-b").await);
    }
}
