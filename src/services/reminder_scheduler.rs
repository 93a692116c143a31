//! Reminder scheduler.
//!
//! One polling loop per owning module. Each pass fetches every active
//! reminder that is due, delivers it and then re-arms (recurring) or deletes
//! (one-shot) the record. A failed delivery leaves the record untouched so
//! the next pass tries again. Stop and snooze are plain store updates; the
//! loop re-reads each record before delivering, so they take effect on the
//! next pass without any signalling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::domain::errors::{DeliveryError, DomainError, DomainResult};
use crate::domain::models::{ReminderNotice, ReminderRecord};
use crate::domain::ports::{ReminderDelivery, ReminderRepository};

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records returned by the due query.
    pub due: usize,
    pub delivered: usize,
    /// Recurring records moved to their next occurrence.
    pub rearmed: usize,
    /// One-shot records deleted after delivery.
    pub retired: usize,
    /// Deliveries that failed and will be retried.
    pub failed: usize,
    /// Records cancelled because their conversation no longer exists.
    pub orphaned: usize,
    /// Records stopped or snoozed between the fetch and delivery.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub running: bool,
    pub passes: u64,
    pub failed_passes: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub last_pass: Option<DateTime<Utc>>,
}

pub struct ReminderScheduler {
    repo: Arc<dyn ReminderRepository>,
    delivery: Arc<dyn ReminderDelivery>,
    poll_interval: Duration,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl ReminderScheduler {
    pub fn new(
        repo: Arc<dyn ReminderRepository>,
        delivery: Arc<dyn ReminderDelivery>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            repo,
            delivery,
            poll_interval,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one pass against the store as of `now`.
    ///
    /// Only a failure of the due query fails the pass; per-record problems
    /// are counted in the report.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> DomainResult<PassReport> {
        let due = self.repo.due(now).await?;
        let mut report = PassReport {
            due: due.len(),
            ..PassReport::default()
        };

        for fetched in due {
            let record = match self.repo.get(fetched.id).await {
                Ok(Some(record)) if record.is_due(now) && record.next_fire_at == fetched.next_fire_at => record,
                Ok(_) => {
                    report.skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(reminder_id = fetched.id, error = %err, "failed to re-read reminder");
                    report.failed += 1;
                    continue;
                }
            };

            self.fire(&record, now, &mut report).await;
        }

        Ok(report)
    }

    async fn fire(&self, record: &ReminderRecord, now: DateTime<Utc>, report: &mut PassReport) {
        let notice = ReminderNotice::from(record);

        match self.delivery.deliver_in_conversation(&notice).await {
            Ok(()) => {}
            Err(DeliveryError::ConversationGone(conversation_id)) => {
                tracing::info!(reminder_id = record.id, conversation_id, "conversation is gone, cancelling reminder");
                match self.repo.cancel(record.id).await {
                    Ok(_) => report.orphaned += 1,
                    Err(err) => {
                        tracing::warn!(reminder_id = record.id, error = %err, "failed to cancel orphaned reminder");
                        report.failed += 1;
                    }
                }
                return;
            }
            Err(err) => {
                tracing::warn!(
                    reminder_id = record.id,
                    conversation_id = record.conversation_id,
                    error = %err,
                    "reminder delivery failed, will retry next pass"
                );
                report.failed += 1;
                return;
            }
        }

        if record.target.includes_direct() {
            if let Err(err) = self.delivery.deliver_direct(&notice).await {
                tracing::warn!(
                    reminder_id = record.id,
                    recipient_id = record.creator_id,
                    error = %err,
                    "direct reminder notification failed"
                );
            }
        }

        report.delivered += 1;
        let next = record.next_occurrence(now);
        match self.repo.complete_occurrence(record, next).await {
            Ok(true) if next.is_some() => report.rearmed += 1,
            Ok(true) => report.retired += 1,
            Ok(false) => {
                tracing::debug!(reminder_id = record.id, "reminder changed during delivery, keeping new state");
                report.skipped += 1;
            }
            Err(err) => {
                // The occurrence stays due and will be delivered again.
                tracing::warn!(reminder_id = record.id, error = %err, "failed to record reminder delivery");
            }
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        let result = self.run_pass(now).await;

        let mut status = self.status.write().await;
        status.passes += 1;
        status.last_pass = Some(now);
        match result {
            Ok(report) => {
                status.delivered += report.delivered as u64;
                status.delivery_failures += report.failed as u64;
                if report.due > 0 {
                    tracing::debug!(
                        due = report.due,
                        delivered = report.delivered,
                        failed = report.failed,
                        "reminder pass completed"
                    );
                }
            }
            Err(err) => {
                status.failed_passes += 1;
                tracing::error!(error = %err, "reminder pass failed");
            }
        }
    }

    /// Spawn the polling loop. The first pass runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = self.status.clone();
        let task = tokio::spawn(self.run_loop(shutdown_rx));
        SchedulerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
            status,
        }
    }

    async fn run_loop(self, mut shutdown: watch::Receiver<bool>) {
        self.status.write().await.running = true;
        tracing::info!(poll_interval_secs = self.poll_interval.as_secs_f64(), "reminder scheduler started");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }

        self.status.write().await.running = false;
        tracing::info!("reminder scheduler stopped");
    }
}

/// Owner's handle on a running scheduler loop.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) aborts
/// the loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SchedulerHandle {
    /// Signal the loop and wait until it has exited. A pass in progress
    /// finishes first.
    pub async fn shutdown(mut self) -> DomainResult<()> {
        let _ = self.shutdown.send(true);
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| DomainError::HostUnavailable(format!("reminder scheduler task failed: {e}"))),
            None => Ok(()),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
