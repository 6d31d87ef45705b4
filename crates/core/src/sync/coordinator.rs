//! Drain coordinator: delivers outbox entries when online, one pass at a time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::connectivity::ConnectivityMonitor;
use super::model::{
    DrainOutcome, DrainReport, DrainSkipReason, SyncCycleTrigger, SyncEvent, SyncStatus,
};
use super::outbox::SyncOutbox;
use super::retry::{backoff_with_jitter, SyncRetryClass};
use super::scheduler::{SyncConfig, BACKGROUND_SYNC_TAG, SYNC_EVENT_CHANNEL_CAPACITY};
use super::transport::{BackgroundSyncHook, SyncTransport};
use crate::errors::{Error, Result};

/// Clears the in-progress flag when a pass ends, including on early return.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CoordinatorTasks {
    background: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

pub struct SyncCoordinator {
    outbox: Arc<SyncOutbox>,
    connectivity: Arc<ConnectivityMonitor>,
    transport: Arc<dyn SyncTransport>,
    config: SyncConfig,
    background_hook: Option<Arc<dyn BackgroundSyncHook>>,
    drain_in_progress: AtomicBool,
    // Bumped whenever a retry is scheduled or cancelled; stale timers no-op.
    retry_generation: AtomicU64,
    status: Mutex<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
    tasks: Mutex<CoordinatorTasks>,
}

impl SyncCoordinator {
    pub fn new(
        outbox: Arc<SyncOutbox>,
        connectivity: Arc<ConnectivityMonitor>,
        transport: Arc<dyn SyncTransport>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(SYNC_EVENT_CHANNEL_CAPACITY);
        Self {
            outbox,
            connectivity,
            transport,
            config,
            background_hook: None,
            drain_in_progress: AtomicBool::new(false),
            retry_generation: AtomicU64::new(0),
            status: Mutex::new(SyncStatus::default()),
            events,
            tasks: Mutex::new(CoordinatorTasks::default()),
        }
    }

    pub fn with_background_hook(mut self, hook: Arc<dyn BackgroundSyncHook>) -> Self {
        self.background_hook = Some(hook);
        self
    }

    pub fn outbox(&self) -> Arc<SyncOutbox> {
        Arc::clone(&self.outbox)
    }

    pub fn connectivity(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.connectivity)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.drain_in_progress.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = self
            .status
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        status.draining = self.is_draining();
        status
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn update_status(&self, apply: impl FnOnce(&mut SyncStatus)) {
        if let Ok(mut status) = self.status.lock() {
            apply(&mut status);
        }
    }

    /// Single guarded entry point for every trigger. Overlapping calls
    /// collapse into the pass already running.
    pub async fn drain(self: &Arc<Self>, trigger: SyncCycleTrigger) -> Result<DrainOutcome> {
        if !self.connectivity.is_online() {
            debug!("[QuizSync] Drain ({:?}) skipped: offline", trigger);
            return Ok(DrainOutcome::Skipped {
                reason: DrainSkipReason::Offline,
            });
        }
        if self
            .drain_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[QuizSync] Drain ({:?}) coalesced into running pass", trigger);
            return Ok(DrainOutcome::Skipped {
                reason: DrainSkipReason::AlreadyDraining,
            });
        }
        let _guard = DrainGuard(&self.drain_in_progress);

        self.emit(SyncEvent::DrainStarted { trigger });
        match self.run_pass(trigger).await {
            Ok(report) => {
                self.finish_pass(&report);
                self.emit(SyncEvent::DrainCompleted {
                    report: report.clone(),
                });
                Ok(DrainOutcome::Completed(report))
            }
            Err(err) => {
                warn!("[QuizSync] Drain ({:?}) aborted: {}", trigger, err);
                self.update_status(|status| {
                    status.last_drain_at = Some(Utc::now());
                    status.last_outcome = Some("error".to_string());
                    status.last_error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }

    async fn run_pass(&self, trigger: SyncCycleTrigger) -> Result<DrainReport> {
        let started_at = Instant::now();
        let pending = self.outbox.peek_all().await?;
        let mut report = DrainReport::new(trigger);
        // Tokens the server refused during this pass. Their entries stay queued
        // and the rest of the snapshot keeps moving.
        let mut rejected_tokens: HashSet<String> = HashSet::new();
        debug!(
            "[QuizSync] Drain ({:?}) started with {} pending entries",
            trigger,
            pending.len()
        );

        for mutation in pending {
            if !self.connectivity.is_online() {
                report.interrupted = true;
                break;
            }
            if rejected_tokens.contains(&mutation.auth_snapshot) {
                report.auth_deferred += 1;
                continue;
            }
            report.attempted += 1;

            match self.transport.deliver(&mutation).await {
                Ok(()) => {
                    self.outbox.acknowledge(&mutation).await?;
                    report.delivered += 1;
                    debug!(
                        "[QuizSync] Delivered {} id={}",
                        mutation.kind.as_str(),
                        mutation.id
                    );
                }
                Err(err) => match err.retry_class {
                    SyncRetryClass::Retryable => {
                        self.outbox.record_failure(&mutation, &err).await?;
                        report.retryable_failures += 1;
                        warn!(
                            "[QuizSync] Retryable failure for id={} (attempt {}): {}",
                            mutation.id,
                            mutation.attempts + 1,
                            err
                        );
                    }
                    SyncRetryClass::Permanent => {
                        self.outbox.record_failure(&mutation, &err).await?;
                        report.permanent_failures += 1;
                        warn!(
                            "[QuizSync] Entry id={} rejected and kept for manual review: {}",
                            mutation.id, err
                        );
                    }
                    SyncRetryClass::ReauthRequired => {
                        self.outbox.record_auth_rejection(&mutation, &err).await?;
                        report.auth_blocked = true;
                        report.auth_deferred += 1;
                        rejected_tokens.insert(mutation.auth_snapshot.clone());
                        warn!(
                            "[QuizSync] Auth rejected for id={}; deferring entries queued under that session",
                            mutation.id
                        );
                        self.emit(SyncEvent::AuthRequired {
                            mutation_id: mutation.id,
                        });
                    }
                },
            }
        }

        report.remaining = self.outbox.len().await?;
        report.duration_ms = started_at.elapsed().as_millis() as i64;
        Ok(report)
    }

    fn finish_pass(self: &Arc<Self>, report: &DrainReport) {
        info!(
            "[QuizSync] Drain ({:?}) {} delivered={} retryable={} permanent={} remaining={} in {}ms",
            report.trigger,
            report.status(),
            report.delivered,
            report.retryable_failures,
            report.permanent_failures,
            report.remaining,
            report.duration_ms
        );

        let mut retry_delay = None;
        self.update_status(|status| {
            status.last_drain_at = Some(Utc::now());
            status.last_outcome = Some(report.status().to_string());
            status.auth_required = report.auth_blocked;
            status.last_error = report
                .auth_blocked
                .then(|| "Authentication required".to_string());

            if report.retryable_failures > 0 {
                let delay = backoff_with_jitter(
                    status.consecutive_failures,
                    self.config.backoff_base_secs,
                    self.config.backoff_max_exponent,
                );
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                status.next_retry_at = chrono::Duration::from_std(delay)
                    .ok()
                    .map(|delay| Utc::now() + delay);
                retry_delay = Some(delay);
            } else {
                status.consecutive_failures = 0;
                status.next_retry_at = None;
            }
        });

        match retry_delay {
            Some(delay) => self.schedule_retry(delay),
            None => {
                self.retry_generation.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration) {
        let generation = self.retry_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if coordinator.retry_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            // Detached so that aborting the timer never cancels a pass mid-call.
            coordinator.request_drain(SyncCycleTrigger::Retry);
        });
        if let Ok(mut tasks) = self.tasks.lock() {
            // A superseded timer wakes up, sees a newer generation and exits.
            tasks.retry = Some(handle);
        }
        debug!("[QuizSync] Retry scheduled in {}ms", delay.as_millis());
        self.emit(SyncEvent::RetryScheduled {
            delay_ms: delay.as_millis() as u64,
        });
    }

    /// Runs a drain in the background; failures are logged, never returned.
    pub fn request_drain(self: &Arc<Self>, trigger: SyncCycleTrigger) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = coordinator.drain(trigger).await {
                warn!("[QuizSync] Background drain ({:?}) failed: {}", trigger, err);
            }
        });
    }

    /// User-initiated "sync now". Unlike background triggers, problems are
    /// returned to the caller.
    pub async fn sync_now(self: &Arc<Self>) -> Result<DrainOutcome> {
        let outcome = self.drain(SyncCycleTrigger::Manual).await?;
        match &outcome {
            DrainOutcome::Skipped {
                reason: DrainSkipReason::Offline,
            } => Err(Error::Offline),
            DrainOutcome::Completed(report) if report.auth_blocked => Err(Error::AuthRequired(
                "The saved session was rejected. Sign in again to finish syncing.".to_string(),
            )),
            _ => Ok(outcome),
        }
    }

    /// Best-effort registration with the platform background-sync hook.
    pub fn notify_enqueued(&self) {
        let Some(hook) = &self.background_hook else {
            return;
        };
        if !hook.is_supported() {
            return;
        }
        if let Err(err) = hook.register(BACKGROUND_SYNC_TAG) {
            debug!("[QuizSync] Background sync registration failed: {}", err);
        }
    }

    /// Spawns the loop that drains on the safety-net timer and on every
    /// offline→online transition. Idempotent while the loop is alive.
    pub fn start(self: &Arc<Self>) {
        let Ok(mut tasks) = self.tasks.lock() else {
            warn!("[QuizSync] Coordinator task registry is poisoned");
            return;
        };
        if let Some(handle) = tasks.background.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        let coordinator = Arc::clone(self);
        let mut connectivity_rx = self.connectivity.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately and doubles as the startup drain.
            ticker.tick().await;
            coordinator.connectivity.refresh().await;
            coordinator.request_drain(SyncCycleTrigger::Startup);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.connectivity.refresh().await;
                        coordinator.request_drain(SyncCycleTrigger::Periodic);
                    }
                    changed = connectivity_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = connectivity_rx.borrow_and_update().online;
                        if online {
                            coordinator.request_drain(SyncCycleTrigger::ConnectivityRestored);
                        }
                    }
                }
            }
        });
        tasks.background = Some(handle);
        info!(
            "[QuizSync] Background sync started (poll every {}s)",
            self.config.poll_interval.as_secs()
        );
    }

    /// Stops the background loop and cancels a pending retry. A pass already
    /// in flight runs to the end of its snapshot.
    pub fn stop(&self) {
        self.retry_generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(handle) = tasks.background.take() {
                handle.abort();
            }
            if let Some(handle) = tasks.retry.take() {
                handle.abort();
            }
        }
        info!("[QuizSync] Background sync stopped");
    }
}
