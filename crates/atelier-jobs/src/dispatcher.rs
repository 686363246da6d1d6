//! Periodic trigger for workers.
//!
//! The in-process poll loop and the HTTP tick endpoint both end up in
//! [`Dispatcher::tick`]. The dispatcher keeps no queue state: a tick is a
//! number of concurrent drains against the store, nothing more.

use crate::metrics as job_metrics;
use crate::worker::{DrainReport, Worker};
use atelier_config::{DispatcherConfig, ReaperConfig};
use atelier_core::{AtelierError, AtelierResult};
use atelier_repository::JobStore;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub interval: Duration,
    /// Concurrent drains per tick.
    pub concurrency: usize,
    /// Stale job reaping, when enabled.
    pub reaper: Option<ReaperSettings>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReaperSettings {
    pub lease_timeout: Duration,
    pub interval: Duration,
}

impl DispatcherSettings {
    #[must_use]
    pub fn from_config(dispatcher: &DispatcherConfig, reaper: &ReaperConfig) -> Self {
        Self {
            interval: dispatcher.interval(),
            concurrency: dispatcher.concurrency.max(1),
            reaper: reaper.enabled.then(|| ReaperSettings {
                lease_timeout: reaper.lease_timeout(),
                interval: reaper.interval(),
            }),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&DispatcherConfig::default(), &ReaperConfig::default())
    }
}

pub struct Dispatcher {
    worker: Worker,
    jobs: Arc<dyn JobStore>,
    settings: DispatcherSettings,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(worker: Worker, jobs: Arc<dyn JobStore>, settings: DispatcherSettings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            worker,
            jobs,
            settings,
            shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Runs `concurrency` drains side by side and sums their reports.
    pub async fn tick(&self) -> DrainReport {
        let batch_size = self.worker.settings().batch_size;
        let reports = join_all((0..self.settings.concurrency).map(|_| self.worker.drain(batch_size))).await;

        let mut total = DrainReport::default();
        for report in &reports {
            total.merge(report);
        }
        job_metrics::record_dispatcher_tick(total.processed);
        if total.processed > 0 {
            info!(
                processed = total.processed,
                completed = total.completed,
                retried = total.retried,
                failed = total.failed,
                "Dispatcher tick"
            );
        }
        total
    }

    /// Requeues jobs whose lease expired. No-op when the reaper is disabled.
    pub async fn reap(&self) -> AtelierResult<u64> {
        let Some(reaper) = self.settings.reaper else {
            return Ok(0);
        };
        let touched = self.jobs.requeue_stale(reaper.lease_timeout).await?;
        if touched > 0 {
            warn!(touched, "Reclaimed jobs with expired processing lease");
            job_metrics::record_requeued_stale(touched);
        }
        Ok(touched)
    }

    /// Polls until [`Dispatcher::stop`] is called.
    pub async fn run(&self) -> AtelierResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AtelierError::conflict("dispatcher already running"));
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            interval_secs = self.settings.interval.as_secs(),
            concurrency = self.settings.concurrency,
            reaper = self.settings.reaper.is_some(),
            "Starting dispatcher"
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reaper_ticker: Option<Interval> = self.settings.reaper.map(|r| {
            let mut i = interval(r.interval);
            i.set_missed_tick_behavior(MissedTickBehavior::Skip);
            i
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                    if let Ok(stats) = self.jobs.count_by_status().await {
                        job_metrics::update_queue_depth(&stats);
                    }
                }
                () = next_reap(&mut reaper_ticker) => {
                    if let Err(e) = self.reap().await {
                        error!(error = %e, "Reaper pass failed");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Dispatcher stopped");
        Ok(())
    }

    pub fn stop(&self) {
        debug!("Stopping dispatcher");
        let _ = self.shutdown_tx.send(());
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn next_reap(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
