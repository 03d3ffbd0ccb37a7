//! Cron timer loop: sleeps until the earliest due job, fires it, repeats.

use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

use {
    chrono::{DateTime, Local},
    tokio::{sync::Mutex, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, instrument::WithSubscriber, warn},
};

use crate::{Error, Result, schedule::CronSchedule};

/// Callback run on every tick of a job's schedule.
pub type JobFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

/// Poll interval when no job has a future tick.
const IDLE_WAKE: Duration = Duration::from_secs(60);

/// A named schedule bound to its action.
#[derive(Clone)]
pub struct CronJob {
    pub name: String,
    pub schedule: CronSchedule,
    pub action: JobFn,
}

impl CronJob {
    pub fn new(name: impl Into<String>, expr: &str, action: JobFn) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            schedule: CronSchedule::parse(expr)?,
            action,
        })
    }
}

impl fmt::Debug for CronJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronJob")
            .field("name", &self.name)
            .field("schedule", &self.schedule.expr())
            .finish_non_exhaustive()
    }
}

/// The job scheduler. The job list is fixed at construction.
pub struct CronService {
    jobs: Vec<CronJob>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl CronService {
    pub fn new(jobs: Vec<CronJob>) -> Arc<Self> {
        Arc::new(Self {
            jobs,
            timer_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Spawn the timer loop. The loop inherits the caller's tracing
    /// subscriber, as does every job firing.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut handle = self.timer_handle.lock().await;
        if handle.is_some() || self.cancel.is_cancelled() {
            return Err(Error::AlreadyRunning);
        }

        let svc = Arc::clone(self);
        *handle = Some(tokio::spawn(
            async move {
                svc.timer_loop().await;
            }
            .with_current_subscriber(),
        ));
        info!(count = self.jobs.len(), "job scheduler started");
        Ok(())
    }

    /// Stop the timer loop and wait for it to exit.
    ///
    /// Firings already in progress keep running to completion.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.timer_handle.lock().await.take();
        if let Some(h) = handle
            && let Err(e) = h.await
        {
            warn!(error = %e, "job scheduler loop ended abnormally");
        }
        info!("job scheduler stopped");
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn timer_loop(&self) {
        let now = Local::now();
        let mut next_runs: Vec<Option<DateTime<Local>>> = self
            .jobs
            .iter()
            .map(|job| job.schedule.next_after(&now))
            .collect();

        loop {
            let sleep_for = next_runs
                .iter()
                .flatten()
                .min()
                .map(|next| (*next - Local::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(IDLE_WAKE);

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(sleep_for) => {},
            }

            let now = Local::now();
            for (job, next) in self.jobs.iter().zip(next_runs.iter_mut()) {
                if next.is_some_and(|t| t <= now) {
                    self.fire(job);
                    *next = job.schedule.next_after(&now);
                }
            }
        }
    }

    fn fire(&self, job: &CronJob) {
        debug!(job = %job.name, schedule = %job.schedule, "firing scheduled job");
        let name = job.name.clone();
        let fut = (job.action)();
        tokio::spawn(
            async move {
                if let Err(e) = fut.await {
                    warn!(job = %name, error = %e, "scheduled job failed");
                }
            }
            .with_current_subscriber(),
        );
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_job(expr: &str, counter: Arc<AtomicUsize>, hold: Duration) -> CronJob {
        let action: JobFn = Arc::new(move || {
            let c = Arc::clone(&counter);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                Ok(())
            })
        });
        CronJob::new("counter", expr, action).unwrap()
    }

    #[test]
    fn job_rejects_bad_schedule() {
        let action: JobFn = Arc::new(|| Box::pin(async { Ok(()) }));
        assert!(CronJob::new("bad", "0 9 * * *", action).is_err());
    }

    #[tokio::test]
    async fn fires_every_second_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let svc = CronService::new(vec![counting_job(
            "* * * * * *",
            counter.clone(),
            Duration::ZERO,
        )]);

        svc.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        svc.stop().await;

        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 1, "expected at least one firing, got {fired}");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);
    }

    #[tokio::test]
    async fn slow_firings_overlap() {
        let counter = Arc::new(AtomicUsize::new(0));
        let svc = CronService::new(vec![counting_job(
            "* * * * * *",
            counter.clone(),
            Duration::from_secs(10),
        )]);

        svc.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        svc.stop().await;

        // Each firing holds for 10s, so a second start proves no serialization.
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failing_job_keeps_scheduler_alive() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let action: JobFn = Arc::new(move || {
            let c = Arc::clone(&c);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            })
        });
        let svc = CronService::new(vec![CronJob::new("failing", "* * * * * *", action).unwrap()]);

        svc.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        svc.stop().await;

        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let svc = CronService::new(Vec::new());
        svc.start().await.unwrap();
        assert!(matches!(svc.start().await, Err(Error::AlreadyRunning)));
        svc.stop().await;
        assert!(matches!(svc.start().await, Err(Error::AlreadyRunning)));
    }
}
