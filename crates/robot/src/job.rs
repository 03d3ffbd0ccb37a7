use std::{fmt, future::Future, sync::Arc};

use {
    courier_cron::{CronJob, CronSchedule, JobFn},
    futures::future::BoxFuture,
};

use crate::{Result, robot::Robot};

pub type JobAction = Arc<dyn Fn(Arc<Robot>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A scheduled task with access to the robot, so it can send messages.
#[derive(Clone)]
pub struct Job {
    pub name: String,
    pub schedule: CronSchedule,
    pub action: JobAction,
}

impl Job {
    /// `schedule` is a six-field expression (seconds first); it is parsed
    /// here so a bad one fails at registration.
    pub fn new<F, Fut>(name: impl Into<String>, schedule: &str, action: F) -> Result<Self>
    where
        F: Fn(Arc<Robot>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Ok(Self {
            name: name.into(),
            schedule: CronSchedule::parse(schedule)?,
            action: Arc::new(move |robot| {
                Box::pin(action(robot)) as BoxFuture<'static, anyhow::Result<()>>
            }),
        })
    }

    /// Bind this job to `robot` for the scheduler.
    pub(crate) fn bind(&self, robot: &Arc<Robot>) -> CronJob {
        let action = Arc::clone(&self.action);
        let robot = Arc::clone(robot);
        let run: JobFn = Arc::new(move || action(Arc::clone(&robot)));
        CronJob {
            name: self.name.clone(),
            schedule: self.schedule.clone(),
            action: run,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("schedule", &self.schedule.expr())
            .finish_non_exhaustive()
    }
}
