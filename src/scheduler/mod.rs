pub mod tasks;

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Background jobs on cron schedules (six fields, seconds first)
pub struct Scheduler {
    jobs: JobScheduler,
    names: Vec<String>,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let jobs = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            jobs,
            names: Vec::new(),
        })
    }

    /// Run `job` on every tick of `schedule`.
    pub async fn every<F>(&mut self, schedule: &str, name: &str, job: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let label = name.to_string();
        let cron = Job::new_async(schedule, move |_id, _scheduler| {
            debug!("Job {} fired", label);
            job()
        })
        .with_context(|| format!("Invalid schedule for job {}: {}", name, schedule))?;

        self.jobs
            .add(cron)
            .await
            .with_context(|| format!("Failed to add job {}", name))?;
        self.names.push(name.to_string());
        info!("Job {} scheduled: {}", name, schedule);
        Ok(())
    }

    #[cfg(test)]
    pub fn job_names(&self) -> &[String] {
        &self.names
    }

    pub async fn start(&self) -> Result<()> {
        self.jobs.start().await.context("Failed to start scheduler")?;
        info!("Scheduler started with {} job(s)", self.names.len());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.jobs
            .shutdown()
            .await
            .context("Failed to stop scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
