//! Background trigger for periodic full rebuilds

use crate::error::{SuggesterError, SuggesterResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

/// Callback fired on every tick; receives the name of the schedule that fired
pub type RebuildTrigger = Arc<dyn Fn(&'static str) + Send + Sync>;

/// Periodic timer plus an optional cron schedule, both firing the same trigger
///
/// The trigger only submits work; the rebuilds themselves run on the
/// engine's build pool, so a slow rebuild never delays the next tick.
/// Stopping is permanent.
pub struct RebuildScheduler {
    shutdown: watch::Sender<bool>,
    ticker: Option<JoinHandle<()>>,
    cron: Option<JobScheduler>,
}

impl RebuildScheduler {
    /// Start firing `trigger` every `interval`, and on `cron` if given
    ///
    /// The first interval tick happens one full interval after start.
    pub async fn start(
        interval: Duration,
        cron: Option<&str>,
        trigger: RebuildTrigger,
    ) -> SuggesterResult<Self> {
        let (shutdown, mut stopped) = watch::channel(false);

        let cron = match cron {
            Some(expression) => Some(start_cron(expression, trigger.clone()).await?),
            None => None,
        };

        let tick_trigger = trigger;
        let ticker = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        debug!("Rebuild interval elapsed");
                        tick_trigger("interval");
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            cron = cron.is_some(),
            "Rebuild scheduler started"
        );

        Ok(Self {
            shutdown,
            ticker: Some(ticker),
            cron,
        })
    }

    /// Stop both schedules and wait for the timer task to exit
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);

        if let Some(ticker) = self.ticker.take() {
            if let Err(e) = ticker.await {
                warn!(error = %e, "Rebuild timer task ended abnormally");
            }
        }

        if let Some(mut cron) = self.cron.take() {
            if let Err(e) = cron.shutdown().await {
                warn!(error = %e, "Failed to shut down rebuild cron schedule");
            }
        }

        info!("Rebuild scheduler stopped");
    }
}

impl Drop for RebuildScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn start_cron(expression: &str, trigger: RebuildTrigger) -> SuggesterResult<JobScheduler> {
    let invalid = |e: tokio_cron_scheduler::JobSchedulerError| {
        SuggesterError::InvalidConfiguration(format!("rebuild cron '{}': {}", expression, e))
    };

    let scheduler = JobScheduler::new().await.map_err(invalid)?;

    let job = Job::new_async(expression, move |_uuid, _lock| {
        let trigger = trigger.clone();
        Box::pin(async move {
            debug!("Rebuild cron schedule fired");
            trigger("cron");
        })
    })
    .map_err(invalid)?;

    scheduler.add(job).await.map_err(invalid)?;
    scheduler.start().await.map_err(invalid)?;
    Ok(scheduler)
}
