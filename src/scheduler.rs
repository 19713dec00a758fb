use crate::bot::SharedNotifier;
use crate::notifier::RunOptions;
use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub struct DailyScheduler {
    notifier: SharedNotifier,
    schedule: Schedule,
    tz: FixedOffset,
    started: AtomicBool,
}

impl DailyScheduler {
    pub fn new(notifier: SharedNotifier) -> Result<Self, cron::error::Error> {
        let config = notifier.config();
        let schedule = Schedule::from_str(&config.cron_expression())?;
        let tz = config.utc_offset;
        Ok(Self {
            notifier,
            schedule,
            tz,
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the daily loop. Later calls do nothing and return false.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("xgoods scheduler already running");
            return false;
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run().await });
        true
    }

    /// Next trigger strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    async fn run(&self) {
        info!(
            "Starting xgoods scheduler ({} local, UTC{})",
            self.notifier.config().schedule_time.format("%H:%M"),
            self.tz
        );

        let mut next = self.next_fire(Utc::now());
        while let Some(fire_at) = next {
            debug!("Next scheduled xgoods check at {}", fire_at);
            sleep((fire_at - Utc::now()).to_std().unwrap_or_default()).await;
            self.tick().await;
            next = self.following_fire(fire_at, Utc::now());
        }
        error!("xgoods schedule has no upcoming run, stopping scheduler");
    }

    /// Slot after one that just fired. A wall clock still behind `fired`
    /// must not yield the same slot again.
    fn following_fire(&self, fired: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_fire(fired.max(now))
    }

    /// Run one scheduled check in its own task so a panic cannot end the loop.
    async fn tick(&self) {
        let notifier = Arc::clone(&self.notifier);
        let handle = tokio::spawn(async move { notifier.run_once(RunOptions::scheduled()).await });

        match handle.await {
            Ok(result) if result.is_error() => warn!("Scheduled xgoods check errored: {}", result.summary()),
            Ok(result) => debug!("Scheduled xgoods check finished: {}", result.summary()),
            Err(e) => error!("Scheduled xgoods check failed: {}", e),
        }
    }
}
