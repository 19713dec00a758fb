//! Daily goods-deadline notifier.
//!
//! One call to [`Notifier::run_once`] walks a short state machine: enabled
//! check, configuration check, same-day dedup, short-lived result cache, then
//! a single bounded feed read, content match, send and persist. Every exit
//! except a cache hit records its [`RunResult`] as the last fetch result, and
//! no error escapes to the caller.
//!
//! Concurrent runs (a scheduled tick and a manual test) are not serialised as
//! a whole. Only the final check-send-persist step holds a lock, and it reads
//! the state again, so the second run sees the first one's notification.
//!
//! A crash between the Discord send and the state write can produce one
//! duplicate notification after restart.

use crate::channel::{ChannelSender, Notification, NotificationEmbed};
use crate::config::NotifierConfig;
use crate::data::{FetchRecord, NotifierState, RunOutcome, RunResult, SkipReason, StatePatch, StateStore, Trigger};
use crate::error::{ChannelError, FeedError};
use crate::feed::{compare_ids, newest_id, post_url, same_id, FeedClient, Post, PostQuery};
use crate::matcher::is_candidate;
use crate::time::{format_local_hm, local_date, local_hour, local_window_to_utc_range};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const EXCERPT_MAX_CHARS: usize = 3900;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Bypass the enabled flag, same-day dedup, result cache and since-id.
    pub forced: bool,
    pub trigger: Trigger,
}

impl RunOptions {
    pub fn scheduled() -> Self {
        Self {
            forced: false,
            trigger: Trigger::Scheduled,
        }
    }

    pub fn manual_test(forced: bool) -> Self {
        Self {
            forced,
            trigger: Trigger::ManualTest,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub enabled: bool,
    pub enabled_override: Option<bool>,
    pub channel_id: Option<u64>,
    pub username: String,
    pub credential_configured: bool,
    pub last_notified_post_id: Option<String>,
    pub last_notified_date_local: Option<NaiveDate>,
    pub last_seen_post_id: Option<String>,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_fetch_date_local: Option<NaiveDate>,
    pub last_fetch_result: Option<RunResult>,
    pub state_location: String,
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Bookkeeping gathered while a run progresses, written with the final record.
#[derive(Default)]
struct RunProgress {
    newest_seen: Option<String>,
}

pub struct Notifier {
    config: NotifierConfig,
    store: Arc<dyn StateStore>,
    feed: Arc<dyn FeedClient>,
    channel: Arc<dyn ChannelSender>,
    clock: Arc<dyn Clock>,
    send_lock: Mutex<()>,
}

impl Notifier {
    pub fn new(
        config: NotifierConfig,
        store: Arc<dyn StateStore>,
        feed: Arc<dyn FeedClient>,
        channel: Arc<dyn ChannelSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            feed,
            channel,
            clock,
            send_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    fn effective_enabled(&self, state: &NotifierState) -> bool {
        state.enabled.unwrap_or(self.config.enabled_default)
    }

    pub async fn set_enabled(&self, enabled: bool) -> bool {
        let state = self
            .store
            .set(StatePatch {
                enabled: Some(enabled),
                ..Default::default()
            })
            .await;
        info!("xgoods notifier {}", if enabled { "enabled" } else { "disabled" });
        self.effective_enabled(&state)
    }

    pub async fn status(&self) -> StatusSnapshot {
        let state = self.store.get().await;
        StatusSnapshot {
            enabled: self.effective_enabled(&state),
            enabled_override: state.enabled,
            channel_id: self.config.channel_id,
            username: self.config.username.clone(),
            credential_configured: self.config.bearer_token.is_some(),
            last_notified_post_id: state.last_notified_post_id,
            last_notified_date_local: state.last_notified_date_local,
            last_seen_post_id: state.last_seen_post_id,
            last_fetch_at: state.last_fetch_at,
            last_fetch_date_local: state.last_fetch_date_local,
            last_fetch_result: state.last_fetch_result,
            state_location: self.store.location(),
        }
    }

    pub async fn run_once(&self, opts: RunOptions) -> RunResult {
        let now = self.clock.now();
        let today = local_date(now, &self.config.utc_offset);
        let state = self.store.get().await;

        let mut progress = RunProgress::default();
        let outcome = match self.precheck(&state, opts, today) {
            Err(outcome) => outcome,
            Ok(channel_id) => {
                if let Some(cached) = self.cached_result(&state, opts, now, today) {
                    debug!("xgoods run ({}): reusing result from {}", opts.trigger.as_str(), cached.at);
                    return cached;
                }
                match self
                    .fetch_and_notify(&state, channel_id, opts, now, today, &mut progress)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("xgoods run ({}) failed: {}", opts.trigger.as_str(), e);
                        RunOutcome::Failed { message: e.to_string() }
                    }
                }
            }
        };

        let result = RunResult {
            trigger: opts.trigger,
            forced: opts.forced,
            at: now,
            cached: false,
            outcome,
        };
        self.record(&result, today, progress).await;
        info!("xgoods run ({}): {}", opts.trigger.as_str(), result.summary());
        result
    }

    /// Exits that need no feed read. Otherwise the configured channel id.
    fn precheck(&self, state: &NotifierState, opts: RunOptions, today: NaiveDate) -> Result<u64, RunOutcome> {
        let skipped = |reason| RunOutcome::Skipped {
            reason,
            post_id: None,
            fetched: None,
        };

        if !opts.forced && !self.effective_enabled(state) {
            return Err(skipped(SkipReason::Disabled));
        }

        let channel_id = match (self.config.channel_id, &self.config.bearer_token) {
            (Some(channel_id), Some(_)) => channel_id,
            (channel_id, token) => {
                warn!(
                    "xgoods notifier is not configured (channel set: {}, bearer token set: {})",
                    channel_id.is_some(),
                    token.is_some()
                );
                return Err(skipped(SkipReason::ConfigMissing));
            }
        };

        if !opts.forced && state.last_notified_date_local == Some(today) {
            return Err(RunOutcome::Skipped {
                reason: SkipReason::AlreadyNotifiedTodayNoFetch,
                post_id: state.last_notified_post_id.clone(),
                fetched: None,
            });
        }

        Ok(channel_id)
    }

    /// A recent same-day result that already paid for a feed read.
    fn cached_result(
        &self,
        state: &NotifierState,
        opts: RunOptions,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Option<RunResult> {
        if opts.forced || state.last_fetch_date_local != Some(today) {
            return None;
        }
        let last = state.last_fetch_result.as_ref().filter(|r| r.reached_feed())?;
        let age = now.signed_duration_since(state.last_fetch_at?).to_std().ok()?;
        if age >= self.config.cache_ttl {
            return None;
        }

        let mut cached = last.clone();
        cached.cached = true;
        Some(cached)
    }

    async fn fetch_and_notify(
        &self,
        state: &NotifierState,
        channel_id: u64,
        opts: RunOptions,
        now: DateTime<Utc>,
        today: NaiveDate,
        progress: &mut RunProgress,
    ) -> Result<RunOutcome, RunError> {
        let matching = &self.config.matching;

        let window = local_window_to_utc_range(today, matching.min_hour, matching.max_hour, &self.config.utc_offset);
        let end = window.end.min(now);
        if end <= window.start {
            debug!("Posting window opens at {}, nothing to read yet", window.start);
            return Ok(RunOutcome::Skipped {
                reason: SkipReason::NoCandidate,
                post_id: None,
                fetched: None,
            });
        }

        let account_id = self.account_id(state).await?;

        let query = PostQuery {
            max_results: match opts.trigger {
                Trigger::Scheduled => matching.scheduled_max_results,
                Trigger::ManualTest => matching.manual_max_results,
            },
            since_id: if opts.forced {
                None
            } else {
                state.last_notified_post_id.clone()
            },
            utc_range: Some(window.start..end),
            exclude_replies: self.config.exclude_replies,
        };

        let posts = self.feed.list_recent_posts(&account_id, &query).await?;
        let fetched = posts.len();

        if let Some(newest) = newest_id(posts.iter().map(|p| p.id.as_str())) {
            let is_newer = state
                .last_seen_post_id
                .as_deref()
                .map_or(true, |seen| compare_ids(newest, seen) == Ordering::Greater);
            if is_newer {
                progress.newest_seen = Some(newest.to_string());
            }
        }

        let Some(post) = self.pick_candidate(&posts, today) else {
            return Ok(RunOutcome::Skipped {
                reason: SkipReason::NoCandidate,
                post_id: None,
                fetched: Some(fetched),
            });
        };

        self.deliver(post, channel_id, opts, today, fetched).await
    }

    /// Dedup against the current state, send and persist the notification.
    ///
    /// The state read at the start of the run may be stale by now, so it is
    /// read again under the lock.
    async fn deliver(
        &self,
        post: &Post,
        channel_id: u64,
        opts: RunOptions,
        today: NaiveDate,
        fetched: usize,
    ) -> Result<RunOutcome, RunError> {
        let _guard = self.send_lock.lock().await;
        let state = self.store.get().await;

        if state
            .last_notified_post_id
            .as_deref()
            .is_some_and(|last| same_id(last, &post.id))
        {
            return Ok(RunOutcome::Skipped {
                reason: SkipReason::AlreadyNotifiedSamePost,
                post_id: Some(post.id.clone()),
                fetched: Some(fetched),
            });
        }

        if !opts.forced && state.last_notified_date_local == Some(today) {
            debug!("Another run notified today while this one was reading the feed");
            return Ok(RunOutcome::Skipped {
                reason: SkipReason::AlreadyNotifiedTodayNoFetch,
                post_id: state.last_notified_post_id,
                fetched: Some(fetched),
            });
        }

        let url = post_url(&self.config.username, &post.id);
        let notification = self.build_notification(post, &url, opts.trigger);

        match self.channel.send(channel_id, &notification).await {
            Ok(message_id) => {
                self.store
                    .set(StatePatch {
                        last_notified: Some((post.id.clone(), today)),
                        ..Default::default()
                    })
                    .await;
                Ok(RunOutcome::Notified {
                    post_id: post.id.clone(),
                    post_url: url,
                    message_id,
                })
            }
            Err(e @ (ChannelError::NotFound { .. } | ChannelError::NotTextCapable { .. })) => {
                warn!("xgoods notification channel unavailable: {}", e);
                Ok(RunOutcome::Skipped {
                    reason: SkipReason::ChannelNotFound,
                    post_id: Some(post.id.clone()),
                    fetched: Some(fetched),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn account_id(&self, state: &NotifierState) -> Result<String, FeedError> {
        let handle = &self.config.username;
        if let Some(id) = &state.resolved_account_id {
            if state.resolved_account_handle.as_deref().map_or(true, |h| h == handle) {
                return Ok(id.clone());
            }
            debug!("Account handle changed to @{}, resolving again", handle);
        }

        let id = self.feed.resolve_account_id(handle).await?;
        self.store
            .set(StatePatch {
                resolved_account: Some((handle.clone(), id.clone())),
                ..Default::default()
            })
            .await;
        Ok(id)
    }

    /// First post, newest first, that is from today, inside the hour window and matches.
    fn pick_candidate<'a>(&self, posts: &'a [Post], today: NaiveDate) -> Option<&'a Post> {
        let tz = &self.config.utc_offset;
        let matching = &self.config.matching;

        let mut ordered: Vec<&Post> = posts.iter().collect();
        ordered.sort_by(|a, b| compare_ids(&b.id, &a.id));

        ordered.into_iter().find(|post| {
            let hour = local_hour(post.created_at, tz);
            local_date(post.created_at, tz) == today
                && (matching.min_hour..=matching.max_hour).contains(&hour)
                && is_candidate(&post.text, matching)
        })
    }

    fn build_notification(&self, post: &Post, url: &str, trigger: Trigger) -> Notification {
        let tz = &self.config.utc_offset;
        let excerpt: String = post.text.chars().take(EXCERPT_MAX_CHARS).collect();

        Notification {
            content: format!("📦 **Today's deadline goods**\n{}", url),
            embed: NotificationEmbed {
                title: format!(
                    "Today's deadline goods ({} {})",
                    local_date(post.created_at, tz),
                    format_local_hm(post.created_at, tz)
                ),
                url: url.to_string(),
                description: excerpt,
                footer: format!("source: @{} / {}", self.config.username, trigger.as_str()),
            },
        }
    }

    async fn record(&self, result: &RunResult, today: NaiveDate, progress: RunProgress) {
        let last_notified = match &result.outcome {
            RunOutcome::Notified { post_id, .. } => Some((post_id.clone(), today)),
            _ => None,
        };

        self.store
            .set(StatePatch {
                last_notified,
                last_seen_post_id: progress.newest_seen,
                last_fetch: Some(FetchRecord {
                    at: result.at,
                    date_local: today,
                    result: result.clone(),
                }),
                ..Default::default()
            })
            .await;
    }
}
