//! Test doubles shared by the notifier, scheduler and command tests.

use crate::channel::{ChannelSender, Notification};
use crate::config::{MatchConfig, NotifierConfig};
use crate::data::{MemoryStateStore, StateStore};
use crate::error::{ChannelError, FeedError};
use crate::feed::{FeedClient, Post, PostQuery};
use crate::notifier::{Clock, Notifier};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

pub const POST_ID: &str = "1889000000000000001";
pub const MATCHING_TEXT: &str = "【業務連絡】本日〆切のグッズまとめ\n・アクスタ 2/10〆切";

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

pub fn at_jst(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    jst()
        .with_ymd_and_hms(2026, 2, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn post(id: &str, text: &str, created_at: DateTime<Utc>) -> Post {
    Post {
        id: id.to_string(),
        text: text.to_string(),
        created_at,
    }
}

pub fn test_config() -> NotifierConfig {
    NotifierConfig {
        enabled_default: true,
        channel_id: Some(42),
        bearer_token: Some("token".to_string()),
        username: "zutapoke".to_string(),
        api_base_url: "http://localhost".to_string(),
        exclude_replies: true,
        matching: MatchConfig::default(),
        schedule_time: NaiveTime::from_hms_opt(6, 35, 0).unwrap(),
        utc_offset: jst(),
        cache_ttl: Duration::from_secs(120),
    }
}

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
pub struct MockFeed {
    pub posts: Mutex<Vec<Post>>,
    pub error: Mutex<Option<FeedError>>,
    pub panic_on_list: AtomicBool,
    /// Per-call latency of `list_recent_posts`, consumed in call order.
    pub list_delays: Mutex<VecDeque<Duration>>,
    pub queries: Mutex<Vec<PostQuery>>,
    pub resolve_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl MockFeed {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        let feed = Self::default();
        *feed.posts.lock().unwrap() = posts;
        feed
    }

    pub fn with_list_delays(self, delays: &[Duration]) -> Self {
        *self.list_delays.lock().unwrap() = delays.iter().copied().collect();
        self
    }

    pub fn total_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst) + self.list_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for MockFeed {
    async fn resolve_account_id(&self, _handle: &str) -> Result<String, FeedError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok("1111".to_string())
    }

    async fn list_recent_posts(&self, _account_id: &str, query: &PostQuery) -> Result<Vec<Post>, FeedError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("feed exploded");
        }
        self.queries.lock().unwrap().push(query.clone());
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        if let Some(e) = self.error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.posts.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MockChannel {
    pub sent: Mutex<Vec<(u64, Notification)>>,
    pub failure: Option<ChannelError>,
    pub send_delay: Option<Duration>,
}

impl MockChannel {
    pub fn failing(failure: ChannelError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(failure),
            send_delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            send_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelSender for MockChannel {
    async fn send(&self, channel_id: u64, notification: &Notification) -> Result<String, ChannelError> {
        if let Some(delay) = self.send_delay {
            sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((channel_id, notification.clone()));
        Ok(format!("msg-{}", sent.len()))
    }
}

pub struct Harness {
    pub notifier: Arc<Notifier>,
    pub store: Arc<dyn StateStore>,
    pub feed: Arc<MockFeed>,
    pub channel: Arc<MockChannel>,
    pub clock: Arc<ManualClock>,
}

pub fn harness_with(
    config: NotifierConfig,
    store: Arc<dyn StateStore>,
    feed: MockFeed,
    channel: MockChannel,
    now: DateTime<Utc>,
) -> Harness {
    let feed = Arc::new(feed);
    let channel = Arc::new(channel);
    let clock = Arc::new(ManualClock::new(now));
    let notifier = Arc::new(Notifier::new(
        config,
        store.clone(),
        feed.clone(),
        channel.clone(),
        clock.clone(),
    ));
    Harness {
        notifier,
        store,
        feed,
        channel,
        clock,
    }
}

/// Default configuration, in-memory state, 2026-02-10 06:35 JST.
pub fn harness(posts: Vec<Post>) -> Harness {
    harness_with(
        test_config(),
        Arc::new(MemoryStateStore::default()),
        MockFeed::with_posts(posts),
        MockChannel::default(),
        at_jst(10, 6, 35),
    )
}
