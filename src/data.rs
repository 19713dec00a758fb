use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    ManualTest,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::ManualTest => "manual_test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    ConfigMissing,
    AlreadyNotifiedTodayNoFetch,
    NoCandidate,
    AlreadyNotifiedSamePost,
    ChannelNotFound,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::ConfigMissing => "config_missing",
            SkipReason::AlreadyNotifiedTodayNoFetch => "already_notified_today_no_fetch",
            SkipReason::NoCandidate => "no_candidate",
            SkipReason::AlreadyNotifiedSamePost => "already_notified_same_post",
            SkipReason::ChannelNotFound => "channel_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Notified {
        post_id: String,
        post_url: String,
        message_id: String,
    },
    Skipped {
        reason: SkipReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        post_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fetched: Option<usize>,
    },
    Failed {
        message: String,
    },
}

/// Outcome of one notifier invocation. Stored verbatim as the last fetch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub trigger: Trigger,
    pub forced: bool,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub cached: bool,
    pub outcome: RunOutcome,
}

impl RunResult {
    pub fn ok(&self) -> bool {
        match &self.outcome {
            RunOutcome::Notified { .. } => true,
            RunOutcome::Skipped { reason, .. } => {
                !matches!(reason, SkipReason::ConfigMissing | SkipReason::ChannelNotFound)
            }
            RunOutcome::Failed { .. } => false,
        }
    }

    pub fn notified(&self) -> bool {
        matches!(self.outcome, RunOutcome::Notified { .. })
    }

    pub fn skipped(&self) -> bool {
        matches!(self.outcome, RunOutcome::Skipped { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match &self.outcome {
            RunOutcome::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn post_id(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Notified { post_id, .. } => Some(post_id),
            RunOutcome::Skipped { post_id, .. } => post_id.as_deref(),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn post_url(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Notified { post_url, .. } => Some(post_url),
            _ => None,
        }
    }

    /// True when the run called the feed. A skip counts only when it carries
    /// the number of posts fetched.
    pub fn reached_feed(&self) -> bool {
        match &self.outcome {
            RunOutcome::Notified { .. } | RunOutcome::Failed { .. } => true,
            RunOutcome::Skipped { fetched, .. } => fetched.is_some(),
        }
    }

    /// Short human-readable summary used in logs and the status command.
    pub fn summary(&self) -> String {
        let mut text = match &self.outcome {
            RunOutcome::Notified { post_id, .. } => format!("notified ({})", post_id),
            RunOutcome::Skipped { reason, fetched, .. } => match fetched {
                Some(n) => format!("skipped: {} (fetched {})", reason.as_str(), n),
                None => format!("skipped: {}", reason.as_str()),
            },
            RunOutcome::Failed { message } => format!("error: {}", message),
        };
        if self.cached {
            text.push_str(" [cached]");
        }
        text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierState {
    /// None means "follow the deployment default".
    pub enabled: Option<bool>,
    pub last_notified_post_id: Option<String>,
    pub last_notified_date_local: Option<NaiveDate>,
    pub resolved_account_id: Option<String>,
    pub resolved_account_handle: Option<String>,
    pub last_seen_post_id: Option<String>,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_fetch_date_local: Option<NaiveDate>,
    pub last_fetch_result: Option<RunResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub at: DateTime<Utc>,
    pub date_local: NaiveDate,
    pub result: RunResult,
}

/// Partial update merged into the stored state.
///
/// The notified post id and date travel together so a date is never stored
/// without its id.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub enabled: Option<bool>,
    pub last_notified: Option<(String, NaiveDate)>,
    /// (handle, account id)
    pub resolved_account: Option<(String, String)>,
    pub last_seen_post_id: Option<String>,
    pub last_fetch: Option<FetchRecord>,
}

impl StatePatch {
    pub fn apply(self, state: &mut NotifierState) {
        if let Some(enabled) = self.enabled {
            state.enabled = Some(enabled);
        }
        if let Some((post_id, date)) = self.last_notified {
            state.last_notified_post_id = Some(post_id);
            state.last_notified_date_local = Some(date);
        }
        if let Some((handle, account_id)) = self.resolved_account {
            state.resolved_account_handle = Some(handle);
            state.resolved_account_id = Some(account_id);
        }
        if let Some(post_id) = self.last_seen_post_id {
            state.last_seen_post_id = Some(post_id);
        }
        if let Some(fetch) = self.last_fetch {
            state.last_fetch_at = Some(fetch.at);
            state.last_fetch_date_local = Some(fetch.date_local);
            state.last_fetch_result = Some(fetch.result);
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current state; defaults when nothing was stored.
    async fn get(&self) -> NotifierState;

    /// Merge `patch`, persist, and return the merged state.
    async fn set(&self, patch: StatePatch) -> NotifierState;

    /// Where the state lives, for status output.
    fn location(&self) -> String;
}

/// JSON file store with an in-memory mirror.
///
/// Writes go to `<path>.tmp` and are renamed over the real file. Write
/// failures are logged and the in-memory state stays authoritative.
pub struct JsonStateStore {
    path: PathBuf,
    state: RwLock<NotifierState>,
}

impl JsonStateStore {
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match read_state(&path).await {
            Ok(Some(state)) => {
                info!("Loaded notifier state from {}", path.display());
                state
            }
            Ok(None) => {
                debug!("No notifier state at {}, starting fresh", path.display());
                NotifierState::default()
            }
            Err(e) => {
                warn!("Failed to load notifier state, starting fresh: {}", e);
                NotifierState::default()
            }
        };

        Self {
            path,
            state: RwLock::new(state),
        }
    }

    async fn save(&self, state: &NotifierState) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, content).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn get(&self) -> NotifierState {
        self.state.read().await.clone()
    }

    async fn set(&self, patch: StatePatch) -> NotifierState {
        // The write lock is held across the file write so saves land in order.
        let mut state = self.state.write().await;
        patch.apply(&mut state);
        if let Err(e) = self.save(&state).await {
            error!("Failed to save notifier state: {}", e);
        }
        state.clone()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

async fn read_state(path: &Path) -> Result<Option<NotifierState>, StorageError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Volatile store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<NotifierState>,
}

#[cfg(test)]
#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self) -> NotifierState {
        self.state.read().await.clone()
    }

    async fn set(&self, patch: StatePatch) -> NotifierState {
        let mut state = self.state.write().await;
        patch.apply(&mut state);
        state.clone()
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
