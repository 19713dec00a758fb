//! Minimal read-only client for the X API v2.
//!
//! Only two endpoints are used: username lookup and a user's recent posts.
//! Every listing call is bounded by a result cap and, when given, a UTC time
//! range so the platform does the filtering and reads stay metered low.

use crate::error::FeedError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cmp::Ordering;
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "xgoods-notifier-bot/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
const PLATFORM_MIN_RESULTS: u32 = 5;
const PLATFORM_MAX_RESULTS: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostQuery {
    pub max_results: u32,
    pub since_id: Option<String>,
    pub utc_range: Option<Range<DateTime<Utc>>>,
    pub exclude_replies: bool,
}

#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn resolve_account_id(&self, handle: &str) -> Result<String, FeedError>;

    /// Recent posts of `account_id`, newest first.
    async fn list_recent_posts(&self, account_id: &str, query: &PostQuery) -> Result<Vec<Post>, FeedError>;
}

/// Order two decimal post ids of any length without converting them to numbers.
///
/// Ids that are not plain digit strings fall back to lexicographic order.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (decimal_digits(a), decimal_digits(b)) {
        (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

pub fn same_id(a: &str, b: &str) -> bool {
    compare_ids(a, b) == Ordering::Equal
}

pub fn newest_id<'a, I>(ids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter().max_by(|a, b| compare_ids(a, b))
}

fn decimal_digits(id: &str) -> Option<&str> {
    let id = id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let stripped = id.trim_start_matches('0');
    Some(if stripped.is_empty() { "0" } else { stripped })
}

pub fn post_url(handle: &str, post_id: &str) -> String {
    format!("https://x.com/{}/status/{}", handle, post_id)
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<ApiPost>,
}

#[derive(Debug, Deserialize)]
struct ApiPost {
    id: String,
    #[serde(default)]
    text: String,
    created_at: Option<DateTime<Utc>>,
}

pub struct XApiClient {
    http: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl XApiClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Result<Self, FeedError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Transient {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            bearer_token,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let token = self.bearer_token.as_deref().ok_or_else(|| FeedError::Auth {
            reason: "missing bearer token".to_string(),
        })?;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("X API request: GET {}", endpoint);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| FeedError::Transient {
                reason: if e.is_timeout() {
                    format!("request to {} timed out", endpoint)
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_hint(response.headers(), Utc::now());
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, retry_after, &body, endpoint);
            warn!("X API request failed: {} ({}) for {}", status, err.kind(), endpoint);
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| FeedError::InvalidResponse {
            details: format!("failed to parse {}: {}", endpoint, e),
        })
    }
}

#[async_trait]
impl FeedClient for XApiClient {
    async fn resolve_account_id(&self, handle: &str) -> Result<String, FeedError> {
        let endpoint = format!("/users/by/username/{}", handle);
        let lookup: UserLookupResponse = self.get_json(&endpoint, &[]).await?;
        let id = lookup.data.map(|d| d.id).ok_or_else(|| FeedError::NotFound {
            resource: format!("@{}", handle),
        })?;
        info!("Resolved @{} to account id {}", handle, id);
        Ok(id)
    }

    async fn list_recent_posts(&self, account_id: &str, query: &PostQuery) -> Result<Vec<Post>, FeedError> {
        let endpoint = format!("/users/{}/tweets", account_id);
        let timeline: TimelineResponse = self.get_json(&endpoint, &timeline_params(query)).await?;
        let posts = into_posts(timeline);
        info!("Fetched {} posts for account {}", posts.len(), account_id);
        Ok(posts)
    }
}

fn timeline_params(query: &PostQuery) -> Vec<(&'static str, String)> {
    let exclude = if query.exclude_replies {
        "replies,retweets"
    } else {
        "retweets"
    };
    let max_results = query
        .max_results
        .clamp(PLATFORM_MIN_RESULTS, PLATFORM_MAX_RESULTS);

    let mut params = vec![
        ("tweet.fields", "created_at,text".to_string()),
        ("exclude", exclude.to_string()),
        ("max_results", max_results.to_string()),
    ];
    if let Some(since_id) = &query.since_id {
        params.push(("since_id", since_id.clone()));
    }
    if let Some(range) = &query.utc_range {
        params.push(("start_time", range.start.to_rfc3339_opts(SecondsFormat::Secs, true)));
        params.push(("end_time", range.end.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    params
}

fn into_posts(timeline: TimelineResponse) -> Vec<Post> {
    let mut posts: Vec<Post> = timeline
        .data
        .into_iter()
        .filter_map(|p| {
            let created_at = p.created_at?;
            Some(Post {
                id: p.id,
                text: p.text,
                created_at,
            })
        })
        .collect();
    posts.sort_by(|a, b| compare_ids(&b.id, &a.id));
    posts
}

fn retry_hint(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    header("x-rate-limit-reset").map(|reset| Duration::from_secs((reset - now.timestamp()).max(0) as u64))
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str, resource: &str) -> FeedError {
    let snippet: String = body.chars().take(200).collect();
    match status.as_u16() {
        401 | 403 => FeedError::Auth {
            reason: format!("HTTP {}: {}", status.as_u16(), snippet),
        },
        404 => FeedError::NotFound {
            resource: resource.to_string(),
        },
        429 => FeedError::RateLimited { retry_after },
        code if status.is_server_error() => FeedError::Transient {
            reason: format!("HTTP {}", code),
        },
        code => FeedError::InvalidResponse {
            details: format!("HTTP {}: {}", code, snippet),
        },
    }
}
