use crate::error::ConfigError;
use crate::time::{fixed_offset, DEFAULT_UTC_OFFSET_HOURS};
use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config/xgoods.toml";
const DEFAULT_STATE_PATH: &str = "data/xgoods_notifier_state.json";
const DEFAULT_USERNAME: &str = "zutapoke";
const DEFAULT_API_BASE_URL: &str = "https://api.x.com/2";
const DEFAULT_SCHEDULE: &str = "06:35";

const BEARER_TOKEN_VARS: [&str; 3] = ["X_BEARER_TOKEN", "X_BEARER", "TWITTER_BEARER_TOKEN"];

/// Keyword and window rules used to recognise the daily post.
///
/// The keyword lists add to the fixed rules in [`crate::matcher`]; they never
/// replace them.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub keywords_all: Vec<String>,
    pub keywords_any: Vec<String>,
    /// Inclusive local-hour window.
    pub min_hour: u32,
    pub max_hour: u32,
    /// Scheduled runs read a handful of posts; manual tests read a bit more.
    pub scheduled_max_results: u32,
    pub manual_max_results: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            keywords_all: Vec::new(),
            keywords_any: Vec::new(),
            min_hour: 5,
            max_hour: 9,
            scheduled_max_results: 5,
            manual_max_results: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub enabled_default: bool,
    pub channel_id: Option<u64>,
    pub bearer_token: Option<String>,
    pub username: String,
    pub api_base_url: String,
    pub exclude_replies: bool,
    pub matching: MatchConfig,
    pub schedule_time: NaiveTime,
    pub utc_offset: FixedOffset,
    pub cache_ttl: Duration,
}

impl NotifierConfig {
    /// Cron expression (sec min hour dom mon dow) for the daily run.
    pub fn cron_expression(&self) -> String {
        use chrono::Timelike;
        format!(
            "0 {} {} * * *",
            self.schedule_time.minute(),
            self.schedule_time.hour()
        )
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub state_path: PathBuf,
    pub notifier: NotifierConfig,
}

/// Shape of the optional TOML file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub state_path: Option<PathBuf>,
    pub notifier: FileNotifierSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileNotifierSection {
    pub enabled: Option<bool>,
    pub channel_id: Option<String>,
    pub username: Option<String>,
    pub api_base_url: Option<String>,
    pub max_results: Option<i64>,
    pub cron_max_results: Option<i64>,
    pub test_max_results: Option<i64>,
    pub keywords_all: Option<Vec<String>>,
    pub keywords_any: Option<Vec<String>>,
    pub min_hour: Option<i64>,
    pub max_hour: Option<i64>,
    pub exclude_replies: Option<bool>,
    pub schedule: Option<String>,
    pub utc_offset_hours: Option<i64>,
    pub cache_ttl_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using environment and defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("XGOODS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = FileConfig::load(Path::new(&path))?;
        let config = Self::resolve(file, |key| std::env::var(key).ok())?;
        info!("Loaded configuration (file: {})", path);
        Ok(config)
    }

    /// Merge sources with precedence environment > file > default and validate.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_token = env("DISCORD_TOKEN").ok_or_else(|| ConfigError::MissingEnvironmentVariable {
            var_name: "DISCORD_TOKEN".to_string(),
        })?;

        let state_path = env("DATA_FILE_PATH")
            .map(PathBuf::from)
            .or(file.state_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));

        let section = file.notifier;

        let enabled_default = match env("X_GOODS_NOTIFIER_ENABLED") {
            Some(v) => parse_bool("X_GOODS_NOTIFIER_ENABLED", &v)?,
            None => section.enabled.unwrap_or(true),
        };

        let channel_id = env("X_GOODS_NOTIFIER_CHANNEL_ID")
            .or(section.channel_id)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|id| *id != 0)
                    .ok_or_else(|| ConfigError::invalid("channel_id", &v))
            })
            .transpose()?;

        let bearer_token = BEARER_TOKEN_VARS.iter().find_map(|key| env(*key));

        let username = env("X_GOODS_NOTIFIER_USERNAME")
            .or(section.username)
            .map(|u| u.trim().trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

        let api_base_url = env("X_API_BASE_URL")
            .or(section.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let legacy_max = int_setting(&env, "X_GOODS_NOTIFIER_MAX_RESULTS", section.max_results)?;
        let cron_max = int_setting(&env, "X_GOODS_NOTIFIER_CRON_MAX_RESULTS", section.cron_max_results)?;
        let test_max = int_setting(&env, "X_GOODS_NOTIFIER_TEST_MAX_RESULTS", section.test_max_results)?;

        let keywords_all = env("X_GOODS_NOTIFIER_KEYWORDS_ALL")
            .map(|v| parse_csv(&v))
            .or(section.keywords_all.map(clean_keywords))
            .unwrap_or_default();
        let keywords_any = env("X_GOODS_NOTIFIER_KEYWORDS_ANY")
            .map(|v| parse_csv(&v))
            .or(section.keywords_any.map(clean_keywords))
            .unwrap_or_default();

        let min_hour = int_setting(&env, "X_GOODS_NOTIFIER_MIN_HOUR_JST", section.min_hour)?.unwrap_or(5);
        let max_hour = int_setting(&env, "X_GOODS_NOTIFIER_MAX_HOUR_JST", section.max_hour)?.unwrap_or(9);
        let min_hour = validate_hour("min_hour", min_hour)?;
        let max_hour = validate_hour("max_hour", max_hour)?;
        if min_hour > max_hour {
            return Err(ConfigError::invalid(
                "min_hour",
                format!("{} is after max_hour {}", min_hour, max_hour),
            ));
        }

        let matching = MatchConfig {
            keywords_all,
            keywords_any,
            min_hour,
            max_hour,
            scheduled_max_results: clamp_int(cron_max.or(legacy_max).unwrap_or(5), 3, 25),
            manual_max_results: clamp_int(test_max.or(legacy_max).unwrap_or(25), 5, 100),
        };

        // Anything but an explicit "false" keeps replies excluded.
        let exclude_replies = match env("X_GOODS_NOTIFIER_EXCLUDE_REPLIES") {
            Some(v) => !v.eq_ignore_ascii_case("false"),
            None => section.exclude_replies.unwrap_or(true),
        };

        let schedule_raw = env("X_GOODS_NOTIFIER_SCHEDULE")
            .or(section.schedule)
            .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        let schedule_time = validate_time_format(&schedule_raw)?;

        let offset_hours = section
            .utc_offset_hours
            .unwrap_or(i64::from(DEFAULT_UTC_OFFSET_HOURS));
        let utc_offset = i32::try_from(offset_hours)
            .ok()
            .filter(|h| (-23..=23).contains(h))
            .and_then(fixed_offset)
            .ok_or_else(|| ConfigError::invalid("utc_offset_hours", offset_hours))?;

        let cache_ttl_secs = match env("X_GOODS_NOTIFIER_CACHE_TTL_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::invalid("X_GOODS_NOTIFIER_CACHE_TTL_SECS", &v))?,
            None => section.cache_ttl_secs.unwrap_or(120),
        };

        Ok(Self {
            discord_token,
            state_path,
            notifier: NotifierConfig {
                enabled_default,
                channel_id,
                bearer_token,
                username,
                api_base_url,
                exclude_replies,
                matching,
                schedule_time,
                utc_offset,
                cache_ttl: Duration::from_secs(cache_ttl_secs),
            },
        })
    }
}

fn int_setting<F>(env: &F, key: &str, file_value: Option<i64>) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, &v)),
        None => Ok(file_value),
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(field, value)),
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    clean_keywords(value.split(',').map(str::to_string).collect())
}

fn clean_keywords(words: Vec<String>) -> Vec<String> {
    words
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn clamp_int(value: i64, min: u32, max: u32) -> u32 {
    value.clamp(i64::from(min), i64::from(max)) as u32
}

fn validate_hour(field: &str, hour: i64) -> Result<u32, ConfigError> {
    if (0..=23).contains(&hour) {
        Ok(hour as u32)
    } else {
        Err(ConfigError::invalid(field, hour))
    }
}

fn validate_time_format(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::invalid("schedule", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base_env() -> Vec<(&'static str, &'static str)> {
        vec![("DISCORD_TOKEN", "discord-token")]
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), env_of(&base_env())).unwrap();
        let n = &config.notifier;
        assert!(n.enabled_default);
        assert_eq!(n.channel_id, None);
        assert_eq!(n.bearer_token, None);
        assert_eq!(n.username, "zutapoke");
        assert!(n.exclude_replies);
        assert_eq!(n.matching, MatchConfig::default());
        assert_eq!(n.cron_expression(), "0 35 6 * * *");
        assert_eq!(n.utc_offset.local_minus_utc(), 9 * 3600);
        assert_eq!(n.cache_ttl, Duration::from_secs(120));
        assert_eq!(config.state_path, PathBuf::from(DEFAULT_STATE_PATH));
    }

    #[test]
    fn test_missing_discord_token_fails_fast() {
        let err = Config::resolve(FileConfig::default(), env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvironmentVariable { ref var_name } if var_name == "DISCORD_TOKEN"
        ));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            state_path = "from-file.json"

            [notifier]
            enabled = false
            channel_id = "111"
            username = "file_user"
            keywords_all = ["A", " "]
            min_hour = 6
            max_hour = 8
            "#,
        )
        .unwrap();

        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_CHANNEL_ID", "222"));
        pairs.push(("X_GOODS_NOTIFIER_USERNAME", "@env_user"));
        pairs.push(("X_BEARER", "bearer"));
        let config = Config::resolve(file, env_of(&pairs)).unwrap();

        assert_eq!(config.state_path, PathBuf::from("from-file.json"));
        assert!(!config.notifier.enabled_default);
        assert_eq!(config.notifier.channel_id, Some(222));
        assert_eq!(config.notifier.username, "env_user");
        assert_eq!(config.notifier.bearer_token.as_deref(), Some("bearer"));
        assert_eq!(config.notifier.matching.keywords_all, vec!["A".to_string()]);
        assert_eq!(config.notifier.matching.min_hour, 6);
        assert_eq!(config.notifier.matching.max_hour, 8);
    }

    #[test]
    fn test_max_results_fallback_and_clamp() {
        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_MAX_RESULTS", "50"));
        let config = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap();
        assert_eq!(config.notifier.matching.scheduled_max_results, 25);
        assert_eq!(config.notifier.matching.manual_max_results, 50);

        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_CRON_MAX_RESULTS", "1"));
        pairs.push(("X_GOODS_NOTIFIER_TEST_MAX_RESULTS", "500"));
        let config = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap();
        assert_eq!(config.notifier.matching.scheduled_max_results, 3);
        assert_eq!(config.notifier.matching.manual_max_results, 100);
    }

    #[test]
    fn test_csv_keywords() {
        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_KEYWORDS_ALL", "グッズ, 締切 ,,"));
        pairs.push(("X_GOODS_NOTIFIER_KEYWORDS_ANY", "〆切,期限"));
        let config = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap();
        assert_eq!(config.notifier.matching.keywords_all, vec!["グッズ", "締切"]);
        assert_eq!(config.notifier.matching.keywords_any, vec!["〆切", "期限"]);
    }

    #[test]
    fn test_invalid_values_are_named() {
        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_MIN_HOUR_JST", "10"));
        let err = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "min_hour"));

        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_SCHEDULE", "25:99"));
        let err = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "schedule"));

        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_CHANNEL_ID", "general"));
        let err = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "channel_id"));
    }

    #[test]
    fn test_exclude_replies_only_disabled_by_false() {
        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_EXCLUDE_REPLIES", "FALSE"));
        let config = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap();
        assert!(!config.notifier.exclude_replies);

        let mut pairs = base_env();
        pairs.push(("X_GOODS_NOTIFIER_EXCLUDE_REPLIES", "nope"));
        let config = Config::resolve(FileConfig::default(), env_of(&pairs)).unwrap();
        assert!(config.notifier.exclude_replies);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert!(file.state_path.is_none());
        assert!(file.notifier.channel_id.is_none());
    }
}
