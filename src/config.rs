//! Configuration types.
//!
//! Everything is read from the environment once at startup by
//! [`BotConfig::from_env`]. Sub-configs carry `Default` impls so tests can
//! build components without touching the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig, RetryConfig};

/// Cache gateway settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL. `None` selects the in-process cache.
    pub redis_url: Option<String>,
    /// Expiry of `user:{jid}` snapshots.
    pub user_ttl: Duration,
    /// Maximum length of the `history:{jid}` list.
    pub history_max: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            user_ttl: Duration::from_secs(3600), // 1 hour
            history_max: 20,
        }
    }
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// Pause between candidates during fan-out.
    pub fanout_delay: Duration,
    /// A phone needs at least this many digits to be reachable.
    pub min_phone_digits: usize,
    /// Upper bound on candidates the matcher pulls per query.
    pub candidate_limit: usize,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            fanout_delay: Duration::from_secs(5),
            min_phone_digits: 10,
            candidate_limit: 25,
        }
    }
}

/// Background matcher settings.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub poll_interval: Duration,
    /// Attempts before a job is parked as `failed`.
    pub max_attempts: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct ChannelsConfig {
    pub telegram_token: Option<String>,
    pub telegram_allowed_users: Vec<String>,
    pub cli_enabled: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            telegram_allowed_users: vec!["*".to_string()],
            cli_enabled: true,
        }
    }
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub db_path: PathBuf,
    pub cache: CacheConfig,
    pub outreach: OutreachConfig,
    pub matcher: MatcherConfig,
    pub channels: ChannelsConfig,
    /// Webhook that receives verified artifacts.
    pub indexer_url: Option<String>,
    /// Directory for the rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let backend = match vars.get("OUTREACH_LLM_BACKEND").as_deref() {
            None | Some("anthropic") => LlmBackend::Anthropic,
            Some("openai") => LlmBackend::OpenAi,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "OUTREACH_LLM_BACKEND".into(),
                    message: format!("unknown backend '{other}'"),
                });
            }
        };
        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = vars
            .get(key_var)
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;
        let model = vars.get("OUTREACH_MODEL").unwrap_or_else(|| match backend {
            LlmBackend::Anthropic => "claude-sonnet-4-20250514".to_string(),
            LlmBackend::OpenAi => "gpt-4o".to_string(),
        });

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: vars.parse("OUTREACH_LLM_MAX_RETRIES", retry_defaults.max_retries)?,
            base_delay: Duration::from_millis(
                vars.parse("OUTREACH_LLM_BASE_DELAY_MS", 500u64)?,
            ),
            ..retry_defaults
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            redis_url: vars.get("OUTREACH_REDIS_URL"),
            user_ttl: Duration::from_secs(vars.parse("OUTREACH_CACHE_TTL_SECS", 3600u64)?),
            history_max: vars.parse("OUTREACH_HISTORY_MAX", cache_defaults.history_max)?,
        };

        let outreach_defaults = OutreachConfig::default();
        let outreach = OutreachConfig {
            fanout_delay: Duration::from_millis(vars.parse("OUTREACH_FANOUT_DELAY_MS", 5000u64)?),
            min_phone_digits: vars
                .parse("OUTREACH_MIN_PHONE_DIGITS", outreach_defaults.min_phone_digits)?,
            candidate_limit: vars
                .parse("OUTREACH_CANDIDATE_LIMIT", outreach_defaults.candidate_limit)?,
        };

        let matcher_defaults = MatcherConfig::default();
        let matcher = MatcherConfig {
            poll_interval: Duration::from_secs(vars.parse("OUTREACH_MATCH_POLL_SECS", 30u64)?),
            max_attempts: vars
                .parse("OUTREACH_MATCH_MAX_ATTEMPTS", matcher_defaults.max_attempts)?,
        };

        let channels = ChannelsConfig {
            telegram_token: vars.get("TELEGRAM_BOT_TOKEN"),
            telegram_allowed_users: vars
                .get("TELEGRAM_ALLOWED_USERS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cli_enabled: vars.parse("OUTREACH_CLI", true)?,
        };

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: secrecy::SecretString::from(api_key),
                model,
            },
            retry,
            db_path: vars
                .get("OUTREACH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/outreach.db")),
            cache,
            outreach,
            matcher,
            channels,
            indexer_url: vars.get("OUTREACH_INDEXER_URL"),
            log_dir: vars.get("OUTREACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        }
    }
}
