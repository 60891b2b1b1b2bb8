use serde::Deserialize;
use std::time::Duration;

/// Default browser/bot identities rotated across requests
pub const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:53.0) Gecko/20100101 Firefox/53.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/51.0.2704.79 Safari/537.36 Edge/14.14393",
    "Mozilla/5.0 (Linux; Android 6.0.1; SAMSUNG SM-G570Y Build/MMB29K) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/4.0 Chrome/44.0.2403.133 Mobile Safari/537.36",
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
];

/// Main configuration structure for oid-walker
///
/// Every section is optional; a missing config file is equivalent to an
/// empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Worker pool and frontier behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of fetch/extract workers
    pub walkers: usize,

    /// Number of workers writing discovered identifiers to the frontier
    pub register_workers: usize,

    /// Number of workers finalizing processed identifiers
    pub finalize_workers: usize,

    /// Capacity of each bounded stream between stages
    pub channel_capacity: usize,

    /// Sleep between frontier polls when it is empty (milliseconds)
    pub idle_backoff_ms: u64,

    /// Consecutive idle polls with no in-flight work before the crawl ends.
    /// Zero keeps the crawl running until a fatal error or interrupt.
    pub idle_rounds: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            walkers: 5,
            register_workers: 5,
            finalize_workers: 5,
            channel_capacity: 5,
            idle_backoff_ms: 500,
            idle_rounds: 20,
        }
    }
}

impl CrawlerConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// HTTP fetching behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Base address that identifiers are appended to
    pub base_url: String,

    /// Identifier the crawl starts from when the frontier is empty
    pub root: String,

    /// Attempts per fetch before cooling down
    pub max_attempts: u32,

    /// Pause between consecutive attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Cooldown after all attempts fail (seconds)
    pub cooldown_secs: u64,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Pool of User-Agent values, one picked at random per request
    pub user_agents: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://oidref.com".to_string(),
            root: "/".to_string(),
            max_attempts: 10,
            retry_delay_ms: 250,
            cooldown_secs: 60,
            timeout_secs: 30,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "mibs.sqlite".to_string(),
        }
    }
}
