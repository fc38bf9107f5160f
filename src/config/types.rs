use serde::Deserialize;

/// Main configuration structure for Tidewatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
}

/// Remote API connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the REST API (e.g. "https://api.example.com/1.1")
    pub base_url: String,

    /// Bearer token; `TIDEWATCH_BEARER_TOKEN` takes precedence when set
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// How relations of a seed are fetched and exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationDetail {
    /// Identifier lists only (large pages, one call per 5000 relations)
    Ids,
    /// Full profile records (small pages, exports profiles too)
    Profiles,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Wall-clock budget of a single session (seconds)
    #[serde(default = "default_session_budget")]
    pub session_budget_secs: u64,

    /// Concurrent sessions per track
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Attempts per call before a transient failure becomes terminal
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between transient retries (milliseconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Length of the provider's quota window (seconds)
    #[serde(default = "default_quota_window")]
    pub quota_window_secs: u64,

    /// How long a frontier claim stays valid (seconds)
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    #[serde(default = "default_content_page_size")]
    pub content_page_size: u32,

    #[serde(default = "default_ids_page_size")]
    pub ids_page_size: u32,

    #[serde(default = "default_profiles_page_size")]
    pub profiles_page_size: u32,

    /// Upper bound on content pages walked per entity and fetch
    #[serde(default = "default_max_content_pages")]
    pub max_content_pages: u32,

    #[serde(default = "default_relation_detail")]
    pub relation_detail: RelationDetail,
}

/// Frontier database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

/// Export sink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving the JSON Lines files
    pub directory: String,
}

/// Seed entities inserted before every run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontierConfig {
    #[serde(default)]
    pub seeds: Vec<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            session_budget_secs: default_session_budget(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            quota_window_secs: default_quota_window(),
            claim_lease_secs: default_claim_lease(),
            content_page_size: default_content_page_size(),
            ids_page_size: default_ids_page_size(),
            profiles_page_size: default_profiles_page_size(),
            max_content_pages: default_max_content_pages(),
            relation_detail: default_relation_detail(),
        }
    }
}

fn default_user_agent() -> String {
    format!("tidewatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_session_budget() -> u64 {
    180
}

fn default_workers() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    8
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_quota_window() -> u64 {
    180
}

fn default_claim_lease() -> u64 {
    900
}

fn default_content_page_size() -> u32 {
    200
}

fn default_ids_page_size() -> u32 {
    5000
}

fn default_profiles_page_size() -> u32 {
    200
}

fn default_max_content_pages() -> u32 {
    16
}

fn default_relation_detail() -> RelationDetail {
    RelationDetail::Ids
}
