use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration derived from environment variables.
///
/// Variable names match the ones the uploader deployment already exports, so
/// the same env file can be shared between the uploaders and this service.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,
    pub version: String,

    // ── Origins (CORS + WS upgrade) ────────────────────────────────
    /// `["*"]` allows every origin; an empty list allows none.
    pub allowed_origins: Vec<String>,

    // ── Tick data ──────────────────────────────────────────────────
    pub data_dirs: Vec<PathBuf>,
    pub cache_ttl: Duration,
    /// Zero disables the periodic full reload.
    pub reload_interval: Duration,
    pub default_resolution_ticks: u32,

    // ── Sessions ───────────────────────────────────────────────────
    pub session_cookie: String,
}

pub const DEFAULT_DATA_DIRS: &str = "/data/cedro-ticker-uploader,/data/massive-ticker-uploader";

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl HubConfig {
    pub fn from_env() -> Self {
        let data_dirs = parse_csv_list(&env_str("DATA_DIRS", DEFAULT_DATA_DIRS))
            .into_iter()
            .map(PathBuf::from)
            .collect();

        Self {
            bind: env_str("BIND", "0.0.0.0"),
            port: env_u16("PORT", 8080),
            version: env_str("APP_VERSION", "dev"),
            allowed_origins: parse_csv_list(&env_str("BFF_ALLOWED_ORIGINS", "*")),
            data_dirs,
            cache_ttl: Duration::from_secs(env_u64("TIMEFRAME_CACHE_TTL_SECS", 60).max(1)),
            reload_interval: Duration::from_secs(env_u64("DATA_RELOAD_INTERVAL_SECS", 30 * 60)),
            default_resolution_ticks: env_u32("DEFAULT_RESOLUTION_TICKS", 5000).max(2),
            session_cookie: env_str("SESSION_COOKIE", "mvr_session"),
        }
    }

    /// Case-insensitive origin check shared by the CORS layer and the WS upgrade.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.iter().any(|o| o == "*") {
            return true;
        }
        self.allowed_origins
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(origin))
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            version: "dev".to_string(),
            allowed_origins: vec!["*".to_string()],
            data_dirs: Vec::new(),
            cache_ttl: Duration::from_secs(60),
            reload_interval: Duration::ZERO,
            default_resolution_ticks: 5000,
            session_cookie: "mvr_session".to_string(),
        }
    }
}
