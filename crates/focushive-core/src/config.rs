//! Environment-driven configuration, mirroring the recognized options
//! listed for this system: JWT verification, presence tuning, timer
//! limits, partnership TTLs, and per-dependency resilience knobs.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Auth-gateway configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwks_url: Option<String>,
    pub jwt_issuer: Option<String>,
    pub clock_skew: Duration,
    pub legacy_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: env::var("JWKS_URL").ok(),
            jwt_issuer: env::var("JWT_ISSUER").ok(),
            clock_skew: Duration::from_secs(
                env_u64("JWT_CLOCK_SKEW_SEC").unwrap_or(30),
            ),
            legacy_secret: env::var("JWT_LEGACY_SECRET").ok(),
        }
    }
}

/// Presence-core tuning.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
    pub grace_period: Duration,
    pub retention: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(env_u64("PRESENCE_HEARTBEAT_SEC").unwrap_or(30)),
            stale_after: Duration::from_secs(env_u64("PRESENCE_STALE_SEC").unwrap_or(60)),
            grace_period: Duration::from_secs(env_u64("PRESENCE_GRACE_SEC").unwrap_or(30)),
            retention: Duration::from_secs(env_u64("PRESENCE_RETENTION_HOURS").unwrap_or(24) * 3600),
        }
    }
}

/// Timer-core tuning.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    pub max_duration: Duration,
    pub reconcile_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(env_u64("TIMER_MAX_DURATION_SEC").unwrap_or(4 * 3600)),
            reconcile_interval: Duration::from_secs(env_u64("TIMER_RECONCILE_INTERVAL_SEC").unwrap_or(60)),
        }
    }
}

/// Resilience-fabric tuning, per downstream dependency name (`identity`,
/// `notification`, `buddy`, ...). Reads `CB_<DEP>_*`, `RETRY_<DEP>_*`,
/// `BH_<DEP>_*`, `TL_<DEP>_*`, `RL_<DEP>_*`.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub window_size: usize,
    pub failure_rate_threshold: f64,
    pub slow_call_rate_threshold: f64,
    pub open_wait: Duration,
    pub half_open_probes: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_multiplier: f64,
    pub retry_jitter: f64,
    pub bulkhead_capacity: usize,
    pub call_timeout: Duration,
    pub rate_limit_per_hour: Option<u32>,
}

impl ResilienceConfig {
    /// Build the config for `dependency`, reading its `<PREFIX>_<DEP>_*`
    /// overrides and falling back to the documented defaults.
    pub fn for_dependency(dependency: &str) -> Self {
        let dep = dependency.to_uppercase();
        let default_timeout = if dependency == "notification" { 10 } else { 5 };
        Self {
            window_size: env_usize(&format!("CB_{dep}_WINDOW")).unwrap_or(10),
            failure_rate_threshold: env_f64(&format!("CB_{dep}_FAILURE_RATE")).unwrap_or(0.5),
            slow_call_rate_threshold: env_f64(&format!("CB_{dep}_SLOW_RATE")).unwrap_or(0.8),
            open_wait: Duration::from_secs(env_u64(&format!("CB_{dep}_OPEN_WAIT_SEC")).unwrap_or(5)),
            half_open_probes: env_usize(&format!("CB_{dep}_HALF_OPEN_PROBES")).unwrap_or(3),
            max_retries: env_u64(&format!("RETRY_{dep}_MAX")).unwrap_or(3) as u32,
            retry_base_delay: Duration::from_millis(env_u64(&format!("RETRY_{dep}_BASE_MS")).unwrap_or(1000)),
            retry_multiplier: env_f64(&format!("RETRY_{dep}_MULTIPLIER")).unwrap_or(2.0),
            retry_jitter: env_f64(&format!("RETRY_{dep}_JITTER")).unwrap_or(0.2),
            bulkhead_capacity: env_usize(&format!("BH_{dep}_CAPACITY")).unwrap_or(25),
            call_timeout: Duration::from_secs(env_u64(&format!("TL_{dep}_SEC")).unwrap_or(default_timeout)),
            rate_limit_per_hour: env_u64(&format!("RL_{dep}_PER_HOUR")).map(|v| v as u32),
        }
    }
}

/// Partnership-engine tuning.
#[derive(Debug, Clone)]
pub struct PartnershipConfig {
    pub pending_ttl: Duration,
    pub checkin_gap_tolerance: Duration,
}

impl Default for PartnershipConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(env_u64("PARTNERSHIP_PENDING_TTL_HOURS").unwrap_or(72) * 3600),
            checkin_gap_tolerance: Duration::from_secs(
                env_u64("CHECKIN_GAP_TOLERANCE_HOURS").unwrap_or(0) * 3600,
            ),
        }
    }
}

/// Per-tier request-rate ceilings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_hour: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut per_hour = HashMap::new();
        per_hour.insert("public".to_string(), env_u64("RATE_LIMIT_PUBLIC").unwrap_or(60) as u32);
        per_hour.insert(
            "authenticated".to_string(),
            env_u64("RATE_LIMIT_AUTHENTICATED").unwrap_or(600) as u32,
        );
        per_hour.insert("admin".to_string(), env_u64("RATE_LIMIT_ADMIN").unwrap_or(6000) as u32);
        Self { per_hour }
    }
}

/// Top-level configuration bundle, read once at process start and passed
/// into each core's constructor.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub auth: AuthConfig,
    pub presence: PresenceConfig,
    pub timer: TimerConfig,
    pub partnership: PartnershipConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    pub fn load() -> Self {
        Self::default()
    }

    pub fn resilience_for(&self, dependency: &str) -> ResilienceConfig {
        ResilienceConfig::for_dependency(dependency)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
