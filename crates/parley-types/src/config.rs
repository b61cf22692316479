//! Engine configuration with serde defaults.
//!
//! Every threshold the orchestration logic uses lives here, including the
//! empirically tuned constants (duo exhaustion, interruption priority).
//! Loaded from `parley.toml` by `parley-infra`; missing fields take their
//! documented defaults.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub providers: ProviderEndpoints,
}

/// Session lifecycle and scheduling thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum participants per session.
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
    /// Hard cap on turns before the session self-ends.
    #[serde(default = "default_turn_cap")]
    pub turn_cap: u32,
    /// Wall-clock cap in seconds.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    /// Social-fatigue level above which a participant counts as exhausted.
    #[serde(default = "default_fatigue_threshold")]
    pub fatigue_threshold: f32,
    /// Duo sessions end early once the topic has persisted this long
    /// while mood valence sits below `duo_exhaustion_valence`.
    #[serde(default = "default_duo_topic_exhaustion_secs")]
    pub duo_topic_exhaustion_secs: u64,
    #[serde(default = "default_duo_exhaustion_valence")]
    pub duo_exhaustion_valence: f32,
    /// Minimum priority for an interruption to be honored.
    #[serde(default = "default_interrupt_priority_threshold")]
    pub interrupt_priority_threshold: f32,
    /// Capacity of the per-session turn memory log.
    #[serde(default = "default_memory_log_capacity")]
    pub memory_log_capacity: usize,
    /// Ceiling on simultaneously active sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Interval of the staleness sweep that force-ends overdue sessions.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Consider a topic drift every N turns.
    #[serde(default = "default_topic_drift_interval")]
    pub topic_drift_interval: u32,
}

fn default_max_participants() -> usize {
    4
}
fn default_turn_cap() -> u32 {
    20
}
fn default_max_duration_secs() -> u64 {
    1800
}
fn default_fatigue_threshold() -> f32 {
    0.8
}
fn default_duo_topic_exhaustion_secs() -> u64 {
    300
}
fn default_duo_exhaustion_valence() -> f32 {
    -0.3
}
fn default_interrupt_priority_threshold() -> f32 {
    0.7
}
fn default_memory_log_capacity() -> usize {
    50
}
fn default_max_sessions() -> usize {
    64
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_topic_drift_interval() -> u32 {
    4
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_participants: default_max_participants(),
            turn_cap: default_turn_cap(),
            max_duration_secs: default_max_duration_secs(),
            fatigue_threshold: default_fatigue_threshold(),
            duo_topic_exhaustion_secs: default_duo_topic_exhaustion_secs(),
            duo_exhaustion_valence: default_duo_exhaustion_valence(),
            interrupt_priority_threshold: default_interrupt_priority_threshold(),
            memory_log_capacity: default_memory_log_capacity(),
            max_sessions: default_max_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
            topic_drift_interval: default_topic_drift_interval(),
        }
    }
}

/// Inference client timing, retry, and selection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Per-attempt deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the initial attempt before degrading to fallback.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the linear backoff (`retry_delay_ms * retry_count`).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Persona cache capacity (entries).
    #[serde(default = "default_persona_cache_capacity")]
    pub persona_cache_capacity: usize,
    /// Below this local success rate, requests route to the cloud.
    #[serde(default = "default_local_success_floor")]
    pub local_success_floor: f64,
    /// Above this prompt-complexity score, requests route to the cloud.
    #[serde(default = "default_complexity_ceiling")]
    pub complexity_ceiling: f64,
    /// Window of recent outcomes for the rolling success rate.
    #[serde(default = "default_perf_window")]
    pub perf_window: usize,
    /// Streaming-chunk flush cadence in milliseconds.
    #[serde(default = "default_stream_flush_ms")]
    pub stream_flush_ms: u64,
    /// Whether requests use the streaming path.
    #[serde(default)]
    pub streaming: bool,
    /// Token budgets sized by strategy.
    #[serde(default = "default_local_max_tokens")]
    pub local_max_tokens: u32,
    #[serde(default = "default_cloud_max_tokens")]
    pub cloud_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Local health probe interval in seconds.
    #[serde(default = "default_health_probe_interval_secs")]
    pub health_probe_interval_secs: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_persona_cache_capacity() -> usize {
    50
}
fn default_local_success_floor() -> f64 {
    0.7
}
fn default_complexity_ceiling() -> f64 {
    0.8
}
fn default_perf_window() -> usize {
    20
}
fn default_stream_flush_ms() -> u64 {
    150
}
fn default_local_max_tokens() -> u32 {
    256
}
fn default_cloud_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f64 {
    0.8
}
fn default_health_probe_interval_secs() -> u64 {
    15
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            persona_cache_capacity: default_persona_cache_capacity(),
            local_success_floor: default_local_success_floor(),
            complexity_ceiling: default_complexity_ceiling(),
            perf_window: default_perf_window(),
            stream_flush_ms: default_stream_flush_ms(),
            streaming: false,
            local_max_tokens: default_local_max_tokens(),
            cloud_max_tokens: default_cloud_max_tokens(),
            temperature: default_temperature(),
            health_probe_interval_secs: default_health_probe_interval_secs(),
        }
    }
}

/// Endpoint configuration for the two model backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_local_model")]
    pub local_model: String,
    #[serde(default = "default_cloud_base_url")]
    pub cloud_base_url: String,
    #[serde(default = "default_cloud_model")]
    pub cloud_model: String,
    /// Environment variable holding the cloud API key.
    #[serde(default = "default_cloud_api_key_env")]
    pub cloud_api_key_env: String,
}

fn default_local_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_local_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_cloud_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_cloud_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_cloud_api_key_env() -> String {
    "PARLEY_CLOUD_API_KEY".to_string()
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            local_base_url: default_local_base_url(),
            local_model: default_local_model(),
            cloud_base_url: default_cloud_base_url(),
            cloud_model: default_cloud_model(),
            cloud_api_key_env: default_cloud_api_key_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.session.max_participants, 4);
        assert_eq!(config.session.turn_cap, 20);
        assert_eq!(config.session.max_duration_secs, 1800);
        assert_eq!(config.inference.max_retries, 3);
        assert_eq!(config.inference.persona_cache_capacity, 50);
        assert!(!config.inference.streaming);
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let toml = r#"
[session]
turn_cap = 8

[inference]
streaming = true
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.session.turn_cap, 8);
        assert_eq!(config.session.max_participants, 4);
        assert!(config.inference.streaming);
        assert_eq!(config.inference.timeout_ms, 10_000);
    }

    #[test]
    fn test_heuristic_constant_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.duo_topic_exhaustion_secs, 300);
        assert!((config.duo_exhaustion_valence + 0.3).abs() < f32::EPSILON);
        assert!((config.interrupt_priority_threshold - 0.7).abs() < f32::EPSILON);
    }
}
