//! Engine configuration loader.
//!
//! Reads `parley.toml` from a directory and deserializes it into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed; a bad config file must never stop the engine.

use std::path::Path;

use parley_types::config::EngineConfig;

/// Load engine configuration from `{dir}/parley.toml`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
/// - Otherwise: the parsed config, with missing fields defaulted.
pub async fn load_engine_config(dir: &Path) -> EngineConfig {
    let config_path = dir.join("parley.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no parley.toml at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!(
                "failed to read {}: {err}, using defaults",
                config_path.display()
            );
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}
