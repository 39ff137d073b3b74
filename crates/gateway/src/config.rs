use common::Environment;
use inference::DetectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: Environment,
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub model: DetectorConfig,
    pub detection: DetectionSettings,
    /// OTLP collector. Telemetry export stays off when unset.
    #[serde(default)]
    pub otel_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub local_root: PathBuf,
    #[serde(default)]
    pub bucket: Option<String>,
    pub region: String,
    /// S3-compatible endpoint such as MinIO. Switches to path-style URLs.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionSettings {
    pub default_threshold: f32,
}

/// Defaults, then the optional TOML file named by `GATEWAY_CONFIG`
/// (`gateway.toml` otherwise), then `GATEWAY__*` environment variables.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let path = std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    load_from(Path::new(&path))
}

pub fn load_from(path: &Path) -> Result<Settings, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("environment", Environment::from_env().as_str())?
        .set_default("server.addr", "0.0.0.0:5000")?
        .set_default("server.body_limit_bytes", 16 * 1024 * 1024)?
        .set_default("storage.backend", "local")?
        .set_default("storage.local_root", ".")?
        .set_default("storage.region", "us-east-1")?
        .set_default("model.path", "models/pothole.onnx")?
        .set_default("detection.default_threshold", 0.5)?
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("model.class_names")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize::<Settings>()
}
