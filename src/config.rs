use crate::audio::CaptureConfig;
use crate::converse::ConverseConfig;
use crate::pipeline::{PatientProfile, PipelineConfig};
use crate::vad::VadConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Service configuration, loaded from a TOML file with every section
/// optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub audio: CaptureConfig,

    #[serde(default)]
    pub vad: VadConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub converse: ConverseConfig,

    #[serde(default)]
    pub profile: PatientProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_service_name() -> String {
    "drwatson-voice".to_string()
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.audio.validate()?;
        Ok(config)
    }
}
