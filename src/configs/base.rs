use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Loads `path` if given, otherwise `config.toml`, then `config.default.toml`.
    /// Falls back to built-in defaults when no file exists.
    pub fn load(path: Option<&Path>) -> AnyResult<Self> {
        let config_path = match path {
            Some(p) if p.exists() => p,
            Some(p) => return Err(format!("{} not found", p.display()).into()),
            None if Path::new("config.toml").exists() => Path::new("config.toml"),
            None if Path::new("config.default.toml").exists() => Path::new("config.default.toml"),
            None => return Ok(Self::default()),
        };

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", config_path.display()).into());
        }

        Self::parse(&config_str)
    }

    pub fn parse(source: &str) -> AnyResult<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AnyResult<()> {
        if !matches!(self.pipeline.channels, 1 | 2) {
            return Err(format!(
                "pipeline.channels must be 1 or 2, got {}",
                self.pipeline.channels
            )
            .into());
        }
        if self.pipeline.frame_buffer == 0 {
            return Err("pipeline.frame_buffer must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.pipeline.sample_rate, 48_000);
        assert_eq!(config.pipeline.channels, 2);
        assert_eq!(config.queue.resolution_timeout_secs, 30);
        assert_eq!(config.connection.idle_timeout_secs, 30);
        assert_eq!(config.transcode.program, "ffmpeg");
        assert!(!config.session.allow_corrupt);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [pipeline]
            channels = 1
            bitrate = 96000

            [session]
            allow_corrupt = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.channels, 1);
        assert_eq!(config.pipeline.bitrate, 96_000);
        assert!(config.session.allow_corrupt);
        assert_eq!(
            config.logging.and_then(|l| l.level).as_deref(),
            Some("debug")
        );
    }

    #[test]
    fn rejects_surround_layouts() {
        assert!(Config::parse("[pipeline]\nchannels = 6\n").is_err());
    }
}
