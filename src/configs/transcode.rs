use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TranscodeConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before `-i`.
    #[serde(default = "default_pre_args")]
    pub pre_args: Vec<String>,
    /// Arguments placed after the input, before the PCM output options.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            pre_args: default_pre_args(),
            args: Vec::new(),
        }
    }
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_pre_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
