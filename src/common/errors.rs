use std::time::Duration;

use thiserror::Error;

/// Every failure the voice core reports to its callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VoiceError {
    /// Missing capability: join/speak on a channel, or corrupt mode.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Resolution finished without anything playable.
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("resolution of '{locator}' timed out after {timeout:?}")]
    ResolutionTimeout { locator: String, timeout: Duration },

    /// Index into the queue or the effect stack is out of range.
    #[error("entry {0} does not exist")]
    NotFound(usize),

    /// Failure after playback of an entry started.
    #[error("streaming failed: {0}")]
    Streaming(String),

    /// A bounded collection (effect stack, overlay layers) is full.
    #[error("limit reached: {0}")]
    Limit(String),

    /// Connection or subprocess failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl VoiceError {
    /// Wraps any `Display`-able failure as a transport error.
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    pub fn streaming<E: std::fmt::Display>(e: E) -> Self {
        Self::Streaming(e.to_string())
    }
}

impl From<std::io::Error> for VoiceError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type VoiceResult<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_become_transport_errors() {
        let err: VoiceError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err, VoiceError::Transport("pipe closed".into()));
    }

    #[test]
    fn timeout_message_names_locator() {
        let err = VoiceError::ResolutionTimeout {
            locator: "https://example.com/a.mp3".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("https://example.com/a.mp3"));
    }
}
