use std::{path::Path, time::Duration};

use async_trait::async_trait;

use super::entry::{MediaInfo, Playable, ResolvedMedia};
use crate::common::{VoiceError, VoiceResult};

/// Turns a user-supplied locator into zero or more playable items.
///
/// Unsupported input is reported as [`VoiceError::UnsupportedSource`]; an
/// empty list is treated the same way by the queue.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(
        &self,
        locator: &str,
        submitter: Option<&str>,
    ) -> VoiceResult<Vec<ResolvedMedia>>;
}

/// Hands locators straight to the transcoder: URLs as-is, local paths when
/// the file exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectResolver;

fn is_url(locator: &str) -> bool {
    ["http://", "https://", "rtmp://", "rtsp://"]
        .iter()
        .any(|scheme| locator.starts_with(scheme))
}

#[async_trait]
impl MediaResolver for DirectResolver {
    async fn resolve(
        &self,
        locator: &str,
        submitter: Option<&str>,
    ) -> VoiceResult<Vec<ResolvedMedia>> {
        let title = if is_url(locator) {
            locator
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(locator)
                .to_string()
        } else {
            let path = Path::new(locator);
            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_file() => {}
                _ => return Err(VoiceError::UnsupportedSource(locator.to_string())),
            }
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| locator.to_string())
        };

        Ok(vec![ResolvedMedia {
            info: MediaInfo {
                title,
                author: "unknown".into(),
                duration: Duration::ZERO,
                url: locator.to_string(),
                cover: None,
                submitter: submitter.map(str::to_string),
            },
            playable: Playable::Locator(locator.to_string()),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_files_resolve_to_their_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.ogg");
        std::fs::write(&path, b"OggS").unwrap();

        let locator = path.to_string_lossy();
        let media = DirectResolver.resolve(&locator, Some("kim")).await.unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].info.title, "intro");
        assert_eq!(media[0].info.submitter.as_deref(), Some("kim"));
    }

    #[tokio::test]
    async fn missing_files_are_unsupported() {
        let result = DirectResolver.resolve("/nonexistent/track.mp3", None).await;
        assert!(matches!(result, Err(VoiceError::UnsupportedSource(_))));
    }

    #[tokio::test]
    async fn urls_pass_through() {
        let media = DirectResolver
            .resolve("https://cdn.example.com/music/song.mp3", None)
            .await
            .unwrap();
        assert_eq!(media[0].info.title, "song.mp3");
        assert!(matches!(&media[0].playable, Playable::Locator(l) if l.ends_with("song.mp3")));
    }
}
