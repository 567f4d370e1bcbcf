//! `audio/transcode` — external transcoder (ffmpeg) wrapped as a byte transform.
//!
//! Arbitrary container/codec input goes in through the child's stdin (or is
//! opened by the child from a locator), s16le PCM in the pipeline's layout
//! comes out of its stdout.
//!
//! Writes await the pipe, so a slow child stalls the producer instead of
//! growing a buffer. Writes after the input was closed are dropped.

pub mod effects;

pub use effects::{AudioEffect, EffectStack};

use std::{
    io,
    pin::Pin,
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use crate::{
    common::{VoiceError, VoiceResult},
    configs::TranscodeConfig,
};

/// Byte stream handed to the transcoder's stdin.
pub type MediaStream = Pin<Box<dyn AsyncRead + Send>>;

/// What the child reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeInput {
    /// The child opens the file or URL itself; stdin is unused.
    Locator(String),
    /// Input arrives through [`Transcoder::write`] / [`Transcoder::pipe_from`].
    Pipe,
}

impl TranscodeInput {
    fn as_arg(&self) -> &str {
        match self {
            Self::Locator(locator) => locator,
            Self::Pipe => "pipe:0",
        }
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Locator(_))
    }
}

pub struct Transcoder {
    program: String,
    pre: Vec<String>,
    args: Vec<String>,
    input: TranscodeInput,
    sample_rate: u32,
    channels: usize,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    start_time: Option<Instant>,
}

impl Transcoder {
    pub fn new(
        config: &TranscodeConfig,
        input: TranscodeInput,
        sample_rate: u32,
        channels: usize,
    ) -> Self {
        Self {
            program: config.program.clone(),
            pre: config.pre_args.clone(),
            args: config.args.clone(),
            input,
            sample_rate,
            channels,
            child: None,
            stdin: None,
            stdout: None,
            start_time: None,
        }
    }

    /// Extra output arguments (e.g. an `-af` graph), appended after the
    /// configured ones.
    pub fn with_args(mut self, extra: Vec<String>) -> Self {
        self.args.extend(extra);
        self
    }

    /// `[pre] -i <input> [args] -f s16le -ar <rate> -ac <channels> pipe:1`
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = self.pre.clone();
        argv.extend(["-i".to_string(), self.input.as_arg().to_string()]);
        argv.extend(self.args.iter().cloned());
        argv.extend([
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            self.channels.to_string(),
            "pipe:1".to_string(),
        ]);
        argv
    }

    /// Spawns the child, killing any previous instance first.
    pub async fn start(&mut self) -> VoiceResult<()> {
        self.kill_current().await;

        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }

        let argv = self.command_line();
        debug!("spawning {} {}", self.program, argv.join(" "));

        let stdin = match self.input {
            TranscodeInput::Pipe => Stdio::piped(),
            TranscodeInput::Locator(_) => Stdio::null(),
        };
        let mut child = Command::new(&self.program)
            .args(&argv)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Transport(format!("failed to spawn {}: {}", self.program, e)))?;

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();
        self.child = Some(child);
        Ok(())
    }

    /// Replaces the output arguments and starts over, optionally seeking the
    /// input to `seek`. Only meaningful for locator inputs: piped input that
    /// was already consumed cannot be replayed.
    pub async fn restart(&mut self, args: Vec<String>, seek: Option<Duration>) -> VoiceResult<()> {
        self.args = args;
        if let Some(i) = self.pre.iter().position(|a| a == "-ss") {
            let end = (i + 2).min(self.pre.len());
            self.pre.drain(i..end);
        }
        if let Some(pos) = seek {
            self.pre
                .extend(["-ss".to_string(), format!("{:.3}", pos.as_secs_f64())]);
        }
        self.start().await
    }

    /// Forward input bytes to the child. Dropped silently once the input
    /// side is closed (ended, or the child already exited).
    pub async fn write(&mut self, chunk: &[u8]) -> VoiceResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(());
        };
        match stdin.write_all(chunk).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("transcoder input closed, dropping {} bytes", chunk.len());
                self.stdin = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upstream finished: close stdin so the child can flush and exit.
    pub async fn end(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
    }

    pub fn is_input_closed(&self) -> bool {
        self.stdin.is_none()
    }

    /// Copies `reader` into the child on a separate task, then closes the
    /// input. The copy waits on the pipe, so memory stays bounded.
    pub fn pipe_from(&mut self, mut reader: MediaStream) -> Option<JoinHandle<io::Result<u64>>> {
        let mut stdin = self.stdin.take()?;
        Some(tokio::spawn(async move {
            let copied = tokio::io::copy(&mut reader, &mut stdin).await;
            let _ = stdin.shutdown().await;
            match copied {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(0),
                other => other,
            }
        }))
    }

    /// Read converted PCM. `Ok(0)` means the child exited and its output
    /// ended; a non-zero exit status is reported as a streaming error.
    pub async fn read(&mut self, buf: &mut [u8]) -> VoiceResult<usize> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(0);
        };
        let n = stdout.read(buf).await.map_err(VoiceError::streaming)?;
        if n == 0 {
            self.stdout = None;
            if let Some(mut child) = self.child.take() {
                let status = child.wait().await.map_err(VoiceError::streaming)?;
                if !status.success() {
                    return Err(VoiceError::Streaming(format!(
                        "{} exited with {}",
                        self.program, status
                    )));
                }
            }
        }
        Ok(n)
    }

    /// Wall time since the first start.
    pub fn time_passed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn input(&self) -> &TranscodeInput {
        &self.input
    }

    async fn kill_current(&mut self) {
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill {}: {}", self.program, e);
                }
            }
        }
    }

    /// Force-kills the child if it is still running.
    pub async fn destroy(&mut self) {
        self.kill_current().await;
    }
}
