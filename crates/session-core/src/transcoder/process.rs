//! Transcoder subprocess supervision

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SessionError};

/// What to launch and what to feed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Written to stdin, after which stdin is closed
    pub sdp: String,
    /// Prefix for relayed stdout/stderr lines
    pub log_label: String,
}

/// A running transcoder
pub trait TranscoderProcess: Send + Sync {
    /// Ask the process to terminate. Repeated calls are harmless.
    fn stop(&self);

    /// Flips to `true` once the process has exited, for whatever reason
    fn exited(&self) -> watch::Receiver<bool>;
}

/// Launches transcoders
pub trait TranscoderSpawner: Send + Sync {
    fn spawn(&self, request: TranscoderRequest) -> Result<Arc<dyn TranscoderProcess>>;
}

/// Spawns ffmpeg with `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegSpawner;

impl TranscoderSpawner for FfmpegSpawner {
    fn spawn(&self, request: TranscoderRequest) -> Result<Arc<dyn TranscoderProcess>> {
        let process = FfmpegProcess::spawn(request)?;
        Ok(Arc::new(process))
    }
}

/// Handle to a supervised ffmpeg child
pub struct FfmpegProcess {
    stop_token: CancellationToken,
    exited_rx: watch::Receiver<bool>,
}

impl FfmpegProcess {
    pub fn spawn(request: TranscoderRequest) -> Result<Self> {
        debug!("Starting {} {}", request.program, request.args.join(" "));

        let mut child = Command::new(&request.program)
            .args(&request.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::transcoder(format!("failed to start {}: {}", request.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let sdp = request.sdp;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(sdp.as_bytes()).await {
                    warn!("Failed to write SDP to transcoder stdin: {}", e);
                }
                // Dropping stdin closes the pipe so ffmpeg stops reading
            });
        }

        if let Some(stdout) = child.stdout.take() {
            relay_lines(stdout, request.log_label.clone(), false);
        }
        if let Some(stderr) = child.stderr.take() {
            relay_lines(stderr, request.log_label.clone(), true);
        }

        let stop_token = CancellationToken::new();
        let (exited_tx, exited_rx) = watch::channel(false);
        tokio::spawn(supervise(child, stop_token.clone(), exited_tx, request.log_label));

        Ok(Self { stop_token, exited_rx })
    }
}

impl TranscoderProcess for FfmpegProcess {
    fn stop(&self) {
        self.stop_token.cancel();
    }

    fn exited(&self) -> watch::Receiver<bool> {
        self.exited_rx.clone()
    }
}

async fn supervise(mut child: Child, stop_token: CancellationToken, exited_tx: watch::Sender<bool>, label: String) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => info!("{}: transcoder exited with {}", label, status),
            Err(e) => error!("{}: failed to wait for transcoder: {}", label, e),
        },
        _ = stop_token.cancelled() => {
            debug!("{}: stopping transcoder", label);
            if let Err(e) = child.kill().await {
                warn!("{}: failed to kill transcoder: {}", label, e);
            }
        }
    }

    exited_tx.send_replace(true);
}

fn relay_lines<R>(stream: R, label: String, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                error!("{}: {}", label, line);
            } else {
                info!("{}: {}", label, line);
            }
        }
    });
}
