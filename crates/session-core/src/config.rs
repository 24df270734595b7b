//! Session and transcoder configuration

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a camera session.
///
/// Timings are stored in milliseconds so the struct deserializes from plain
/// numbers in any serde format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between STUN keep-alive probes on the latch path
    pub keep_alive_interval_ms: u64,

    /// Interval between synthetic RTP latch packets
    pub latch_interval_ms: u64,

    /// How long an ICE binding request waits for its response before the
    /// failure is logged
    pub stun_request_timeout_ms: u64,

    /// Transcoder executable
    pub ffmpeg_path: String,

    /// Local address media paths bind to when the session creates them itself
    pub bind_ip: IpAddr,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: 500,
            latch_interval_ms: 60,
            stun_request_timeout_ms: 3000,
            ffmpeg_path: "ffmpeg".to_string(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl SessionConfig {
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_latch_interval(mut self, interval: Duration) -> Self {
        self.latch_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stun_request_timeout(mut self, timeout: Duration) -> Self {
        self.stun_request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn latch_interval(&self) -> Duration {
        Duration::from_millis(self.latch_interval_ms)
    }

    pub fn stun_request_timeout(&self) -> Duration {
        Duration::from_millis(self.stun_request_timeout_ms)
    }

    /// Reject values that would make timers spin
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.keep_alive_interval_ms == 0 {
            return Err(crate::errors::SessionError::config("keep_alive_interval_ms must be non-zero"));
        }
        if self.latch_interval_ms == 0 {
            return Err(crate::errors::SessionError::config("latch_interval_ms must be non-zero"));
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(crate::errors::SessionError::config("ffmpeg_path must not be empty"));
        }
        Ok(())
    }
}

/// What the transcoder does with the video stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoTranscode {
    /// Pass video through untouched (`-vcodec copy`)
    #[default]
    Copy,
    /// Caller supplied video arguments
    Args(Vec<String>),
    /// Leave video out of the transcoder input entirely
    Disabled,
}

/// Caller-supplied transcoder arguments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Extra arguments placed before `-i pipe:`
    pub input: Vec<String>,

    /// Audio arguments; `None` selects `-acodec aac`
    pub audio: Option<Vec<String>>,

    pub video: VideoTranscode,

    /// Output arguments, usually ending in the destination
    pub output: Vec<String>,

    /// Low-latency start: tiny probe, no buffering, no video re-encode args
    pub quick_start: bool,
}

impl TranscodeConfig {
    pub fn new(output: Vec<String>) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn video_enabled(&self) -> bool {
        self.video != VideoTranscode::Disabled
    }
}
