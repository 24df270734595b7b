//! Media sessions with SIP cameras
//!
//! A [`CameraSession`] invites a camera over an existing SIP signaling
//! layer, keeps the two negotiated RTP/RTCP media paths reachable across NAT
//! (ICE connectivity checks when the camera offers ICE, RTP latching when it
//! does not) and optionally hands the media to an ffmpeg transcoder.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use sipcam_session_core::prelude::*;
//! # async fn run(
//! #     camera: Arc<dyn Camera>,
//! #     calls: Arc<dyn SignalingCallFactory>,
//! #     signaling: SignalingOptions,
//! #     rtp: RtpOptions,
//! # ) -> Result<()> {
//! let session = CameraSession::builder()
//!     .camera(camera)
//!     .call_factory(calls)
//!     .signaling_options(signaling)
//!     .rtp_options(rtp)
//!     .signaling_port(5061)
//!     .build()
//!     .await?;
//!
//! let transcode = TranscodeConfig::new(vec!["-f".into(), "mpegts".into(), "udp://127.0.0.1:9000".into()]);
//! let remote = session.start(Some(transcode)).await?;
//! println!("camera media at {}", remote.address);
//!
//! session.wait_for_end().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod media;
pub mod nat;
pub mod session;
pub mod signaling;
pub mod stun;
pub mod transcoder;
pub mod types;

pub use config::{SessionConfig, TranscodeConfig, VideoTranscode};
pub use errors::{Result, SessionError, SignalingError};
pub use media::{MediaPath, MediaPaths, PortReserver, UdpMediaPath, UdpPortReserver};
pub use nat::NatStrategy;
pub use session::{CameraSession, CameraSessionBuilder};
pub use signaling::{Camera, SignalingCall, SignalingCallFactory};
pub use stun::{create_stun_responder, is_stun_message, send_stun_binding_request};
pub use transcoder::{FfmpegSpawner, TranscoderPorts, TranscoderProcess, TranscoderSpawner};
pub use types::{
    MediaKind, RtpDescription, RtpOptions, RtpStreamDescription, RtpStreamOptions, SessionState,
    SignalingOptions, SrtpParams,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export of common types
pub mod prelude {
    pub use crate::config::{SessionConfig, TranscodeConfig, VideoTranscode};
    pub use crate::errors::{Result, SessionError, SignalingError};
    pub use crate::media::{MediaPath, MediaPaths};
    pub use crate::session::CameraSession;
    pub use crate::signaling::{Camera, SignalingCall, SignalingCallFactory};
    pub use crate::types::{MediaKind, RtpDescription, RtpOptions, SignalingOptions};
}
