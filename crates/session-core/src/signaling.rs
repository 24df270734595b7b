//! Signaling collaborators consumed by a camera session
//!
//! The SIP dialog itself (transport, authentication, message framing) lives
//! behind these traits. A session only needs to invite, poke the camera,
//! hang up, and learn when the remote hung up first.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::SignalingError;
use crate::types::{MediaKind, RtpDescription, RtpOptions, SignalingOptions};

/// One SIP call to a camera
#[async_trait]
pub trait SignalingCall: Send + Sync {
    /// Send the INVITE and return the remote media description.
    ///
    /// Fails with [`SignalingError::SessionExpired`] when the camera-side
    /// dialog is no longer valid.
    async fn invite(&self) -> Result<RtpDescription, SignalingError>;

    async fn request_key_frame(&self) -> Result<(), SignalingError>;

    async fn activate_camera_speaker(&self) -> Result<(), SignalingError>;

    async fn send_bye(&self) -> Result<(), SignalingError>;

    /// Release the dialog and its transport. Called exactly once per call.
    fn destroy(&self);

    /// Flips to `true` when the remote ends the call on its own
    fn ended_by_remote(&self) -> watch::Receiver<bool>;

    /// Local ICE username fragment offered for `kind`
    fn local_ufrag(&self, kind: MediaKind) -> String;
}

/// Builds signaling calls for a session
pub trait SignalingCallFactory: Send + Sync {
    fn create_call(
        &self,
        options: &SignalingOptions,
        rtp_options: &RtpOptions,
        signaling_port: u16,
    ) -> Arc<dyn SignalingCall>;
}

/// The camera a session talks to
#[async_trait]
pub trait Camera: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Fresh signaling options for a dialog whose previous session expired
    async fn updated_signaling_options(
        &self,
        dialog_id: &str,
    ) -> Result<SignalingOptions, SignalingError>;
}
