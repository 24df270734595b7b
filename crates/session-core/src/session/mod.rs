//! Camera session orchestration
//!
//! A [`CameraSession`] is single use. `start` reserves the transcoder ports,
//! invites the camera, keeps the media paths reachable and optionally hands
//! the media to a transcoder. Every way a session can end (explicit stop,
//! remote hang-up, transcoder exit, failed start) goes through one teardown
//! that releases each resource exactly once.

mod builder;
mod handoff;
pub mod subscriptions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sipcam_ice_core::StunCodec;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, TranscodeConfig};
use crate::errors::{Result, SessionError};
use crate::media::{MediaPaths, PortLedger, PortReserver};
use crate::nat::{start_nat_traversal, NatContext};
use crate::signaling::{Camera, SignalingCall, SignalingCallFactory};
use crate::transcoder::{TranscoderPorts, TranscoderSpawner};
use crate::types::{RtpDescription, RtpOptions, SessionState, SignalingOptions};

pub use builder::CameraSessionBuilder;
pub use subscriptions::Subscriptions;

// Upper bound on waiting for the BYE before the call is destroyed anyway
const BYE_TIMEOUT: Duration = Duration::from_secs(2);

/// One media session with a camera
#[derive(Clone)]
pub struct CameraSession {
    inner: Arc<SessionInner>,
}

struct ActiveCall {
    call: Arc<dyn SignalingCall>,
    // Cancelled when the call is replaced
    hangup_listener: CancellationToken,
}

pub(crate) struct SessionInner {
    camera: Arc<dyn Camera>,
    call_factory: Arc<dyn SignalingCallFactory>,
    port_reserver: Arc<dyn PortReserver>,
    transcoder: Arc<dyn TranscoderSpawner>,
    codec: Arc<dyn StunCodec>,
    config: SessionConfig,
    rtp_options: RtpOptions,
    signaling_port: u16,
    media: MediaPaths,
    signaling_options: Mutex<SignalingOptions>,
    active_call: Mutex<ActiveCall>,
    started: AtomicBool,
    ended: AtomicBool,
    state: Mutex<SessionState>,
    ledger: PortLedger,
    subscriptions: Subscriptions,
    ended_tx: watch::Sender<bool>,
}

impl CameraSession {
    pub fn builder() -> CameraSessionBuilder {
        CameraSessionBuilder::new()
    }

    /// Negotiate media with the camera.
    ///
    /// Fails with [`SessionError::AlreadyStarted`] or
    /// [`SessionError::AlreadyEnded`] on reuse, without touching a running
    /// session. An expired signaling session is retried with fresh options
    /// from the camera; any other failure ends the session before it is
    /// returned.
    pub async fn start(&self, transcode: Option<TranscodeConfig>) -> Result<RtpDescription> {
        let inner = &self.inner;

        loop {
            if inner.started.swap(true, Ordering::SeqCst) {
                return Err(SessionError::AlreadyStarted);
            }
            if inner.is_ended() || !inner.set_state(SessionState::Starting) {
                return Err(SessionError::AlreadyEnded);
            }
            info!(camera = %inner.camera.name(), "Starting camera session");

            let error = match inner.negotiate(transcode.as_ref()).await {
                Ok(_) if inner.is_ended() => return Err(SessionError::AlreadyEnded),
                Ok(remote) => {
                    if !inner.set_state(SessionState::Active) {
                        return Err(SessionError::AlreadyEnded);
                    }
                    info!(camera = %inner.camera.name(), "Camera session active");
                    return Ok(remote);
                }
                Err(e) => e,
            };

            if !error.is_session_expired() {
                warn!(camera = %inner.camera.name(), "Camera session failed to start: {}", error);
                inner.call_ended(true).await;
                return Err(error);
            }

            debug!(camera = %inner.camera.name(), "Signaling session expired, renewing");
            let dialog_id = inner.signaling_options.lock().dialog_id.clone();
            let options = match inner.camera.updated_signaling_options(&dialog_id).await {
                Ok(options) => options,
                Err(e) => {
                    warn!(camera = %inner.camera.name(), "Failed to renew signaling options: {}", e);
                    inner.call_ended(true).await;
                    return Err(e.into());
                }
            };

            if inner.is_ended() {
                return Err(SessionError::AlreadyEnded);
            }
            inner.replace_call(options);
            inner.started.store(false, Ordering::SeqCst);
            if !inner.set_state(SessionState::NotStarted) {
                return Err(SessionError::AlreadyEnded);
            }
        }
    }

    /// End the session and hang up. Does nothing once the session has ended.
    pub async fn stop(&self) {
        self.inner.call_ended(true).await;
    }

    pub async fn request_key_frame(&self) -> Result<()> {
        self.inner.current_call().request_key_frame().await?;
        Ok(())
    }

    pub async fn activate_camera_speaker(&self) -> Result<()> {
        self.inner.current_call().activate_camera_speaker().await?;
        Ok(())
    }

    /// End-of-call notification. Flips to `true` once; late subscribers
    /// still see it.
    pub fn on_call_ended(&self) -> watch::Receiver<bool> {
        self.inner.ended_tx.subscribe()
    }

    /// Resolve once the session has ended
    pub async fn wait_for_end(&self) {
        let mut ended = self.on_call_ended();
        // The sender lives as long as the session, so this only fails if it
        // was dropped, which also means ended
        let _ = ended.wait_for(|ended| *ended).await;
    }

    /// Every port reserved on behalf of this session and not yet released
    pub fn reserved_ports(&self) -> Vec<u16> {
        self.inner.ledger.snapshot()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.is_ended()
    }

    pub fn rtp_options(&self) -> &RtpOptions {
        &self.inner.rtp_options
    }

    pub fn signaling_options(&self) -> SignalingOptions {
        self.inner.signaling_options.lock().clone()
    }

    pub fn camera_name(&self) -> &str {
        self.inner.camera.name()
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("camera", &self.inner.camera.name())
            .field("state", &self.state())
            .field("reserved_ports", &self.reserved_ports())
            .finish()
    }
}

impl SessionInner {
    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Move to `state` unless the session already ended. `Ended` is terminal.
    fn set_state(&self, state: SessionState) -> bool {
        let mut current = self.state.lock();
        if *current == SessionState::Ended {
            return false;
        }
        *current = state;
        true
    }

    fn current_call(&self) -> Arc<dyn SignalingCall> {
        self.active_call.lock().call.clone()
    }

    /// One pass of `start`: ports, invite, NAT traversal, transcoder
    async fn negotiate(self: &Arc<Self>, transcode: Option<&TranscodeConfig>) -> Result<RtpDescription> {
        let video_port = self.reserve_port_pair().await?;
        let audio_port = self.reserve_port_pair().await?;

        let call = self.current_call();
        let remote = call.invite().await?;
        if self.is_ended() {
            return Err(SessionError::AlreadyEnded);
        }
        debug!("Invite accepted, remote media at {}", remote.address);

        let strategy = start_nat_traversal(&NatContext {
            media: &self.media,
            remote: &remote,
            call: &call,
            codec: &self.codec,
            config: &self.config,
            subscriptions: &self.subscriptions,
        });
        debug!("Using {} NAT traversal", strategy);

        if let Some(config) = transcode {
            let ports = TranscoderPorts {
                audio: audio_port,
                video: video_port,
            };
            handoff::start_transcoder(self, config, &remote, ports)?;
        }

        Ok(remote)
    }

    /// Reserve an RTP/RTCP pair and record it in the ledger
    async fn reserve_port_pair(&self) -> Result<u16> {
        let ports = self.port_reserver.reserve_ports(2).await?;
        let Some(&first) = ports.first() else {
            return Err(SessionError::port_reservation("reserver returned no ports"));
        };

        if self.is_ended() {
            // Teardown already drained the ledger
            self.port_reserver.release_ports(&ports);
            return Err(SessionError::AlreadyEnded);
        }
        self.ledger.append(&ports);
        Ok(first)
    }

    /// Swap in a call built from `options`, destroying the previous one
    fn replace_call(self: &Arc<Self>, options: SignalingOptions) {
        let call = self
            .call_factory
            .create_call(&options, &self.rtp_options, self.signaling_port);
        let listener = self.subscriptions.child_token();

        let previous = std::mem::replace(
            &mut *self.active_call.lock(),
            ActiveCall {
                call: call.clone(),
                hangup_listener: listener.clone(),
            },
        );
        previous.hangup_listener.cancel();
        previous.call.destroy();

        *self.signaling_options.lock() = options;
        self.listen_for_remote_hangup(call, listener);
    }

    fn listen_for_remote_hangup(self: &Arc<Self>, call: Arc<dyn SignalingCall>, token: CancellationToken) {
        let mut ended_by_remote = call.ended_by_remote();
        let session = Arc::downgrade(self);

        self.subscriptions.spawn_until(
            token,
            "remote hangup",
            async move {
                let hung_up = ended_by_remote.wait_for(|ended| *ended).await.is_ok();
                hung_up
            },
            move |hung_up| async move {
                if !hung_up {
                    return;
                }
                if let Some(session) = session.upgrade() {
                    info!(camera = %session.camera.name(), "Call ended by camera");
                    session.call_ended(false).await;
                }
            },
        );
    }

    fn request_key_frame_in_background(&self) {
        let call = self.current_call();
        self.subscriptions.spawn("key frame request", async move {
            if let Err(e) = call.request_key_frame().await {
                warn!("Failed to request key frame: {}", e);
            }
        });
    }

    /// The single teardown path. Only the first call has any effect.
    pub(crate) async fn call_ended(&self, notify_remote: bool) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(SessionState::Ended);
        info!(camera = %self.camera.name(), "Camera session ended");

        self.ended_tx.send_replace(true);

        let call = self.current_call();
        if notify_remote {
            // Local teardown does not wait for the camera; the call outlives
            // it until the BYE has gone out
            tokio::spawn(hang_up(call));
        } else {
            call.destroy();
        }
        self.release_resources();
    }

    fn release_resources(&self) {
        self.media.video.close();
        self.media.audio.close();
        self.subscriptions.dispose_all();

        let ports = self.ledger.take_all();
        if !ports.is_empty() {
            self.port_reserver.release_ports(&ports);
        }
    }
}

/// Send the BYE, then destroy the call
async fn hang_up(call: Arc<dyn SignalingCall>) {
    match tokio::time::timeout(BYE_TIMEOUT, call.send_bye()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to send BYE: {}", e),
        Err(_) => warn!("Timed out sending BYE"),
    }
    call.destroy();
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // Dropped without being stopped: release everything, no BYE
        if !self.ended.swap(true, Ordering::SeqCst) {
            debug!(camera = %self.camera.name(), "Camera session dropped while live");
            self.ended_tx.send_replace(true);
            self.current_call().destroy();
            self.release_resources();
        }
    }
}
