//! Builder for camera sessions

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use sipcam_ice_core::{Rfc5389Codec, StunCodec};
use tokio::sync::watch;

use super::{ActiveCall, CameraSession, SessionInner, Subscriptions};
use crate::config::SessionConfig;
use crate::errors::{Result, SessionError};
use crate::media::{MediaPaths, PortLedger, PortReserver, UdpPortReserver};
use crate::signaling::{Camera, SignalingCallFactory};
use crate::transcoder::{FfmpegSpawner, TranscoderSpawner};
use crate::types::{RtpOptions, SessionState, SignalingOptions};

/// Assembles a [`CameraSession`] from its collaborators.
///
/// Camera, call factory, signaling options, RTP options and the signaling
/// port are required. Media paths default to UDP sockets bound on the RTP
/// option ports, ports to [`UdpPortReserver`], the transcoder to ffmpeg and
/// the STUN codec to [`Rfc5389Codec`].
#[derive(Default)]
pub struct CameraSessionBuilder {
    camera: Option<Arc<dyn Camera>>,
    call_factory: Option<Arc<dyn SignalingCallFactory>>,
    signaling_options: Option<SignalingOptions>,
    rtp_options: Option<RtpOptions>,
    signaling_port: Option<u16>,
    media: Option<MediaPaths>,
    port_reserver: Option<Arc<dyn PortReserver>>,
    transcoder: Option<Arc<dyn TranscoderSpawner>>,
    codec: Option<Arc<dyn StunCodec>>,
    config: SessionConfig,
}

impl CameraSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn call_factory(mut self, factory: Arc<dyn SignalingCallFactory>) -> Self {
        self.call_factory = Some(factory);
        self
    }

    pub fn signaling_options(mut self, options: SignalingOptions) -> Self {
        self.signaling_options = Some(options);
        self
    }

    pub fn rtp_options(mut self, options: RtpOptions) -> Self {
        self.rtp_options = Some(options);
        self
    }

    /// Local port of the SIP transport, recorded as reserved by the session
    pub fn signaling_port(mut self, port: u16) -> Self {
        self.signaling_port = Some(port);
        self
    }

    pub fn media_paths(mut self, media: MediaPaths) -> Self {
        self.media = Some(media);
        self
    }

    pub fn port_reserver(mut self, reserver: Arc<dyn PortReserver>) -> Self {
        self.port_reserver = Some(reserver);
        self
    }

    pub fn transcoder_spawner(mut self, spawner: Arc<dyn TranscoderSpawner>) -> Self {
        self.transcoder = Some(spawner);
        self
    }

    pub fn stun_codec(mut self, codec: Arc<dyn StunCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the session and create its first signaling call
    pub async fn build(self) -> Result<CameraSession> {
        self.config.validate()?;

        let camera = self.camera.ok_or_else(|| SessionError::config("camera is required"))?;
        let call_factory = self
            .call_factory
            .ok_or_else(|| SessionError::config("signaling call factory is required"))?;
        let signaling_options = self
            .signaling_options
            .ok_or_else(|| SessionError::config("signaling options are required"))?;
        let rtp_options = self
            .rtp_options
            .ok_or_else(|| SessionError::config("RTP options are required"))?;
        let signaling_port = self
            .signaling_port
            .ok_or_else(|| SessionError::config("signaling port is required"))?;

        let media = match self.media {
            Some(media) => media,
            None => MediaPaths::bind_udp(self.config.bind_ip, &rtp_options).await?,
        };

        let subscriptions = Subscriptions::new(format!("camera session {}", camera.name()));
        let call = call_factory.create_call(&signaling_options, &rtp_options, signaling_port);
        let listener = subscriptions.child_token();
        let ledger = PortLedger::new([signaling_port, rtp_options.video.port, rtp_options.audio.port]);
        let (ended_tx, _) = watch::channel(false);

        let inner = Arc::new(SessionInner {
            camera,
            call_factory,
            port_reserver: self
                .port_reserver
                .unwrap_or_else(|| Arc::new(UdpPortReserver::new(self.config.bind_ip))),
            transcoder: self.transcoder.unwrap_or_else(|| Arc::new(FfmpegSpawner)),
            codec: self.codec.unwrap_or_else(|| Arc::new(Rfc5389Codec)),
            config: self.config,
            rtp_options,
            signaling_port,
            media,
            signaling_options: Mutex::new(signaling_options),
            active_call: Mutex::new(ActiveCall {
                call: call.clone(),
                hangup_listener: listener.clone(),
            }),
            started: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            state: Mutex::new(SessionState::NotStarted),
            ledger,
            subscriptions,
            ended_tx,
        });
        inner.listen_for_remote_hangup(call, listener);

        Ok(CameraSession { inner })
    }
}
