//! Mock collaborators for camera session tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use sipcam_session_core::media::{ForwardTarget, HandlerChain, HandlerId, InboundMessage, MessageHandler};
use sipcam_session_core::transcoder::TranscoderRequest;
use sipcam_session_core::{
    Camera, CameraSession, MediaKind, MediaPath, MediaPaths, PortReserver, Result, RtpDescription,
    RtpOptions, RtpStreamDescription, RtpStreamOptions, SessionConfig, SessionError, SignalingCall,
    SignalingCallFactory, SignalingError, SignalingOptions, SrtpParams, TranscoderProcess,
    TranscoderSpawner,
};

pub const SIGNALING_PORT: u16 = 5061;
pub const LOCAL_AUDIO_PORT: u16 = 10000;
pub const LOCAL_VIDEO_PORT: u16 = 10002;
pub const FIRST_RESERVED_PORT: u16 = 40000;

/// Shared, ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|event| event.starts_with(prefix)).count()
    }
}

pub fn remote_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10))
}

/// Remote description without ICE, which selects RTP latching
pub fn latch_description() -> RtpDescription {
    RtpDescription {
        address: remote_addr(),
        audio: RtpStreamDescription {
            port: 20000,
            rtcp_port: 20001,
            srtp: SrtpParams::new(vec![0x11; 16], vec![0x22; 14]),
            ssrc: Some(1111),
            ..Default::default()
        },
        video: RtpStreamDescription {
            port: 20002,
            rtcp_port: 20003,
            srtp: SrtpParams::new(vec![0x33; 16], vec![0x44; 14]),
            ssrc: Some(2222),
            ..Default::default()
        },
    }
}

/// Remote description offering ICE credentials `abc`/`xyz` on both legs
pub fn ice_description() -> RtpDescription {
    let mut description = latch_description();
    for stream in [&mut description.audio, &mut description.video] {
        stream.ice_ufrag = Some("abc".into());
        stream.ice_pwd = Some("xyz".into());
    }
    description
}

pub fn rtp_options() -> RtpOptions {
    RtpOptions {
        audio: RtpStreamOptions {
            port: LOCAL_AUDIO_PORT,
            rtcp_port: LOCAL_AUDIO_PORT + 1,
            srtp: SrtpParams::new(vec![0x55; 16], vec![0x66; 14]),
        },
        video: RtpStreamOptions {
            port: LOCAL_VIDEO_PORT,
            rtcp_port: LOCAL_VIDEO_PORT + 1,
            srtp: SrtpParams::new(vec![0x77; 16], vec![0x88; 14]),
        },
    }
}

pub fn signaling_options(dialog_id: &str) -> SignalingOptions {
    SignalingOptions {
        to: "sip:camera@example.com".into(),
        from: "sip:viewer@example.com".into(),
        dialog_id: dialog_id.into(),
        local_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
    }
}

pub fn local_ufrag(kind: MediaKind) -> String {
    format!("local-{}", kind)
}

/// Media path that records sends and lets tests inject inbound datagrams
pub struct RecordingMediaPath {
    port: u16,
    handlers: HandlerChain,
    messages_tx: broadcast::Sender<InboundMessage>,
    sent: Mutex<Vec<(Bytes, SocketAddr)>>,
    forwarded: Mutex<Vec<(Bytes, u16)>>,
    close_count: AtomicUsize,
    closed: AtomicBool,
}

impl RecordingMediaPath {
    pub fn new(port: u16) -> Arc<Self> {
        let (messages_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            port,
            handlers: HandlerChain::new(),
            messages_tx,
            sent: Mutex::new(Vec::new()),
            forwarded: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Deliver a datagram as if it arrived from `source`
    pub fn inject(&self, data: &[u8], source: SocketAddr) -> Option<ForwardTarget> {
        let message = InboundMessage::new(Bytes::copy_from_slice(data), source);
        let _ = self.messages_tx.send(message.clone());
        let target = self.handlers.route(&message);
        if let Some(ForwardTarget { port }) = target {
            self.forwarded.lock().push((message.message, port));
        }
        target
    }

    pub fn sent(&self) -> Vec<(Bytes, SocketAddr)> {
        self.sent.lock().clone()
    }

    pub fn sent_stun(&self) -> Vec<(Bytes, SocketAddr)> {
        self.sent()
            .into_iter()
            .filter(|(data, _)| sipcam_session_core::is_stun_message(data))
            .collect()
    }

    pub fn sent_media(&self) -> Vec<(Bytes, SocketAddr)> {
        self.sent()
            .into_iter()
            .filter(|(data, _)| !sipcam_session_core::is_stun_message(data))
            .collect()
    }

    pub fn forwarded(&self) -> Vec<(Bytes, u16)> {
        self.forwarded.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait]
impl MediaPath for RecordingMediaPath {
    fn local_port(&self) -> u16 {
        self.port
    }

    fn add_message_handler(&self, handler: MessageHandler) -> HandlerId {
        self.handlers.add(handler)
    }

    fn remove_message_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }

    async fn send(&self, data: Bytes, target: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::MediaPathClosed);
        }
        self.sent.lock().push((data, target));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.messages_tx.subscribe()
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Signaling call with a scripted invite outcome
pub struct MockCall {
    pub index: usize,
    events: EventLog,
    invite_result: Mutex<Option<std::result::Result<RtpDescription, SignalingError>>>,
    hangup_tx: watch::Sender<bool>,
    bye_delay: Mutex<Duration>,
}

impl MockCall {
    /// Make the camera take `delay` to answer the BYE
    pub fn delay_bye(&self, delay: Duration) {
        *self.bye_delay.lock() = delay;
    }

    /// Simulate the camera hanging up
    pub fn hang_up(&self) {
        self.hangup_tx.send_replace(true);
    }
}

#[async_trait]
impl SignalingCall for MockCall {
    async fn invite(&self) -> std::result::Result<RtpDescription, SignalingError> {
        self.events.push(format!("invite:{}", self.index));
        self.invite_result
            .lock()
            .take()
            .unwrap_or_else(|| Err(SignalingError::other("invite already used")))
    }

    async fn request_key_frame(&self) -> std::result::Result<(), SignalingError> {
        self.events.push(format!("key-frame:{}", self.index));
        Ok(())
    }

    async fn activate_camera_speaker(&self) -> std::result::Result<(), SignalingError> {
        self.events.push(format!("speaker:{}", self.index));
        Ok(())
    }

    async fn send_bye(&self) -> std::result::Result<(), SignalingError> {
        let delay = *self.bye_delay.lock();
        tokio::time::sleep(delay).await;
        self.events.push(format!("bye:{}", self.index));
        Ok(())
    }

    fn destroy(&self) {
        self.events.push(format!("destroy:{}", self.index));
    }

    fn ended_by_remote(&self) -> watch::Receiver<bool> {
        self.hangup_tx.subscribe()
    }

    fn local_ufrag(&self, kind: MediaKind) -> String {
        local_ufrag(kind)
    }
}

/// Hands out [`MockCall`]s whose invites resolve to the scripted outcomes in order
pub struct MockCallFactory {
    events: EventLog,
    script: Mutex<VecDeque<std::result::Result<RtpDescription, SignalingError>>>,
    calls: Mutex<Vec<Arc<MockCall>>>,
}

impl MockCallFactory {
    pub fn new(events: EventLog, script: Vec<std::result::Result<RtpDescription, SignalingError>>) -> Arc<Self> {
        Arc::new(Self {
            events,
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call(&self, index: usize) -> Arc<MockCall> {
        self.calls.lock()[index].clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl SignalingCallFactory for MockCallFactory {
    fn create_call(
        &self,
        options: &SignalingOptions,
        _rtp_options: &RtpOptions,
        signaling_port: u16,
    ) -> Arc<dyn SignalingCall> {
        let mut calls = self.calls.lock();
        let index = calls.len();
        self.events
            .push(format!("create:{}:{}:{}", index, options.dialog_id, signaling_port));

        let (hangup_tx, _) = watch::channel(false);
        let call = Arc::new(MockCall {
            index,
            events: self.events.clone(),
            invite_result: Mutex::new(self.script.lock().pop_front()),
            hangup_tx,
            bye_delay: Mutex::new(Duration::ZERO),
        });
        calls.push(call.clone());
        call
    }
}

pub struct MockCamera {
    events: EventLog,
    fail_renewal: bool,
}

#[async_trait]
impl Camera for MockCamera {
    fn name(&self) -> &str {
        "Front Door"
    }

    async fn updated_signaling_options(
        &self,
        dialog_id: &str,
    ) -> std::result::Result<SignalingOptions, SignalingError> {
        self.events.push(format!("renew:{}", dialog_id));
        if self.fail_renewal {
            return Err(SignalingError::Transport {
                message: "camera unreachable".into(),
            });
        }
        Ok(signaling_options("renewed"))
    }
}

/// Hands out consecutive port numbers and records releases
pub struct RecordingPortReserver {
    next: AtomicU16,
    releases: Mutex<Vec<Vec<u16>>>,
}

impl RecordingPortReserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU16::new(FIRST_RESERVED_PORT),
            releases: Mutex::new(Vec::new()),
        })
    }

    pub fn releases(&self) -> Vec<Vec<u16>> {
        self.releases.lock().clone()
    }
}

#[async_trait]
impl PortReserver for RecordingPortReserver {
    async fn reserve_ports(&self, count: usize) -> Result<Vec<u16>> {
        let first = self.next.fetch_add(count as u16, Ordering::SeqCst);
        Ok((0..count as u16).map(|offset| first + offset).collect())
    }

    fn release_ports(&self, ports: &[u16]) {
        self.releases.lock().push(ports.to_vec());
    }
}

pub struct FakeTranscoder {
    pub stops: AtomicUsize,
    exited_tx: watch::Sender<bool>,
}

impl FakeTranscoder {
    /// Simulate the process exiting on its own
    pub fn exit(&self) {
        self.exited_tx.send_replace(true);
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl TranscoderProcess for FakeTranscoder {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn exited(&self) -> watch::Receiver<bool> {
        self.exited_tx.subscribe()
    }
}

#[derive(Default)]
pub struct FakeTranscoderSpawner {
    requests: Mutex<Vec<TranscoderRequest>>,
    processes: Mutex<Vec<Arc<FakeTranscoder>>>,
    exit_on_spawn: AtomicBool,
}

impl FakeTranscoderSpawner {
    /// Processes spawned from now on report that they exited right away
    pub fn exit_on_spawn(&self) {
        self.exit_on_spawn.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<TranscoderRequest> {
        self.requests.lock().clone()
    }

    pub fn process(&self, index: usize) -> Arc<FakeTranscoder> {
        self.processes.lock()[index].clone()
    }
}

impl TranscoderSpawner for FakeTranscoderSpawner {
    fn spawn(&self, request: TranscoderRequest) -> Result<Arc<dyn TranscoderProcess>> {
        self.requests.lock().push(request);
        let (exited_tx, _) = watch::channel(self.exit_on_spawn.load(Ordering::SeqCst));
        let process = Arc::new(FakeTranscoder {
            stops: AtomicUsize::new(0),
            exited_tx,
        });
        self.processes.lock().push(process.clone());
        Ok(process)
    }
}

/// A session wired to mock collaborators
pub struct Harness {
    pub session: CameraSession,
    pub audio: Arc<RecordingMediaPath>,
    pub video: Arc<RecordingMediaPath>,
    pub calls: Arc<MockCallFactory>,
    pub ports: Arc<RecordingPortReserver>,
    pub transcoder: Arc<FakeTranscoderSpawner>,
    pub events: EventLog,
}

impl Harness {
    pub async fn new(script: Vec<std::result::Result<RtpDescription, SignalingError>>) -> Self {
        Self::with_camera(script, false).await
    }

    pub async fn with_camera(
        script: Vec<std::result::Result<RtpDescription, SignalingError>>,
        fail_renewal: bool,
    ) -> Self {
        let events = EventLog::default();
        let audio = RecordingMediaPath::new(LOCAL_AUDIO_PORT);
        let video = RecordingMediaPath::new(LOCAL_VIDEO_PORT);
        let calls = MockCallFactory::new(events.clone(), script);
        let ports = RecordingPortReserver::new();
        let transcoder = Arc::new(FakeTranscoderSpawner::default());

        let session = CameraSession::builder()
            .camera(Arc::new(MockCamera {
                events: events.clone(),
                fail_renewal,
            }))
            .call_factory(calls.clone())
            .signaling_options(signaling_options("dialog-1"))
            .rtp_options(rtp_options())
            .signaling_port(SIGNALING_PORT)
            .media_paths(MediaPaths::new(audio.clone(), video.clone()))
            .port_reserver(ports.clone())
            .transcoder_spawner(transcoder.clone())
            .config(SessionConfig::default())
            .build()
            .await
            .expect("build session");

        Self {
            session,
            audio,
            video,
            calls,
            ports,
            transcoder,
            events,
        }
    }

    pub fn remote_endpoint(&self, kind: MediaKind) -> SocketAddr {
        latch_description().rtp_addr(kind)
    }
}

/// Give spawned session tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
