//! Negotiated media description types

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Media type of one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// SDES master key and salt for one SRTP leg
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrtpParams {
    pub key: Vec<u8>,
    pub salt: Vec<u8>,
}

impl SrtpParams {
    pub fn new(key: impl Into<Vec<u8>>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            salt: salt.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.salt.is_empty()
    }
}

/// One locally allocated media leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpStreamOptions {
    pub port: u16,
    pub rtcp_port: u16,
    pub srtp: SrtpParams,
}

/// Local audio and video legs, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpOptions {
    pub audio: RtpStreamOptions,
    pub video: RtpStreamOptions,
}

impl RtpOptions {
    pub fn stream(&self, kind: MediaKind) -> &RtpStreamOptions {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

/// Remote counterpart of [`RtpStreamOptions`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpStreamDescription {
    pub port: u16,
    pub rtcp_port: u16,
    pub srtp: SrtpParams,
    pub ssrc: Option<u32>,
    /// ICE username fragment; absent when the remote does not do ICE
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
}

impl RtpStreamDescription {
    /// Username fragment and password, when both were offered
    pub fn ice_credentials(&self) -> Option<(&str, &str)> {
        match (&self.ice_ufrag, &self.ice_pwd) {
            (Some(ufrag), Some(pwd)) => Some((ufrag.as_str(), pwd.as_str())),
            _ => None,
        }
    }
}

/// Remote media description returned by the signaling invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpDescription {
    pub address: IpAddr,
    pub audio: RtpStreamDescription,
    pub video: RtpStreamDescription,
}

impl RtpDescription {
    pub fn stream(&self, kind: MediaKind) -> &RtpStreamDescription {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    /// Remote RTP endpoint for `kind`
    pub fn rtp_addr(&self, kind: MediaKind) -> SocketAddr {
        SocketAddr::new(self.address, self.stream(kind).port)
    }

    /// Remote RTCP endpoint for `kind`
    pub fn rtcp_addr(&self, kind: MediaKind) -> SocketAddr {
        SocketAddr::new(self.address, self.stream(kind).rtcp_port)
    }

    /// The remote offers ICE when the video leg carries a username fragment
    pub fn offers_ice(&self) -> bool {
        self.video.ice_ufrag.is_some()
    }
}

/// Parameters used to build a signaling call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingOptions {
    pub to: String,
    pub from: String,
    /// Identifier of the camera-side dialog this call belongs to
    pub dialog_id: String,
    pub local_ip: IpAddr,
}

/// Lifecycle of a camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Starting,
    Active,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}
