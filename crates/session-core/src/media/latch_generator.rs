//! Synthetic RTP packets for NAT latching
//!
//! Some cameras only start sending once they have received media on the
//! negotiated port. Header-only RTP packets are enough to open the binding.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::MediaKind;

/// Initial sequence number of audio latch packets
pub const AUDIO_LATCH_SEQUENCE: u16 = 0;

/// Initial sequence number of video latch packets, away from the audio range
pub const VIDEO_LATCH_SEQUENCE: u16 = 99;

const RTP_VERSION: u8 = 2;
const RTP_HEADER_SIZE: usize = 12;

/// Produces an endless run of RTP packets for one media leg
#[derive(Debug, Clone)]
pub struct RtpLatchGenerator {
    payload_type: u8,
    sequence: u16,
    timestamp: u32,
    timestamp_step: u32,
    ssrc: u32,
}

impl RtpLatchGenerator {
    /// Generator for `kind` starting at `initial_sequence`
    pub fn new(kind: MediaKind, initial_sequence: u16) -> Self {
        let (payload_type, timestamp_step) = match kind {
            // PCMU, 20ms at 8kHz
            MediaKind::Audio => (0, 160),
            // H264, one frame at 15fps on a 90kHz clock
            MediaKind::Video => (99, 6000),
        };

        Self {
            payload_type,
            sequence: initial_sequence,
            timestamp: rand::random(),
            timestamp_step,
            ssrc: rand::random(),
        }
    }

    /// Generator seeded with the fixed per-type sequence number
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => Self::new(kind, AUDIO_LATCH_SEQUENCE),
            MediaKind::Video => Self::new(kind, VIDEO_LATCH_SEQUENCE),
        }
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn next_packet(&mut self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE);
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(self.payload_type & 0x7F);
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_step);

        buf.freeze()
    }
}

impl Iterator for RtpLatchGenerator {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        Some(self.next_packet())
    }
}
