//! STUN binding messages (RFC 5389)
//!
//! Only the subset needed to hold media paths open is implemented: Binding
//! requests and responses, USERNAME, XOR-MAPPED-ADDRESS and
//! MESSAGE-INTEGRITY. Unknown attributes survive a decode/encode cycle
//! untouched.

use std::net::{IpAddr, SocketAddr};

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// STUN message header size (20 bytes)
pub const STUN_HEADER_SIZE: usize = 20;

/// STUN magic cookie value (RFC 5389 section 6)
pub const STUN_MAGIC_COOKIE: u32 = 0x2112A442;

/// Size of an encoded MESSAGE-INTEGRITY attribute including its header
const MESSAGE_INTEGRITY_SIZE: usize = 24;

/// Cheap discriminator separating STUN control traffic from media sharing a socket.
///
/// True iff the buffer is longer than 8 bytes and carries the magic cookie at
/// offset 4. No further validation happens here; use [`StunMessage::decode`]
/// for that.
pub fn is_stun_message(data: &[u8]) -> bool {
    data.len() > 8 && BigEndian::read_u32(&data[4..8]) == STUN_MAGIC_COOKIE
}

/// Message classes a media path has to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunMessageType {
    BindingRequest,
    BindingResponse,
    BindingErrorResponse,
    /// Binding indication, occasionally used as a bare keep-alive
    BindingIndication,
    Other(u16),
}

const MESSAGE_TYPE_CODES: [(StunMessageType, u16); 4] = [
    (StunMessageType::BindingRequest, 0x0001),
    (StunMessageType::BindingIndication, 0x0011),
    (StunMessageType::BindingResponse, 0x0101),
    (StunMessageType::BindingErrorResponse, 0x0111),
];

impl StunMessageType {
    /// Wire value of the message type field
    pub fn to_u16(self) -> u16 {
        if let Self::Other(code) = self {
            return code;
        }
        MESSAGE_TYPE_CODES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or(0, |(_, code)| *code)
    }

    pub fn from_u16(code: u16) -> Self {
        MESSAGE_TYPE_CODES
            .iter()
            .find(|(_, known)| *known == code)
            .map_or(Self::Other(code), |(kind, _)| *kind)
    }
}

/// Attributes understood by this crate; everything else is carried as `Other`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunAttributeType {
    MappedAddress,
    Username,
    MessageIntegrity,
    ErrorCode,
    XorMappedAddress,
    Software,
    Fingerprint,
    Other(u16),
}

const ATTRIBUTE_CODES: [(StunAttributeType, u16); 7] = [
    (StunAttributeType::MappedAddress, 0x0001),
    (StunAttributeType::Username, 0x0006),
    (StunAttributeType::MessageIntegrity, 0x0008),
    (StunAttributeType::ErrorCode, 0x0009),
    (StunAttributeType::XorMappedAddress, 0x0020),
    (StunAttributeType::Software, 0x8022),
    (StunAttributeType::Fingerprint, 0x8028),
];

impl From<u16> for StunAttributeType {
    fn from(code: u16) -> Self {
        ATTRIBUTE_CODES
            .iter()
            .find(|(_, known)| *known == code)
            .map_or(Self::Other(code), |(kind, _)| *kind)
    }
}

impl From<StunAttributeType> for u16 {
    fn from(kind: StunAttributeType) -> Self {
        if let StunAttributeType::Other(code) = kind {
            return code;
        }
        ATTRIBUTE_CODES
            .iter()
            .find(|(known, _)| *known == kind)
            .map_or(0, |(_, code)| *code)
    }
}

/// STUN attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunAttribute {
    pub attr_type: StunAttributeType,
    pub value: Bytes,
}

impl StunAttribute {
    pub fn new(attr_type: StunAttributeType, value: Bytes) -> Self {
        Self { attr_type, value }
    }

    /// Create a XOR-MAPPED-ADDRESS attribute for the observed source of a request
    pub fn xor_mapped_address(addr: SocketAddr, transaction_id: &[u8; 12]) -> Self {
        let mut value = BytesMut::with_capacity(20);
        value.put_u8(0);
        value.put_u8(match addr.ip() {
            IpAddr::V4(_) => 0x01,
            IpAddr::V6(_) => 0x02,
        });
        value.put_u16(addr.port() ^ (STUN_MAGIC_COOKIE >> 16) as u16);

        match addr.ip() {
            IpAddr::V4(ipv4) => {
                value.put_u32(u32::from_be_bytes(ipv4.octets()) ^ STUN_MAGIC_COOKIE);
            }
            IpAddr::V6(ipv6) => {
                let mut octets = ipv6.octets();
                xor_v6(&mut octets, transaction_id);
                value.put_slice(&octets);
            }
        }

        Self::new(StunAttributeType::XorMappedAddress, value.freeze())
    }

    /// Create a USERNAME attribute
    pub fn username(username: &str) -> Self {
        Self::new(StunAttributeType::Username, Bytes::copy_from_slice(username.as_bytes()))
    }

    /// Create a SOFTWARE attribute
    pub fn software(software: &str) -> Self {
        Self::new(StunAttributeType::Software, Bytes::copy_from_slice(software.as_bytes()))
    }

    /// Read back the address carried by a XOR-MAPPED-ADDRESS attribute
    pub fn get_xor_mapped_address(&self, transaction_id: &[u8; 12]) -> Result<SocketAddr> {
        if self.attr_type != StunAttributeType::XorMappedAddress {
            return Err(Error::stun("Not a XOR-MAPPED-ADDRESS attribute"));
        }
        if self.value.len() < 8 {
            return Err(Error::stun("XOR-MAPPED-ADDRESS too short"));
        }

        let mut value = self.value.clone();
        value.advance(1);
        let family = value.get_u8();
        let port = value.get_u16() ^ (STUN_MAGIC_COOKIE >> 16) as u16;

        let ip = match family {
            0x01 => IpAddr::from((value.get_u32() ^ STUN_MAGIC_COOKIE).to_be_bytes()),
            0x02 if value.remaining() >= 16 => {
                let mut octets = [0u8; 16];
                value.copy_to_slice(&mut octets);
                xor_v6(&mut octets, transaction_id);
                IpAddr::from(octets)
            }
            _ => return Err(Error::stun(format!("Unsupported address family: {}", family))),
        };

        Ok(SocketAddr::new(ip, port))
    }
}

fn xor_v6(octets: &mut [u8; 16], transaction_id: &[u8; 12]) {
    let cookie = STUN_MAGIC_COOKIE.to_be_bytes();
    for (i, byte) in octets.iter_mut().enumerate() {
        *byte ^= if i < 4 { cookie[i] } else { transaction_id[i - 4] };
    }
}

/// STUN message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub msg_type: StunMessageType,
    pub transaction_id: [u8; 12],
    pub attributes: Vec<StunAttribute>,
}

impl StunMessage {
    /// Create a new message with a random transaction id
    pub fn new(msg_type: StunMessageType) -> Self {
        let mut transaction_id = [0u8; 12];
        rand::thread_rng().fill(&mut transaction_id);
        Self::with_transaction_id(msg_type, transaction_id)
    }

    pub fn with_transaction_id(msg_type: StunMessageType, transaction_id: [u8; 12]) -> Self {
        Self {
            msg_type,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    pub fn binding_request() -> Self {
        Self::new(StunMessageType::BindingRequest)
    }

    /// Binding response answering the request with `transaction_id`
    pub fn binding_response(transaction_id: [u8; 12]) -> Self {
        Self::with_transaction_id(StunMessageType::BindingResponse, transaction_id)
    }

    pub fn add_attribute(&mut self, attr: StunAttribute) -> &mut Self {
        self.attributes.push(attr);
        self
    }

    pub fn get_attribute(&self, attr_type: StunAttributeType) -> Option<&StunAttribute> {
        self.attributes.iter().find(|attr| attr.attr_type == attr_type)
    }

    /// USERNAME attribute as text, if present and valid UTF-8
    pub fn username(&self) -> Option<&str> {
        self.get_attribute(StunAttributeType::Username)
            .and_then(|attr| std::str::from_utf8(&attr.value).ok())
    }

    /// Encode message to bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = self.encode_header_and_attributes();
        let msg_len = buf.len() - STUN_HEADER_SIZE;
        BigEndian::write_u16(&mut buf[2..4], msg_len as u16);
        buf.freeze()
    }

    /// Encode message followed by a MESSAGE-INTEGRITY attribute keyed with `key`.
    ///
    /// For ICE short-term credentials the key is the peer's password. The
    /// length field covers the MESSAGE-INTEGRITY attribute before the HMAC is
    /// computed, as RFC 5389 section 15.4 requires.
    pub fn encode_with_integrity(&self, key: &[u8]) -> Result<Bytes> {
        let mut buf = self.encode_header_and_attributes();
        let msg_len = buf.len() - STUN_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE;
        BigEndian::write_u16(&mut buf[2..4], msg_len as u16);

        let mut mac = HmacSha1::new_from_slice(key)
            .map_err(|e| Error::Integrity(e.to_string()))?;
        mac.update(&buf);
        let digest = mac.finalize().into_bytes();

        buf.put_u16(StunAttributeType::MessageIntegrity.into());
        buf.put_u16(digest.len() as u16);
        buf.put_slice(&digest);

        Ok(buf.freeze())
    }

    fn encode_header_and_attributes(&self) -> BytesMut {
        let attr_size: usize = self
            .attributes
            .iter()
            .map(|attr| 4 + padded_len(attr.value.len()))
            .sum();

        let mut buf =
            BytesMut::with_capacity(STUN_HEADER_SIZE + attr_size + MESSAGE_INTEGRITY_SIZE);
        buf.put_u16(self.msg_type.to_u16());
        buf.put_u16(0);
        buf.put_u32(STUN_MAGIC_COOKIE);
        buf.put_slice(&self.transaction_id);

        for attr in &self.attributes {
            buf.put_u16(attr.attr_type.into());
            buf.put_u16(attr.value.len() as u16);
            buf.put_slice(&attr.value);
            buf.put_bytes(0, padded_len(attr.value.len()) - attr.value.len());
        }

        buf
    }

    /// Decode message from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < STUN_HEADER_SIZE {
            return Err(Error::stun("Packet too small for STUN header"));
        }

        // The two most significant bits of every STUN message are zero
        if (bytes[0] & 0xC0) != 0 {
            return Err(Error::stun("Invalid STUN message"));
        }

        let msg_type = StunMessageType::from_u16(BigEndian::read_u16(&bytes[0..2]));
        let msg_length = BigEndian::read_u16(&bytes[2..4]) as usize;

        if BigEndian::read_u32(&bytes[4..8]) != STUN_MAGIC_COOKIE {
            return Err(Error::stun("Invalid STUN magic cookie"));
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[8..20]);

        let end = STUN_HEADER_SIZE + msg_length;
        if bytes.len() < end {
            return Err(Error::stun("Packet too small for STUN attributes"));
        }

        let mut attributes = Vec::new();
        let mut offset = STUN_HEADER_SIZE;

        while offset < end {
            if offset + 4 > end {
                return Err(Error::stun("Incomplete STUN attribute"));
            }

            let attr_type = BigEndian::read_u16(&bytes[offset..offset + 2]);
            let attr_length = BigEndian::read_u16(&bytes[offset + 2..offset + 4]) as usize;
            offset += 4;

            if offset + attr_length > end {
                return Err(Error::stun("Incomplete STUN attribute value"));
            }

            attributes.push(StunAttribute {
                attr_type: attr_type.into(),
                value: Bytes::copy_from_slice(&bytes[offset..offset + attr_length]),
            });
            offset += padded_len(attr_length);
        }

        Ok(Self {
            msg_type,
            transaction_id,
            attributes,
        })
    }
}

/// Check the MESSAGE-INTEGRITY attribute of an encoded message against `key`.
///
/// Returns `Ok(false)` when the message carries no MESSAGE-INTEGRITY.
pub fn verify_message_integrity(bytes: &[u8], key: &[u8]) -> Result<bool> {
    if bytes.len() < STUN_HEADER_SIZE || !is_stun_message(bytes) {
        return Err(Error::stun("Not a STUN message"));
    }

    let end = (STUN_HEADER_SIZE + BigEndian::read_u16(&bytes[2..4]) as usize).min(bytes.len());
    let mut offset = STUN_HEADER_SIZE;

    while offset + 4 <= end {
        let attr_type = StunAttributeType::from(BigEndian::read_u16(&bytes[offset..offset + 2]));
        let attr_length = BigEndian::read_u16(&bytes[offset + 2..offset + 4]) as usize;

        if attr_type == StunAttributeType::MessageIntegrity {
            let value_start = offset + 4;
            if attr_length != 20 || value_start + 20 > bytes.len() {
                return Err(Error::Integrity("Malformed MESSAGE-INTEGRITY".to_string()));
            }

            let mut covered = bytes[..offset].to_vec();
            let covered_len = offset - STUN_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE;
            BigEndian::write_u16(&mut covered[2..4], covered_len as u16);

            let mut mac = HmacSha1::new_from_slice(key)
                .map_err(|e| Error::Integrity(e.to_string()))?;
            mac.update(&covered);
            return Ok(mac.verify_slice(&bytes[value_start..value_start + 20]).is_ok());
        }

        offset += 4 + padded_len(attr_length);
    }

    Ok(false)
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}
