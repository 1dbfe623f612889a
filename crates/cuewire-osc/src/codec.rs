//! OSC 1.0 packet codec
//!
//! Encodes and decodes the subset of OSC this crate speaks: a single message
//! per datagram carrying at most one `f`, `i`, `s`, `T` or `F` argument.
//! Well-formed packets go through `rosc`.
//!
//! Decoding is lenient. Packets `rosc` rejects after a valid address (missing
//! or unknown type tag, truncated payload) are re-read by a small fallback
//! reader and yield `Float(0.0)` with [`OscMessage::degraded`] set instead of
//! failing. `T` and `F` decode to [`OscValue::Trigger`]; the boolean stays
//! available through [`OscMessage::as_bool`].

use crate::types::{OscMessage, OscValue, TypeTag};
use byteorder::{BigEndian, ByteOrder};
use rosc::{OscPacket, OscType};
use thiserror::Error;
use tracing::trace;

/// Largest payload a UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Address prefix reserved for OSC bundles
pub const BUNDLE_TAG: &str = "#bundle";

/// Errors that drop an inbound packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,

    #[error("address is not null-terminated")]
    MalformedAddress,

    #[error("address is empty")]
    EmptyAddress,

    #[error("address is not valid UTF-8")]
    InvalidUtf8,

    #[error("OSC bundles are not supported")]
    BundleUnsupported,
}

/// Errors from encoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("address is empty")]
    EmptyAddress,

    #[error("{0} contains a NUL byte")]
    InteriorNul(&'static str),

    #[error("OSC encoder failed: {0}")]
    Osc(String),
}

/// Round `len` up to the next multiple of 4
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Decode one OSC message from a datagram
pub fn decode(data: &[u8]) -> Result<OscMessage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    if data.starts_with(BUNDLE_TAG.as_bytes()) {
        return Err(DecodeError::BundleUnsupported);
    }

    let message = match rosc::decoder::decode_udp(data) {
        Ok((_, OscPacket::Message(msg))) => from_rosc(msg)?,
        Ok((_, OscPacket::Bundle(_))) => return Err(DecodeError::BundleUnsupported),
        Err(e) => {
            trace!("Strict decode failed ({:?}), reading leniently", e);
            decode_lenient(data)?
        }
    };

    trace!("Decoded {} from {} bytes", message, data.len());
    Ok(message)
}

fn from_rosc(msg: rosc::OscMessage) -> Result<OscMessage, DecodeError> {
    if msg.addr.is_empty() {
        return Err(DecodeError::EmptyAddress);
    }

    let (tag, value) = match msg.args.into_iter().next() {
        None => (TypeTag::Missing, None),
        Some(OscType::Float(v)) => (TypeTag::Float, Some(OscValue::Float(v))),
        Some(OscType::Int(v)) => (TypeTag::Int, Some(OscValue::Int(v))),
        Some(OscType::String(s)) => (TypeTag::String, Some(OscValue::String(s))),
        Some(OscType::Bool(true)) => (TypeTag::True, Some(OscValue::Trigger)),
        Some(OscType::Bool(false)) => (TypeTag::False, Some(OscValue::Trigger)),
        Some(other) => (TypeTag::Unknown(unsupported_tag(&other)), None),
    };

    Ok(OscMessage {
        address: msg.addr,
        degraded: value.is_none(),
        value: value.unwrap_or(OscValue::Float(0.0)),
        tag,
    })
}

/// Wire tag of an argument type this crate does not dispatch
fn unsupported_tag(arg: &OscType) -> u8 {
    match arg {
        OscType::Blob(_) => b'b',
        OscType::Long(_) => b'h',
        OscType::Double(_) => b'd',
        OscType::Char(_) => b'c',
        OscType::Time(_) => b't',
        OscType::Nil => b'N',
        OscType::Inf => b'I',
        _ => b'?',
    }
}

/// Cursor over a datagram that never reads past the end
struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Read a null-terminated string and skip its padding
    fn read_padded(&mut self) -> Option<&'a [u8]> {
        let rest = self.data.get(self.pos..)?;
        let nul = rest.iter().position(|&b| b == 0)?;
        self.pos = padded_len(self.pos + nul + 1);
        Some(&rest[..nul])
    }

    fn read_4(&mut self) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(bytes)
    }
}

/// Fallback for packets `rosc` rejects: keep the address and read what we can
fn decode_lenient(data: &[u8]) -> Result<OscMessage, DecodeError> {
    let mut reader = PacketReader { data, pos: 0 };
    let address = reader
        .read_padded()
        .ok_or(DecodeError::MalformedAddress)?;
    if address.is_empty() {
        return Err(DecodeError::EmptyAddress);
    }
    let address = std::str::from_utf8(address).map_err(|_| DecodeError::InvalidUtf8)?;

    let tag = if data.get(reader.pos) == Some(&b',') {
        match reader.read_padded() {
            Some(tags) if tags.len() >= 2 => TypeTag::from_u8(tags[1]),
            _ => TypeTag::Missing,
        }
    } else {
        TypeTag::Missing
    };

    let value = match tag {
        TypeTag::Float => reader.read_4().map(|b| OscValue::Float(BigEndian::read_f32(b))),
        TypeTag::Int => reader.read_4().map(|b| OscValue::Int(BigEndian::read_i32(b))),
        TypeTag::String => reader
            .read_padded()
            .map(|b| OscValue::String(String::from_utf8_lossy(b).into_owned())),
        TypeTag::True | TypeTag::False => Some(OscValue::Trigger),
        TypeTag::Missing | TypeTag::Unknown(_) => None,
    };

    Ok(OscMessage {
        address: address.to_string(),
        degraded: value.is_none(),
        value: value.unwrap_or(OscValue::Float(0.0)),
        tag,
    })
}

fn to_rosc(value: &OscValue) -> OscType {
    match value {
        OscValue::Float(v) => OscType::Float(*v),
        OscValue::Int(v) => OscType::Int(*v),
        OscValue::String(s) => OscType::String(s.clone()),
        OscValue::Trigger => OscType::Bool(true),
    }
}

/// Encode an address and optional value into a datagram.
///
/// With no value only the padded address is emitted, without a type tag string.
pub fn encode(address: &str, value: Option<&OscValue>) -> Result<Vec<u8>, EncodeError> {
    let packet = OscPacket::Message(rosc::OscMessage {
        addr: address.to_string(),
        args: value.map(to_rosc).into_iter().collect(),
    });
    let mut bytes =
        rosc::encoder::encode(&packet).map_err(|e| EncodeError::Osc(format!("{:?}", e)))?;

    if value.is_none() {
        // rosc always writes a `,` tag string; the address-only form drops it
        bytes.truncate(padded_len(address.len() + 1));
    }
    Ok(bytes)
}

/// Encode after checking the address and string payload are representable
pub fn try_encode(address: &str, value: Option<&OscValue>) -> Result<Vec<u8>, EncodeError> {
    if address.is_empty() {
        return Err(EncodeError::EmptyAddress);
    }
    if address.as_bytes().contains(&0) {
        return Err(EncodeError::InteriorNul("address"));
    }
    if let Some(OscValue::String(s)) = value {
        if s.as_bytes().contains(&0) {
            return Err(EncodeError::InteriorNul("string value"));
        }
    }
    encode(address, value)
}

/// Size of the datagram [`encode`] would produce
pub fn encoded_len(address: &str, value: Option<&OscValue>) -> usize {
    let mut len = padded_len(address.len() + 1);
    if let Some(value) = value {
        len += 4;
        len += match value {
            OscValue::Float(_) | OscValue::Int(_) => 4,
            OscValue::String(s) => padded_len(s.len() + 1),
            OscValue::Trigger => 0,
        };
    }
    len
}
