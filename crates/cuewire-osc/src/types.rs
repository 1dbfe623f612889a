//! Shared types for OSC message transfer

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single OSC argument value
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    /// 32-bit IEEE-754 float (`f`)
    Float(f32),
    /// 32-bit two's complement integer (`i`)
    Int(i32),
    /// UTF-8 string (`s`)
    String(String),
    /// Impulse with no payload (`T` / `F`)
    Trigger,
}

impl OscValue {
    /// Get the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float(_) => ValueKind::Float,
            Self::Int(_) => ValueKind::Int,
            Self::String(_) => ValueKind::String,
            Self::Trigger => ValueKind::Trigger,
        }
    }

    /// Type tag character used on the wire
    pub fn tag_char(&self) -> u8 {
        match self {
            Self::Float(_) => b'f',
            Self::Int(_) => b'i',
            Self::String(_) => b's',
            Self::Trigger => b'T',
        }
    }

    /// Value as a float, widening integers
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Value as an integer. Floats convert only when lossless.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => {
                if v.is_finite()
                    && v.fract() == 0.0
                    && *v >= i32::MIN as f32
                    && *v < i32::MAX as f32
                {
                    Some(*v as i32)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Value rendered as a string. Triggers have no string form.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Float(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Trigger => None,
        }
    }
}

impl fmt::Display for OscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Trigger => f.write_str("trigger"),
        }
    }
}

impl From<f32> for OscValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i32> for OscValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for OscValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for OscValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Kind of an OSC value, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Float,
    Int,
    String,
    Trigger,
}

impl ValueKind {
    /// All kinds, in dispatch order
    pub const ALL: [ValueKind; 4] = [Self::Float, Self::Int, Self::String, Self::Trigger];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::String => "string",
            Self::Trigger => "trigger",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag as it appeared on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Float,
    Int,
    String,
    True,
    False,
    /// No `,` type tag string followed the address
    Missing,
    /// Tag character this decoder does not handle
    Unknown(u8),
}

impl TypeTag {
    /// Convert from the tag character
    pub fn from_u8(value: u8) -> Self {
        match value {
            b'f' => Self::Float,
            b'i' => Self::Int,
            b's' => Self::String,
            b'T' => Self::True,
            b'F' => Self::False,
            other => Self::Unknown(other),
        }
    }

    /// Boolean carried by `T`/`F` tags
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            _ => None,
        }
    }
}

/// Decoded inbound OSC message
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    /// Routing address, e.g. `/cue/next`
    pub address: String,
    /// The first argument
    pub value: OscValue,
    /// Tag the value was decoded from
    pub tag: TypeTag,
    /// Set when the value is the `Float(0.0)` fallback rather than wire data
    pub degraded: bool,
}

impl OscMessage {
    /// Create a well-formed message
    pub fn new(address: impl Into<String>, value: impl Into<OscValue>) -> Self {
        let value = value.into();
        let tag = match &value {
            OscValue::Float(_) => TypeTag::Float,
            OscValue::Int(_) => TypeTag::Int,
            OscValue::String(_) => TypeTag::String,
            OscValue::Trigger => TypeTag::True,
        };
        Self {
            address: address.into(),
            value,
            tag,
            degraded: false,
        }
    }

    /// Create a trigger message
    pub fn trigger(address: impl Into<String>) -> Self {
        Self::new(address, OscValue::Trigger)
    }

    /// Kind of the carried value
    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    /// Toggle state of a `T`/`F` message
    pub fn as_bool(&self) -> Option<bool> {
        self.tag.as_bool()
    }

    /// Whether trigger handlers should fire: a `T`/`F` value, or an
    /// address-only message with no type tag at all
    pub fn is_impulse(&self) -> bool {
        self.value == OscValue::Trigger || self.tag == TypeTag::Missing
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.value)?;
        if let Some(flag) = self.tag.as_bool() {
            write!(f, " ({})", if flag { "T" } else { "F" })?;
        }
        if self.degraded {
            f.write_str(" [degraded]")?;
        }
        Ok(())
    }
}
