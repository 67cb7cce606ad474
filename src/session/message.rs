//! Parsed tag-value messages and the errors the session layer produces.

use super::tags;
use crate::order::{Price, PriceParseError};
use bitflags::bitflags;
use std::fmt;

/// How a frame error is counted by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameErrorClass {
    /// Malformed bytes: bad framing, bad field syntax, oversized frame.
    Parse,
    /// The checksum trailer did not match the byte sum.
    Checksum,
    /// Structurally parsed but semantically unusable.
    Invalid,
}

/// Errors produced while framing, parsing or translating a message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// A field was not `tag=value` or carried invalid bytes.
    #[error("malformed field at offset {0}")]
    MalformedField(usize),
    /// The `9=` body length was missing or non-numeric.
    #[error("invalid body length")]
    BadBodyLength,
    /// The frame would exceed the configured bound.
    #[error("frame of {size} bytes exceeds bound {bound}")]
    FrameTooLarge {
        /// Declared total frame size.
        size: usize,
        /// Configured bound.
        bound: usize,
    },
    /// The trailer was not `10=NNN<SOH>` where expected.
    #[error("malformed trailer")]
    BadTrailer,
    /// Byte-sum checksum mismatch.
    #[error("checksum mismatch: frame says {stated:03}, computed {computed:03}")]
    ChecksumMismatch {
        /// Value carried in the `10=` field.
        stated: u8,
        /// Value computed over the frame bytes.
        computed: u8,
    },
    /// A required header field was absent.
    #[error("missing required header fields: {missing:?}")]
    MissingRequiredFields {
        /// The absent fields.
        missing: HeaderFields,
    },
    /// The session exceeded its frame-error budget and was torn down.
    #[error("session closed after repeated frame errors")]
    SessionClosed,
    /// A message type the venue does not consume inbound.
    #[error("unsupported inbound message type '{0}'")]
    UnsupportedMsgType(String),
    /// A business field required for translation was absent.
    #[error("missing field {0}")]
    MissingField(u32),
    /// A business field failed to parse.
    #[error("bad value '{value}' for field {tag}")]
    BadFieldValue {
        /// The offending tag.
        tag: u32,
        /// The offending value.
        value: String,
    },
}

impl SessionError {
    /// Which decoder counter this error increments.
    pub fn class(&self) -> FrameErrorClass {
        match self {
            SessionError::ChecksumMismatch { .. } => FrameErrorClass::Checksum,
            SessionError::MissingRequiredFields { .. }
            | SessionError::UnsupportedMsgType(_)
            | SessionError::MissingField(_)
            | SessionError::BadFieldValue { .. } => FrameErrorClass::Invalid,
            _ => FrameErrorClass::Parse,
        }
    }
}

impl From<PriceParseError> for SessionError {
    fn from(err: PriceParseError) -> Self {
        SessionError::BadFieldValue {
            tag: tags::PRICE,
            value: err.to_string(),
        }
    }
}

bitflags! {
    /// Presence bits for the required header and trailer fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFields: u16 {
        const BEGIN_STRING   = 1 << 0;
        const BODY_LENGTH    = 1 << 1;
        const MSG_TYPE       = 1 << 2;
        const MSG_SEQ_NUM    = 1 << 3;
        const SENDER_COMP_ID = 1 << 4;
        const TARGET_COMP_ID = 1 << 5;
        const SENDING_TIME   = 1 << 6;
        const CHECK_SUM      = 1 << 7;
    }
}

impl HeaderFields {
    /// Every field a valid application frame must carry.
    pub const REQUIRED: HeaderFields = HeaderFields::all();
}

impl Default for HeaderFields {
    fn default() -> Self {
        HeaderFields::empty()
    }
}

/// One tag-value pair in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixField {
    /// Numeric tag.
    pub tag: u32,
    /// Raw value bytes as a string.
    pub value: String,
}

/// A parsed, checksum-verified session frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixMessage {
    /// Protocol identifier from tag 8.
    pub begin_string: String,
    /// Declared body length from tag 9.
    pub body_length: u32,
    /// Message type from tag 35.
    pub msg_type: String,
    /// Sequence number from tag 34.
    pub msg_seq_num: u32,
    /// Sender from tag 49.
    pub sender_comp_id: String,
    /// Target from tag 56.
    pub target_comp_id: String,
    /// Sending time from tag 52, uninterpreted.
    pub sending_time: String,
    /// Stated checksum from tag 10.
    pub checksum: u8,
    fields: Vec<FixField>,
    present: HeaderFields,
}

impl FixMessage {
    /// Parse and validate a complete raw frame (header through trailer).
    ///
    /// Verifies the mod-256 byte-sum over everything before the `10=`
    /// tag, then the presence of all required header fields.
    pub fn parse(raw: &[u8]) -> Result<Self, SessionError> {
        if raw.len() < tags::TRAILER_LEN || raw.last() != Some(&tags::SOH) {
            return Err(SessionError::BadTrailer);
        }
        let trailer_start = raw.len() - tags::TRAILER_LEN;
        if &raw[trailer_start..trailer_start + 3] != b"10=" {
            return Err(SessionError::BadTrailer);
        }
        let computed = checksum(&raw[..trailer_start]);

        let mut message = FixMessage::default();
        let mut offset = 0usize;
        for field_bytes in raw.split(|&b| b == tags::SOH) {
            if field_bytes.is_empty() {
                offset += 1;
                continue;
            }
            let field_offset = offset;
            offset += field_bytes.len() + 1;

            let text = std::str::from_utf8(field_bytes)
                .map_err(|_| SessionError::MalformedField(field_offset))?;
            let (tag_str, value) = text
                .split_once('=')
                .ok_or(SessionError::MalformedField(field_offset))?;
            let tag: u32 = tag_str
                .parse()
                .map_err(|_| SessionError::MalformedField(field_offset))?;
            message.set_field(tag, value.to_string())?;
        }

        let missing = HeaderFields::REQUIRED - message.present;
        if !missing.is_empty() {
            return Err(SessionError::MissingRequiredFields { missing });
        }
        if computed != message.checksum {
            return Err(SessionError::ChecksumMismatch {
                stated: message.checksum,
                computed,
            });
        }
        Ok(message)
    }

    /// Append a field, mirroring recognised header tags into their typed
    /// slots.
    pub fn set_field(&mut self, tag: u32, value: String) -> Result<(), SessionError> {
        match tag {
            tags::BEGIN_STRING => {
                self.begin_string = value.clone();
                self.present |= HeaderFields::BEGIN_STRING;
            }
            tags::BODY_LENGTH => {
                self.body_length = value.parse().map_err(|_| SessionError::BadBodyLength)?;
                self.present |= HeaderFields::BODY_LENGTH;
            }
            tags::MSG_TYPE => {
                self.msg_type = value.clone();
                self.present |= HeaderFields::MSG_TYPE;
            }
            tags::MSG_SEQ_NUM => {
                self.msg_seq_num = value.parse().map_err(|_| SessionError::BadFieldValue {
                    tag,
                    value: value.clone(),
                })?;
                self.present |= HeaderFields::MSG_SEQ_NUM;
            }
            tags::SENDER_COMP_ID => {
                self.sender_comp_id = value.clone();
                self.present |= HeaderFields::SENDER_COMP_ID;
            }
            tags::TARGET_COMP_ID => {
                self.target_comp_id = value.clone();
                self.present |= HeaderFields::TARGET_COMP_ID;
            }
            tags::SENDING_TIME => {
                self.sending_time = value.clone();
                self.present |= HeaderFields::SENDING_TIME;
            }
            tags::CHECK_SUM => {
                self.checksum = value.parse().map_err(|_| SessionError::BadFieldValue {
                    tag,
                    value: value.clone(),
                })?;
                self.present |= HeaderFields::CHECK_SUM;
            }
            _ => {}
        }
        self.fields.push(FixField { tag, value });
        Ok(())
    }

    /// First value for `tag`, in wire order.
    pub fn get_field(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// Whether `tag` appeared in the frame.
    pub fn has_field(&self, tag: u32) -> bool {
        self.fields.iter().any(|f| f.tag == tag)
    }

    /// Parse a fixed-point price out of `tag`.
    pub fn get_price(&self, tag: u32) -> Result<Price, SessionError> {
        let value = self.get_field(tag).ok_or(SessionError::MissingField(tag))?;
        Price::from_decimal_str(value).map_err(|_| SessionError::BadFieldValue {
            tag,
            value: value.to_string(),
        })
    }

    /// Parse an unsigned quantity out of `tag`.
    pub fn get_quantity(&self, tag: u32) -> Result<u64, SessionError> {
        let value = self.get_field(tag).ok_or(SessionError::MissingField(tag))?;
        value.parse().map_err(|_| SessionError::BadFieldValue {
            tag,
            value: value.to_string(),
        })
    }

    /// All fields in wire order.
    pub fn fields(&self) -> &[FixField] {
        &self.fields
    }
}

impl fmt::Display for FixMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seq={} {}→{}",
            self.msg_type, self.msg_seq_num, self.sender_comp_id, self.target_comp_id
        )
    }
}

/// Mod-256 byte sum, rendered as the three-digit trailer value.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u32, |sum, &b| sum + b as u32) as u8
}
