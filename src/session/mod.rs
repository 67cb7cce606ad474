//! The session protocol layer: tag-value wire format, per-session
//! framing, the parser worker pool, and outbound report encoding.

pub mod tags;

mod builder;
mod decoder;
mod framer;
mod message;

pub use builder::{FixMessageBuilder, encode_execution_report};
pub use decoder::{
    DecoderStats, DecoderStatsSnapshot, MessageCallback, SessionDecoder, SessionErrorCallback,
    to_command,
};
pub use framer::{Framer, FramerState};
pub use message::{FixField, FixMessage, FrameErrorClass, HeaderFields, SessionError, checksum};
