//! Lock-free ingress into the matching worker: the bounded ring buffer
//! and the command vocabulary it carries.

mod command;
mod ring;

pub use command::Command;
pub use ring::{QueueFull, RingBuffer};
