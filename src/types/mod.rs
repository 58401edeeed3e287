//! Core types flowing through the gateway.
//!
//! - [`RawFrame`] is one line read from the radio, tagged as a routing header
//!   or a payload line.
//! - [`CanonicalPacket`] is an APRS-IS packet ready to be written upstream.
//! - [`DropDecision`] records why a heard packet was not gated.
//! - [`FramerOutcome`] is what the framer returns for one routing/payload pair.
//!
//! ## Usage Example
//!
//! ```rust
//! use igate::types::{CanonicalPacket, DropReason};
//!
//! let packet = CanonicalPacket::new("AA6I>APOTU0,WIDE2*,qAO,VE3YSH-9:", "!3632.30N/11935.16Wk");
//! assert_eq!(packet.to_string(), "AA6I>APOTU0,WIDE2*,qAO,VE3YSH-9:!3632.30N/11935.16Wk");
//! assert_eq!(packet.to_wire(), "AA6I>APOTU0,WIDE2*,qAO,VE3YSH-9:!3632.30N/11935.16Wk\r\n");
//!
//! assert_eq!(DropReason::RfOnlyFlag.to_string(), "RFONLY, not igated");
//! ```

mod frame;
mod packet;

pub use frame::{FrameKind, RawFrame};
pub use packet::{CanonicalPacket, DropDecision, DropReason, FramerOutcome};
