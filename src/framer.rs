//! Reframing of radio output into APRS-IS packets.
//!
//! The radio prints each heard packet as a routing header carrying its own
//! timestamp and frame-type marker, followed by the payload on a later line:
//!
//! ```text
//! AA6I>APOTU0,K6IXA-3,VACA,WIDE2* [06/02/18 13:47:54] <UI>:
//! /022047z3632.30N/11935.16Wk136/055/A=000300ENROUTE
//! ```
//!
//! The framer replaces the marker with the gateway's `qAO` hop and joins the
//! two lines:
//!
//! ```text
//! AA6I>APOTU0,K6IXA-3,VACA,WIDE2*,qAO,VE3YSH-9:/022047z3632.30N/11935.16Wk136/055/A=000300ENROUTE
//! ```
//!
//! Packets that must not reach the internet are turned into a
//! [`DropDecision`] instead. Rules are evaluated in order and the first match
//! wins:
//!
//! 1. empty payload
//! 2. routing contains `,TCP` (already internet sourced)
//! 3. third-party payload (`}`) whose inner path contains `,TCP` before a `:`
//! 4. routing contains `RFONLY`
//! 5. routing contains `NOGATE`
//!
//! ```rust
//! use igate::framer::PacketFramer;
//!
//! let framer = PacketFramer::new("VE3YSH-9");
//! let outcome = framer.frame("N0CALL>APRS,WIDE1-1 [01/01/24 00:00:00] <UI R>:", ">hello");
//! assert!(outcome.is_forward());
//! ```

use crate::types::{CanonicalPacket, DropDecision, DropReason, FramerOutcome};

const MARKER_OPEN: char = '[';
const MARKER_UI: &str = "] <UI";
const MARKER_CLOSE: &str = ">:";

/// Byte span of the device marker, from the `[` through the closing `>:`.
///
/// The `[` is the first one on the line. The `<UI` is the last one after it
/// that is still followed by a `>:`, and the close is the last `>:` after that.
fn marker_span(line: &str) -> Option<(usize, usize)> {
    let open = line.find(MARKER_OPEN)?;
    let tail = &line[open..];

    tail.rmatch_indices(MARKER_UI).find_map(|(ui, _)| {
        let after_ui = ui + MARKER_UI.len();
        tail[after_ui..]
            .rfind(MARKER_CLOSE)
            .map(|close| (open, open + after_ui + close + MARKER_CLOSE.len()))
    })
}

/// True if the line carries the device's `[timestamp] <UI...>:` marker.
pub fn is_routing_line(line: &str) -> bool {
    marker_span(line).is_some()
}

/// Replace the device marker (and one space before it) with `replacement`.
///
/// Returns `None` for lines that are not routing lines.
pub fn strip_device_marker(line: &str, replacement: &str) -> Option<String> {
    let (open, close) = marker_span(line)?;
    let head = line[..open].strip_suffix(' ').unwrap_or(&line[..open]);

    let mut routing = String::with_capacity(head.len() + replacement.len() + line.len() - close);
    routing.push_str(head);
    routing.push_str(replacement);
    routing.push_str(&line[close..]);
    Some(routing)
}

/// Routing path shows the packet was injected from the internet.
pub fn is_internet_sourced(routing: &str) -> bool {
    routing.contains(",TCP")
}

/// Third-party payload whose encapsulated path shows internet origin.
pub fn is_internet_sourced_embedded(payload: &str) -> bool {
    let Some(inner) = payload.strip_prefix('}') else {
        return false;
    };
    match inner.find(",TCP") {
        Some(at) => inner[at + ",TCP".len()..].contains(':'),
        None => false,
    }
}

pub fn has_rf_only_flag(routing: &str) -> bool {
    routing.contains("RFONLY")
}

pub fn has_no_gate_flag(routing: &str) -> bool {
    routing.contains("NOGATE")
}

/// First drop rule matching this routing/payload pair, if any.
pub fn drop_reason(routing: &str, payload: &str) -> Option<DropReason> {
    if payload.is_empty() {
        Some(DropReason::EmptyPayload)
    } else if is_internet_sourced(routing) {
        Some(DropReason::InternetSourced)
    } else if is_internet_sourced_embedded(payload) {
        Some(DropReason::InternetSourcedEmbedded)
    } else if has_rf_only_flag(routing) {
        Some(DropReason::RfOnlyFlag)
    } else if has_no_gate_flag(routing) {
        Some(DropReason::NoGateFlag)
    } else {
        None
    }
}

/// Stateless routing/payload to packet transformer for one gateway identity.
#[derive(Debug, Clone)]
pub struct PacketFramer {
    /// `,qAO,<callsign>:`
    relay_entry: String,
}

impl PacketFramer {
    pub fn new(callsign: &str) -> Self {
        Self { relay_entry: format!(",qAO,{callsign}:") }
    }

    /// The routing header with the device marker replaced by our relay entry.
    pub fn reframe_routing(&self, line: &str) -> Option<String> {
        strip_device_marker(line, &self.relay_entry)
    }

    /// Frame a routing line and the line that followed it.
    ///
    /// A `routing_line` that does not carry the device marker is kept as-is;
    /// callers are expected to check [`is_routing_line`] first.
    pub fn frame(&self, routing_line: &str, payload_line: &str) -> FramerOutcome {
        let routing = self.reframe_routing(routing_line).unwrap_or_else(|| routing_line.to_string());
        let payload = payload_line.trim_matches(['\r', '\n']);

        match drop_reason(&routing, payload) {
            Some(reason) => FramerOutcome::Drop(DropDecision::new(reason, format!("{routing}{payload}"))),
            None => FramerOutcome::Forward(CanonicalPacket::new(routing, payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ROUTING: &str = "AA6I>APOTU0,K6IXA-3,VACA,WIDE2* [06/02/18 13:47:54] <UI>:";
    const PAYLOAD: &str = "/022047z3632.30N/11935.16Wk136/055/A=000300ENROUTE";

    fn framer() -> PacketFramer {
        PacketFramer::new("VE3YSH-9")
    }

    #[test]
    fn reframes_a_heard_position() {
        let outcome = framer().frame(ROUTING, PAYLOAD);
        let FramerOutcome::Forward(packet) = outcome else {
            panic!("expected a forwarded packet, got {outcome:?}");
        };
        assert_eq!(
            packet.to_string(),
            "AA6I>APOTU0,K6IXA-3,VACA,WIDE2*,qAO,VE3YSH-9:/022047z3632.30N/11935.16Wk136/055/A=000300ENROUTE"
        );
        assert_eq!(packet.payload, PAYLOAD);
    }

    #[test]
    fn empty_payload_is_dropped() {
        let outcome = framer().frame(ROUTING, "");
        assert_eq!(outcome.drop_reason(), Some(DropReason::EmptyPayload));

        let outcome = framer().frame(ROUTING, "\r\n");
        assert_eq!(outcome.drop_reason(), Some(DropReason::EmptyPayload));
    }

    #[test]
    fn routing_line_detection() {
        assert!(is_routing_line(ROUTING));
        assert!(is_routing_line("N0CALL>APRS [01/01/24 00:00:00] <UI R>:"));
        assert!(!is_routing_line(PAYLOAD));
        assert!(!is_routing_line("N0CALL>APRS [01/01/24 00:00:00] <I>:"));
        assert!(!is_routing_line("N0CALL>APRS [01/01/24 00:00:00] <UI>"));
        assert!(!is_routing_line("N0CALL>APRS <UI>: no timestamp"));
        assert!(!is_routing_line(""));
    }

    #[test]
    fn marker_variants_are_stripped() {
        let relay = ",qAO,ME:";
        assert_eq!(
            strip_device_marker("A>B,C* [12/31/99 23:59:59] <UI R>:", relay).as_deref(),
            Some("A>B,C*,qAO,ME:")
        );
        assert_eq!(
            strip_device_marker("A>B[12/31/99 23:59:59] <UI C>:", relay).as_deref(),
            Some("A>B,qAO,ME:")
        );
        assert_eq!(strip_device_marker("A>B no marker", relay), None);
    }

    #[test]
    fn drop_rules_apply_in_order() {
        let f = framer();
        let tcp = "N0CALL>APRS,TCPIP* [01/01/24 00:00:00] <UI>:";
        let rfonly = "N0CALL>APRS,RFONLY [01/01/24 00:00:00] <UI>:";
        let nogate = "N0CALL>APRS,NOGATE [01/01/24 00:00:00] <UI>:";
        let both = "N0CALL>APRS,RFONLY,NOGATE [01/01/24 00:00:00] <UI>:";
        let embedded = "}W1AW>APRS,TCPIP,N0CALL*:>hello";

        assert_eq!(f.frame(tcp, "").drop_reason(), Some(DropReason::EmptyPayload));
        assert_eq!(f.frame(tcp, embedded).drop_reason(), Some(DropReason::InternetSourced));
        assert_eq!(f.frame(rfonly, embedded).drop_reason(), Some(DropReason::InternetSourcedEmbedded));
        assert_eq!(f.frame(rfonly, ">x").drop_reason(), Some(DropReason::RfOnlyFlag));
        assert_eq!(f.frame(both, ">x").drop_reason(), Some(DropReason::RfOnlyFlag));
        assert_eq!(f.frame(nogate, ">x").drop_reason(), Some(DropReason::NoGateFlag));
    }

    #[test]
    fn embedded_internet_detection() {
        assert!(is_internet_sourced_embedded("}W1AW>APRS,TCPIP,N0CALL*:>hi"));
        assert!(is_internet_sourced_embedded("},TCP:"));
        assert!(!is_internet_sourced_embedded("}W1AW>APRS,WIDE1-1:>hi"));
        assert!(!is_internet_sourced_embedded("}W1AW>APRS:,TCPIP"));
        assert!(!is_internet_sourced_embedded("W1AW>APRS,TCPIP*:>not third party"));
    }

    #[test]
    fn drop_decision_keeps_reframed_text() {
        let outcome = framer().frame("N0CALL>APRS,NOGATE [01/01/24 00:00:00] <UI>:", ">x");
        let FramerOutcome::Drop(decision) = outcome else {
            panic!("expected a drop");
        };
        assert_eq!(decision.packet, "N0CALL>APRS,NOGATE,qAO,VE3YSH-9:>x");
    }

    fn clean_header() -> impl Strategy<Value = String> {
        "[A-Z0-9]{1,6}(-[0-9]{1,2})?>[A-Z0-9]{1,6}(,[A-Z0-9]{1,6}(-[0-9])?\\*?){0,4}".prop_filter(
            "header must not trip routing rules",
            |h| !h.contains("TCP") && !h.contains("RFONLY") && !h.contains("NOGATE"),
        )
    }

    fn marker() -> impl Strategy<Value = String> {
        ("[0-9]{2}/[0-9]{2}/[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}", "( [A-Z])?")
            .prop_map(|(stamp, kind)| format!(" [{stamp}] <UI{kind}>:"))
    }

    proptest! {
        #[test]
        fn clean_packets_are_forwarded_unchanged(
            header in clean_header(),
            marker in marker(),
            payload in "[!-|~][ -~]{0,60}",
        ) {
            let outcome = framer().frame(&format!("{header}{marker}"), &payload);
            let expected = CanonicalPacket::new(format!("{header},qAO,VE3YSH-9:"), payload.clone());
            prop_assert_eq!(outcome, FramerOutcome::Forward(expected));
        }

        #[test]
        fn internet_routing_always_drops(
            header in clean_header(),
            marker in marker(),
            hop in ",TCP[A-Z]{0,3}\\*?",
            payload in "[ -~]{1,60}",
        ) {
            let outcome = framer().frame(&format!("{header}{hop}{marker}"), &payload);
            prop_assert_eq!(outcome.drop_reason(), Some(DropReason::InternetSourced));
        }

        #[test]
        fn embedded_internet_payload_always_drops(
            header in clean_header(),
            marker in marker(),
            before in "[ -~]{0,20}",
            between in "[ -~]{0,20}",
            after in "[ -~]{0,20}",
        ) {
            let payload = format!("}}{before},TCP{between}:{after}");
            let outcome = framer().frame(&format!("{header}{marker}"), &payload);
            prop_assert_eq!(outcome.drop_reason(), Some(DropReason::InternetSourcedEmbedded));
        }

        #[test]
        fn non_routing_lines_are_never_routing(line in "[^\\[]*") {
            prop_assert!(!is_routing_line(&line));
        }
    }
}
