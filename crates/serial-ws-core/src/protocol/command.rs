//! Client message classification and device command translation.
//!
//! Clients send free-form UTF-8 text.  The device understands a fixed command
//! frame:
//!
//! ```text
//! with device id:     "S " + <id> + " " + <COMMAND> + "\r"
//! without device id:  "S" + <COMMAND> + "\r"
//! ```
//!
//! where `<COMMAND>` is the client text with surrounding whitespace removed
//! and converted to upper case.  The literal text `ping` is reserved as a
//! liveness probe and never reaches the device.

/// Text a client sends to probe liveness.  Matched exactly, without trimming.
pub const PING_MESSAGE: &str = "ping";

/// What an inbound client text message asks the bridge to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Liveness probe; answer with a pong and do nothing else.
    Ping,
    /// A device command.  Holds the normalized command body (trimmed, upper-cased).
    Command(String),
    /// The text was empty or whitespace only.
    Empty,
}

/// Classifies a client text message.
///
/// # Examples
///
/// ```rust
/// use serial_ws_core::protocol::{classify_inbound, InboundMessage};
///
/// assert_eq!(classify_inbound("ping"), InboundMessage::Ping);
/// assert_eq!(classify_inbound(" on "), InboundMessage::Command("ON".to_string()));
/// assert_eq!(classify_inbound("   "), InboundMessage::Empty);
/// ```
pub fn classify_inbound(text: &str) -> InboundMessage {
    if text == PING_MESSAGE {
        return InboundMessage::Ping;
    }
    let command = normalize(text);
    if command.is_empty() {
        InboundMessage::Empty
    } else {
        InboundMessage::Command(command)
    }
}

/// Translates raw client text into the device wire command.
///
/// Translation never fails.  Text that is empty after trimming produces an
/// empty command body (`"S\r"` or `"S <id> \r"`); whether that frame is sent
/// is decided by the caller.  A blank `device_id` is treated as absent.
///
/// # Examples
///
/// ```rust
/// use serial_ws_core::protocol::translate_command;
///
/// assert_eq!(translate_command("quit", None), "SQUIT\r");
/// assert_eq!(translate_command("abc", Some("5")), "S 5 ABC\r");
/// ```
pub fn translate_command(raw: &str, device_id: Option<&str>) -> String {
    let command = normalize(raw);
    match device_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("S {id} {command}\r"),
        None => format!("S{command}\r"),
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_without_device_id() {
        assert_eq!(translate_command("quit", None), "SQUIT\r");
    }

    #[test]
    fn test_translate_with_device_id() {
        assert_eq!(translate_command("abc", Some("5")), "S 5 ABC\r");
    }

    #[test]
    fn test_translate_trims_and_uppercases() {
        assert_eq!(translate_command("  reset now \n", None), "SRESET NOW\r");
    }

    #[test]
    fn test_translate_blank_device_id_is_treated_as_absent() {
        assert_eq!(translate_command("go", Some("   ")), "SGO\r");
        assert_eq!(translate_command("go", Some("")), "SGO\r");
    }

    #[test]
    fn test_translate_empty_input_yields_empty_body() {
        assert_eq!(translate_command("   ", None), "S\r");
        assert_eq!(translate_command("", Some("7")), "S 7 \r");
    }

    #[test]
    fn test_translate_non_ascii_uppercase() {
        assert_eq!(translate_command("über", None), "SÜBER\r");
    }

    #[test]
    fn test_classify_ping_is_exact_match() {
        assert_eq!(classify_inbound("ping"), InboundMessage::Ping);
        // Anything other than the exact probe text is a regular command.
        assert_eq!(
            classify_inbound("PING"),
            InboundMessage::Command("PING".to_string())
        );
        assert_eq!(
            classify_inbound(" ping "),
            InboundMessage::Command("PING".to_string())
        );
    }

    #[test]
    fn test_classify_command_is_normalized() {
        assert_eq!(
            classify_inbound("\tstatus\r\n"),
            InboundMessage::Command("STATUS".to_string())
        );
    }

    #[test]
    fn test_classify_whitespace_only_is_empty() {
        assert_eq!(classify_inbound(""), InboundMessage::Empty);
        assert_eq!(classify_inbound(" \t\r\n"), InboundMessage::Empty);
    }
}
