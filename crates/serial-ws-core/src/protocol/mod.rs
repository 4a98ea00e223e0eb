//! Protocol module containing the reading type, the serial framer, and the
//! device command translator.

pub mod command;
pub mod framing;
pub mod reading;

pub use command::{classify_inbound, translate_command, InboundMessage, PING_MESSAGE};
pub use framing::{decode_reading, FrameError, MAX_READING_LEN, READING_DELIMITER};
pub use reading::Reading;
