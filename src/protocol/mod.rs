//! Wire protocol for the platform server.
//!
//! Every client/server message is a 4-byte big-endian length prefix followed
//! by that many bytes of UTF-8 JSON. Binary payloads travel inside JSON
//! fields as standard base64 strings.

pub mod chunks;
pub mod error_codes;
pub mod framing;
pub mod messages;

pub use chunks::{decode_chunk, encode_chunk};
pub use error_codes::ErrorCode;
pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_LEN};
pub use messages::{error_reply, ok_fields, ok_reply, Request};
