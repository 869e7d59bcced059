use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode binary data as a standard-base64 string for JSON transport.
pub fn encode_chunk(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a standard-base64 chunk back to raw bytes.
pub fn decode_chunk(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
