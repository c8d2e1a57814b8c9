//! `multipart/x-mixed-replace` framing for re-emitted video frames

use bytes::{BufMut, Bytes, BytesMut};

/// `Content-Type` header value for a replace stream with the given boundary
#[must_use]
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// Wrap one JPEG frame as a self-contained part:
///
/// `--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {n}\r\n\r\n{frame}\r\n`
#[must_use]
pub fn encode_part(boundary: &str, frame: &[u8]) -> Bytes {
    let header = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(frame);
    part.put_slice(b"\r\n");
    part.freeze()
}
