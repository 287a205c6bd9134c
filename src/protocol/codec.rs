//! Frame codec for the recorder wire protocol
//!
//! Pure, stateless transformation between (id, sequence, body) and raw
//! bytes. Decoding operates on any byte view using offsets relative to the
//! view's own start, so callers can hand in sub-slices of a larger receive
//! buffer. A short buffer yields [`Decoded::Incomplete`] rather than an
//! error; only a magic-byte mismatch is fatal.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Command, Message, MAGIC_BYTES};

/// Fixed header size: magic(2) + id(2) + sequence(4) + length word(4)
pub const HEADER_SIZE: usize = 12;

/// Body length travels in 24 bits
pub const MAX_BODY_SIZE: usize = 0xff_ffff;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed header: expected magic 12 34, got {0:02x} {1:02x}")]
    MalformedHeader(u8, u8),

    #[error("body too large: {0} bytes (max: {MAX_BODY_SIZE})")]
    BodyTooLarge(usize),
}

/// Outcome of a single decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame, plus the total bytes it occupied in the buffer
    /// (header + body + padding)
    Frame { message: Message, consumed: usize },
    /// Not enough bytes yet - wait for more input
    Incomplete,
}

/// Encode a command into wire bytes.
///
/// The encoder never emits padding; the padding field exists because some
/// firmware revisions pad their responses.
pub fn encode(command: &Command) -> Result<Bytes, CodecError> {
    let body_len = command.body.len();
    if body_len > MAX_BODY_SIZE {
        return Err(CodecError::BodyTooLarge(body_len));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
    buf.put_slice(&MAGIC_BYTES);
    buf.put_u16(command.id);
    buf.put_u32(command.sequence);
    // Length word: high byte is the padding length (zero on encode),
    // low 24 bits are the body length.
    buf.put_u32(body_len as u32);
    buf.put_slice(&command.body);

    Ok(buf.freeze())
}

/// Attempt to decode one frame from the front of `buf`.
///
/// Returns `Incomplete` when the buffer holds less than a full frame, and
/// `MalformedHeader` when the first two bytes are present but are not the
/// magic value - that case signals protocol desync, not a short read.
pub fn decode(buf: &[u8]) -> Result<Decoded, CodecError> {
    if buf.len() >= 2 && buf[..2] != MAGIC_BYTES {
        return Err(CodecError::MalformedHeader(buf[0], buf[1]));
    }
    if buf.len() < HEADER_SIZE {
        return Ok(Decoded::Incomplete);
    }

    let id = u16::from_be_bytes([buf[2], buf[3]]);
    let sequence = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    // Byte 8 of the header is the padding length; bytes 9-11 are the
    // 24-bit body length. This is the wire contract as shipped; do not
    // "fix" it into a plain 32-bit length.
    let padding_len = buf[8] as usize;
    let body_len = u32::from_be_bytes([0, buf[9], buf[10], buf[11]]) as usize;

    let total = HEADER_SIZE + body_len + padding_len;
    if buf.len() < total {
        return Ok(Decoded::Incomplete);
    }

    let message = Message {
        id,
        sequence,
        body: Bytes::copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + body_len]),
    };

    Ok(Decoded::Frame {
        message,
        consumed: total,
    })
}

/// Decode as many complete frames as `buf` holds, in order.
///
/// Stops quietly at the first incomplete or malformed boundary and reports
/// how many bytes were consumed; trailing partial data is left for the
/// caller to retain until the next read.
pub fn decode_stream(buf: &[u8]) -> (Vec<Message>, usize) {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        match decode(&buf[offset..]) {
            Ok(Decoded::Frame { message, consumed }) => {
                messages.push(message);
                offset += consumed;
            }
            Ok(Decoded::Incomplete) | Err(_) => break,
        }
    }

    (messages, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command_id;

    fn cmd(id: u16, sequence: u32, body: &'static [u8]) -> Command {
        Command {
            id,
            sequence,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_encode_example_frame() {
        let frame = encode(&cmd(1, 0x12345678, &[])).unwrap();
        assert_eq!(
            frame.as_ref(),
            &[0x12, 0x34, 0x00, 0x01, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_roundtrip() {
        let original = cmd(command_id::GET_FILE_LIST, 42, b"hello");
        let frame = encode(&original).unwrap();

        match decode(&frame).unwrap() {
            Decoded::Frame { message, consumed } => {
                assert_eq!(message.id, original.id);
                assert_eq!(message.sequence, original.sequence);
                assert_eq!(message.body, original.body);
                assert_eq!(consumed, HEADER_SIZE + 5);
            }
            Decoded::Incomplete => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn test_zero_length_body() {
        let frame = encode(&cmd(7, 9, &[])).unwrap();
        assert_eq!(frame.len(), HEADER_SIZE);

        match decode(&frame).unwrap() {
            Decoded::Frame { message, consumed } => {
                assert!(message.body.is_empty());
                assert_eq!(consumed, HEADER_SIZE);
            }
            Decoded::Incomplete => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn test_every_prefix_is_incomplete() {
        let frame = encode(&cmd(5, 1, b"chunk")).unwrap();

        for k in 0..frame.len() {
            match decode(&frame[..k]).unwrap() {
                Decoded::Incomplete => {}
                Decoded::Frame { .. } => panic!("prefix of {} bytes decoded", k),
            }
        }
        assert!(matches!(
            decode(&frame).unwrap(),
            Decoded::Frame { .. }
        ));
    }

    #[test]
    fn test_malformed_magic_rejected() {
        // An otherwise well-formed frame with the wrong magic
        let mut frame = encode(&cmd(1, 1, b"x")).unwrap().to_vec();
        frame[0] = 0xde;
        frame[1] = 0xad;

        assert!(matches!(
            decode(&frame),
            Err(CodecError::MalformedHeader(0xde, 0xad))
        ));

        // Two bytes are enough to reject
        assert!(matches!(
            decode(&[0x00, 0x00]),
            Err(CodecError::MalformedHeader(0, 0))
        ));

        // One byte is not
        assert!(matches!(decode(&[0x99]).unwrap(), Decoded::Incomplete));
    }

    #[test]
    fn test_padding_consumed_and_discarded() {
        // Hand-build a padded frame: 3-byte body, 2 padding bytes
        let mut frame = vec![0x12, 0x34, 0x00, 0x05];
        frame.extend_from_slice(&7u32.to_be_bytes());
        frame.push(2); // padding length
        frame.extend_from_slice(&[0x00, 0x00, 0x03]); // body length
        frame.extend_from_slice(b"abc");
        frame.extend_from_slice(&[0xff, 0xff]); // padding, content ignored

        match decode(&frame).unwrap() {
            Decoded::Frame { message, consumed } => {
                assert_eq!(message.body.as_ref(), b"abc");
                assert_eq!(consumed, HEADER_SIZE + 3 + 2);
            }
            Decoded::Incomplete => panic!("expected a complete frame"),
        }

        // Missing one padding byte keeps the frame incomplete
        assert!(matches!(
            decode(&frame[..frame.len() - 1]).unwrap(),
            Decoded::Incomplete
        ));
    }

    #[test]
    fn test_decode_from_sub_slice() {
        let frame = encode(&cmd(3, 0xabcd, b"payload")).unwrap();

        let mut padded = vec![0u8; 5];
        padded.extend_from_slice(&frame);

        let from_view = decode(&padded[5..]).unwrap();
        let from_copy = decode(&frame).unwrap();
        assert_eq!(from_view, from_copy);
    }

    #[test]
    fn test_decode_stream_multiple_frames() {
        let frames = [
            encode(&cmd(1, 1, b"one")).unwrap(),
            encode(&cmd(2, 2, b"")).unwrap(),
            encode(&cmd(3, 3, b"three")).unwrap(),
        ];

        let mut buf = Vec::new();
        for f in &frames {
            buf.extend_from_slice(f);
        }

        let (messages, consumed) = decode_stream(&buf);
        assert_eq!(messages.len(), 3);
        assert_eq!(consumed, buf.len());
        assert_eq!(messages[0].body.as_ref(), b"one");
        assert_eq!(messages[1].sequence, 2);
        assert_eq!(messages[2].body.as_ref(), b"three");
    }

    #[test]
    fn test_decode_stream_trailing_partial() {
        let complete = encode(&cmd(1, 1, b"full")).unwrap();
        let partial = encode(&cmd(2, 2, b"cut off")).unwrap();

        let mut buf = complete.to_vec();
        buf.extend_from_slice(&partial[..partial.len() - 3]);

        let (messages, consumed) = decode_stream(&buf);
        assert_eq!(messages.len(), 1);
        assert_eq!(consumed, complete.len());
    }

    #[test]
    fn test_decode_stream_stops_at_malformed() {
        let good = encode(&cmd(1, 1, b"ok")).unwrap();
        let mut buf = good.to_vec();
        buf.extend_from_slice(&[0xba, 0xd0, 0x00, 0x00]);

        let (messages, consumed) = decode_stream(&buf);
        assert_eq!(messages.len(), 1);
        assert_eq!(consumed, good.len());
    }

    #[test]
    fn test_oversized_body_rejected() {
        let body = Bytes::from(vec![0u8; MAX_BODY_SIZE + 1]);
        let command = Command {
            id: 1,
            sequence: 0,
            body,
        };
        assert!(matches!(
            encode(&command),
            Err(CodecError::BodyTooLarge(_))
        ));
    }
}
