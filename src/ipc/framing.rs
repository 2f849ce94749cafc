//! Length-prefixed message framing for JSON-RPC over local sockets.
//!
//! This is the framing Avogadro2 reads from its local socket server: a Qt
//! `QDataStream` serialized `QByteArray`, which on the wire is a 4-byte
//! big-endian length followed by the raw bytes.
//!
//! # Wire Format
//!
//! ```text
//! [u32 BE payload length][payload bytes]
//! ```

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum reply size (100MB) to prevent OOM from a buggy peer.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Encode a payload as a single frame buffer.
///
/// # Errors
///
/// Returns `InvalidInput` if the payload length does not fit in a `u32`.
pub fn encode_frame(payload: &[u8]) -> io::Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds the u32 length prefix", payload.len()),
        )
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one frame to the stream.
///
/// Prefix and payload go out in a single `write_all`, so the peer never
/// receives the prefix as a packet of its own. The stream is not flushed;
/// callers flush once they are done writing.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await
}

/// Read one frame from the stream and return its payload.
///
/// # Errors
///
/// Returns an error if:
/// - The stream closes before a full frame arrives (`UnexpectedEof`)
/// - The announced length exceeds MAX_MESSAGE_SIZE (`InvalidData`)
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut len_buf).await?;

    let size = u32::from_be_bytes(len_buf) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message size {} exceeds maximum {} bytes", size, MAX_MESSAGE_SIZE),
        ));
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Take one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched while the frame is still
/// incomplete. Unlike `read_frame`, partial input survives between calls.
///
/// # Errors
///
/// Returns `InvalidData` if the announced length exceeds MAX_MESSAGE_SIZE.
pub fn decode_frame(buf: &mut Vec<u8>) -> io::Result<Option<Vec<u8>>> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message size {} exceeds maximum {} bytes", size, MAX_MESSAGE_SIZE),
        ));
    }

    let end = LENGTH_PREFIX_SIZE + size;
    if buf.len() < end {
        return Ok(None);
    }

    let body = buf[LENGTH_PREFIX_SIZE..end].to_vec();
    buf.drain(..end);
    Ok(Some(body))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{RpcMessage, METHANE_XYZ};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::net::UnixStream;
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_prefix_is_big_endian_length() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 5]);
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = encode_frame(b"").unwrap();
        assert_eq!(frame, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_prefix_counts_bytes_not_chars() {
        // "Å" is two bytes in UTF-8
        let payload = "Å-Å".as_bytes();
        let frame = encode_frame(payload).unwrap();
        assert_eq!(u32::from_be_bytes(frame[..4].try_into().unwrap()), 5);
    }

    #[test]
    fn test_prefix_matches_length_across_sizes() {
        for size in [0usize, 1, 255, 256, 65_535, 65_536, 1_000_003] {
            let payload = vec![b'x'; size];
            let frame = encode_frame(&payload).unwrap();
            let prefix = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
            assert_eq!(prefix, size);
            assert_eq!(frame.len(), size + LENGTH_PREFIX_SIZE);
        }
    }

    #[test]
    fn test_empty_content_message_prefix() {
        let msg = RpcMessage::load_molecule("1", "xyz", "");
        let json = msg.to_json().unwrap();
        let frame = encode_frame(&json).unwrap();
        let prefix = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(prefix, json.len());
    }

    #[test]
    fn test_decode_frame_waits_for_complete_frame() {
        let frame = encode_frame(br#"{"result":true}"#).unwrap();

        let mut buf = frame[..3].to_vec();
        assert_eq!(decode_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&frame[3..10]);
        assert_eq!(decode_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&frame[10..]);
        buf.extend_from_slice(&[0, 0]);
        assert_eq!(
            decode_frame(&mut buf).unwrap(),
            Some(br#"{"result":true}"#.to_vec())
        );
        // Bytes of the next frame stay queued
        assert_eq!(buf, vec![0, 0]);
    }

    #[test]
    fn test_decode_frame_rejects_oversized_length() {
        let mut buf = ((MAX_MESSAGE_SIZE as u32) + 1).to_be_bytes().to_vec();
        let err = decode_frame(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_methane_frame_parses_back() {
        let (mut client, mut server) = UnixStream::pair().expect("Failed to create socket pair");
        let msg = RpcMessage::methane();
        let json = msg.to_json().unwrap();

        write_frame(&mut client, &json).await.expect("Write failed");

        let body = timeout(TEST_TIMEOUT, read_frame(&mut server))
            .await
            .expect("Test timed out")
            .expect("Read failed");

        assert_eq!(body.len(), json.len());
        let parsed: RpcMessage = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.params.content, METHANE_XYZ);
    }

    #[tokio::test]
    async fn test_back_to_back_frames_keep_boundaries() {
        let (mut client, mut server) = UnixStream::pair().expect("Failed to create socket pair");

        write_frame(&mut client, br#"{"a":1}"#).await.unwrap();
        write_frame(&mut client, br#"{"b":22}"#).await.unwrap();

        let first = timeout(TEST_TIMEOUT, read_frame(&mut server)).await.unwrap().unwrap();
        let second = timeout(TEST_TIMEOUT, read_frame(&mut server)).await.unwrap().unwrap();
        assert_eq!(first, br#"{"a":1}"#);
        assert_eq!(second, br#"{"b":22}"#);
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_message() {
        let (mut client, mut server) = UnixStream::pair().expect("Failed to create socket pair");

        let announced = (MAX_MESSAGE_SIZE as u32) + 1;
        client.write_all(&announced.to_be_bytes()).await.unwrap();

        let err = timeout(TEST_TIMEOUT, read_frame(&mut server))
            .await
            .expect("Test timed out")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_eof() {
        let (mut client, mut server) = UnixStream::pair().expect("Failed to create socket pair");

        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let err = timeout(TEST_TIMEOUT, read_frame(&mut server))
            .await
            .expect("Test timed out")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_connection_closed_returns_error() {
        let (client, mut server) = UnixStream::pair().expect("Failed to create socket pair");
        drop(client);

        let result = timeout(TEST_TIMEOUT, read_frame(&mut server))
            .await
            .expect("Test timed out");
        assert!(result.is_err());
    }
}
