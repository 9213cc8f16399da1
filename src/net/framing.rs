//! Length-prefixed frames over a connection's bidirectional stream
//!
//! A frame is a little-endian `u32` payload length followed by one encoded
//! `Packet`. The read pump calls `read_message` in a loop and the write pump
//! calls `write_message` once per queued packet.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;

/// Why a frame could not be read or written
///
/// `ConnectionClosed` is the normal end of a connection; the pumps treat every
/// other variant as a transport failure.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Next frame's payload; EOF in the prefix or mid-payload is `ConnectionClosed`
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.map_err(closed_on_eof)?;

    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.map_err(closed_on_eof)?;
    Ok(payload)
}

/// Frame `data` and flush, so each packet leaves as soon as it is dequeued
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    let mut frame = Vec::with_capacity(4 + data.len());
    frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
    frame.extend_from_slice(data);

    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

fn closed_on_eof(e: io::Error) -> FramingError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => FramingError::ConnectionClosed,
        _ => FramingError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_write_message() {
        let data = b"spore";
        let mut buffer = Vec::new();
        write_message(&mut buffer, data).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await.unwrap();
        assert_eq!(result, data);
    }

    #[tokio::test]
    async fn test_empty_message() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, b"").await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert!(read_message(&mut cursor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let large = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut buffer = Vec::new();

        let result = write_message(&mut buffer, &large).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_read_oversized_length_prefix() {
        let buffer = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        let mut cursor = Cursor::new(buffer);

        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_le_bytes());
        buffer.extend_from_slice(&[1, 2, 3]);

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_multiple_messages_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        tokio_test::assert_ok!(write_message(&mut a, b"first").await);
        tokio_test::assert_ok!(write_message(&mut a, b"second").await);
        drop(a);

        assert_eq!(read_message(&mut b).await.unwrap(), b"first");
        assert_eq!(read_message(&mut b).await.unwrap(), b"second");
        assert!(matches!(
            read_message(&mut b).await,
            Err(FramingError::ConnectionClosed)
        ));
    }
}
