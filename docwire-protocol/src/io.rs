//! Async message reading and writing over any tokio stream.

use crate::error::ProtocolError;
use crate::frame::{check_length, MsgHeader, HEADER_SIZE};
use crate::message::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one message.
///
/// The header is read first and its declared length checked against
/// `max_size` before any body bytes are read. Returns `Ok(None)` on a clean
/// end of stream between messages.
pub async fn read_message<R>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<Message>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::HeaderTooShort { received: filled });
        }
        filled += n;
    }

    let parsed = MsgHeader::parse(&header)?;
    let length = check_length(parsed.message_length, max_size)?;

    let mut frame = vec![0u8; length];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;

    tracing::debug!(
        "Read message: {} bytes (id={}, op={})",
        length,
        parsed.request_id,
        parsed.op_code
    );
    Message::parse_with_limit(&frame, max_size).map(Some)
}

/// Encodes and writes one message, then flushes.
///
/// The flush runs even when the write fails; the first error is returned.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.encode()?;
    let written = writer.write_all(&bytes).await;
    let flushed = writer.flush().await;
    written?;
    flushed?;

    tracing::debug!(
        "Wrote message: {} bytes (id={}, response_to={})",
        bytes.len(),
        message.request_id,
        message.response_to
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Op;
    use crate::op_msg::OpMsg;
    use crate::MAX_MESSAGE_SIZE;
    use docwire_bson::Document;

    fn hello(request_id: i32) -> Message {
        let body = Document::from_pairs([("hello", 1i32)]).unwrap();
        Message::new(request_id, 0, Op::Msg(OpMsg::new(body)))
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_message(&mut client, &hello(1)).await.unwrap();
        write_message(&mut client, &hello(2)).await.unwrap();
        drop(client);

        let first = read_message(&mut server, MAX_MESSAGE_SIZE).await.unwrap();
        assert_eq!(first, Some(hello(1)));
        let second = read_message(&mut server, MAX_MESSAGE_SIZE).await.unwrap();
        assert_eq!(second, Some(hello(2)));
        assert!(read_message(&mut server, MAX_MESSAGE_SIZE)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fragmented_reads() {
        let bytes = hello(5).encode().unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes[..3])
            .read(&bytes[3..17])
            .read(&bytes[17..])
            .build();
        let message = read_message(&mut reader, MAX_MESSAGE_SIZE).await.unwrap();
        assert_eq!(message, Some(hello(5)));
    }

    #[tokio::test]
    async fn test_write_is_flushed() {
        let message = hello(6);
        let bytes = message.encode().unwrap();
        let mut writer = tokio_test::io::Builder::new().write(&bytes).build();
        write_message(&mut writer, &message).await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_inside_header() {
        let bytes = hello(1).encode().unwrap();
        let mut reader = &bytes[..7];
        assert!(matches!(
            read_message(&mut reader, MAX_MESSAGE_SIZE).await,
            Err(ProtocolError::HeaderTooShort { received: 7 })
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_body() {
        let bytes = hello(1).encode().unwrap();
        let mut reader = &bytes[..bytes.len() - 2];
        assert!(matches!(
            read_message(&mut reader, MAX_MESSAGE_SIZE).await,
            Err(ProtocolError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_length_checked_before_body() {
        // A header declaring 1 GB with no body behind it.
        let mut bytes = Vec::new();
        MsgHeader {
            message_length: 1 << 30,
            request_id: 1,
            response_to: 0,
            op_code: 2013,
        }
        .put(&mut bytes);
        let mut reader = &bytes[..];
        assert!(matches!(
            read_message(&mut reader, MAX_MESSAGE_SIZE).await,
            Err(ProtocolError::DeclaredLengthOutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn test_configured_limit() {
        let bytes = hello(1).encode().unwrap();
        let mut reader = &bytes[..];
        assert!(matches!(
            read_message(&mut reader, 24).await,
            Err(ProtocolError::DeclaredLengthOutOfBounds { max: 24, .. })
        ));
    }
}
