// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{self, ErrorKind};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::tcp::OwnedReadHalf;

use crate::network::MessageFrame;
use crate::AppResult;

/// Read side of a peer connection.
///
/// Holds the pending-inbound buffer, which accumulates partial frame data
/// until a delimiter has been seen.
#[derive(Debug)]
pub struct Connection<R = OwnedReadHalf> {
    reader: R,
    buffer: BytesMut,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> Connection<R> {
    pub fn new(reader: R, buffer_size: usize, max_frame_size: usize) -> Connection<R> {
        Connection {
            reader,
            buffer: BytesMut::with_capacity(buffer_size),
            max_frame_size,
        }
    }

    /// Reads one `MessageFrame` from the connection.
    ///
    /// Returns `None` when the peer closed the stream between frames, and an
    /// error when it closed in the middle of a frame or the buffered data
    /// exceeded the frame size limit.
    ///
    /// Cancel safe: bytes already read stay in the buffer, so this can be used
    /// as a `tokio::select!` branch.
    pub async fn read_frame(&mut self) -> AppResult<Option<MessageFrame>> {
        loop {
            if let Some(frame) = MessageFrame::parse(&mut self.buffer, self.max_frame_size)? {
                return Ok(Some(frame));
            }
            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(
                        io::Error::new(ErrorKind::ConnectionReset, "connection reset by peer")
                            .into(),
                    )
                };
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageKind};
    use crate::network::MessageCodec;
    use crate::AppError;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_frames_split_across_writes() -> AppResult<()> {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut connection = Connection::new(reader, 16, 1024);

        let message = Message::new("a message longer than one chunk");
        let frame = MessageCodec::encode(&message);
        let (head, tail) = frame.split_at(10);
        let head = head.to_vec();
        let tail = tail.to_vec();

        tokio::spawn(async move {
            writer.write_all(&head).await.unwrap();
            tokio::task::yield_now().await;
            writer.write_all(&tail).await.unwrap();
        });

        let received = connection.read_frame().await?.unwrap().into_message()?;
        assert_eq!(received.kind(), MessageKind::New);
        assert_eq!(received.identifier(), message.identifier());
        assert_eq!(connection.buffered(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_clean_close_returns_none() -> AppResult<()> {
        let (writer, reader) = tokio::io::duplex(64);
        let mut connection = Connection::new(reader, 16, 1024);
        drop(writer);
        assert!(connection.read_frame().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_close_mid_frame_is_an_error() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut connection = Connection::new(reader, 16, 1024);
        writer.write_all(&[0u8; 20]).await.unwrap();
        drop(writer);

        let result = connection.read_frame().await;
        assert!(matches!(result, Err(AppError::IoError(ref e)) if e.kind() == ErrorKind::ConnectionReset));
    }
}
