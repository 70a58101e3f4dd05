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

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::message::constants::{CONTENT_OFFSET, HEADER_LENGTH};
use crate::message::{timestamp_from_nanos, timestamp_nanos, Message, MessageKind};
use crate::{AppError, AppResult};

/// Stateless mapping between a [`Message`] and its wire frame.
pub struct MessageCodec;

impl MessageCodec {
    pub fn encode(message: &Message) -> Bytes {
        let content = message.content().as_bytes();
        let mut frame = BytesMut::with_capacity(HEADER_LENGTH + content.len());
        frame.put_u8(message.kind().as_byte());
        frame.put_u64_le(message.identifier());
        frame.put_u64_le(timestamp_nanos(message.timestamp()));
        frame.put_slice(content);
        frame.freeze()
    }

    /// Decodes one complete frame, delimiter included.
    ///
    /// The identifier is taken from the header as-is for both kinds; New
    /// messages are not rehashed.
    pub fn decode(frame: &[u8]) -> AppResult<Message> {
        if frame.len() < HEADER_LENGTH {
            return Err(AppError::FrameTooShort(frame.len()));
        }
        let mut header = &frame[..CONTENT_OFFSET];
        let kind = MessageKind::try_from(header.get_u8())?;
        let identifier = header.get_u64_le();
        let timestamp = timestamp_from_nanos(header.get_u64_le())?;

        let content = match kind {
            MessageKind::New => {
                let content = std::str::from_utf8(&frame[CONTENT_OFFSET..]).map_err(|e| {
                    AppError::MalformedProtocol(format!("content is not valid utf-8: {}", e))
                })?;
                Some(content.to_string())
            }
            MessageKind::Acknowledge => None,
        };
        Ok(Message::from_parts(kind, identifier, timestamp, content))
    }
}
