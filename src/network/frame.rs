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

use bytes::BytesMut;

use crate::message::constants::{DELIMITER, HEADER_LENGTH};
use crate::message::Message;
use crate::network::MessageCodec;
use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

/// One complete, still undecoded frame cut from the inbound buffer.
#[derive(Debug)]
pub struct MessageFrame {
    pub body: BytesMut,
}

impl MessageFrame {
    /// Returns the length of the first complete frame in `buffer`, delimiter
    /// included.
    ///
    /// The fixed header is skipped when looking for the delimiter because its
    /// identifier and timestamp bytes may contain any value.
    pub fn check(buffer: &BytesMut, max_frame_size: usize) -> AppResult<usize> {
        if buffer.len() <= HEADER_LENGTH {
            return Err(Incomplete);
        }
        match buffer[HEADER_LENGTH..]
            .iter()
            .position(|byte| *byte == DELIMITER)
        {
            Some(position) => Ok(HEADER_LENGTH + position + 1),
            None if buffer.len() > max_frame_size => Err(AppError::FrameTooLarge(format!(
                "{} bytes buffered without a delimiter, limit is {}",
                buffer.len(),
                max_frame_size
            ))),
            None => Err(Incomplete),
        }
    }

    pub(crate) fn parse(
        buffer: &mut BytesMut,
        max_frame_size: usize,
    ) -> AppResult<Option<MessageFrame>> {
        match MessageFrame::check(buffer, max_frame_size) {
            Ok(frame_length) => {
                let body = buffer.split_to(frame_length);
                Ok(Some(MessageFrame { body }))
            }
            Err(AppError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn into_message(self) -> AppResult<Message> {
        MessageCodec::decode(&self.body)
    }
}
