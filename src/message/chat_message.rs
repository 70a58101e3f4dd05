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

use std::collections::hash_map::DefaultHasher;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::message::constants::{DELIMITER, KIND_ACKNOWLEDGE, KIND_NEW};
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    New,
    Acknowledge,
}

impl MessageKind {
    pub fn as_byte(self) -> u8 {
        match self {
            MessageKind::New => KIND_NEW,
            MessageKind::Acknowledge => KIND_ACKNOWLEDGE,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            KIND_NEW => Ok(MessageKind::New),
            KIND_ACKNOWLEDGE => Ok(MessageKind::Acknowledge),
            other => Err(AppError::MalformedProtocol(format!(
                "unknown message kind {}",
                other
            ))),
        }
    }
}

/// One chat message, either user content or an acknowledgment of it.
///
/// Content is always terminated by exactly one `\n` and holds no other. Two messages are equal
/// iff their identifiers are equal.
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    timestamp: DateTime<Utc>,
    content: String,
    identifier: u64,
}

impl Message {
    /// Builds a New message stamped with the current wall-clock time.
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_timestamp(content, Utc::now())
    }

    /// Builds a New message at a given time. The identifier is derived from the
    /// normalized content and the timestamp.
    ///
    /// Interior newlines become spaces. The frame carries unsigned nanoseconds
    /// since the Unix epoch, so `timestamp` is clamped to the range from
    /// 1970-01-01 to 2262-04-11.
    pub fn with_timestamp(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let content = normalize(content.into());
        let timestamp = representable(timestamp);
        let identifier = content_identifier(&content, timestamp);
        Message {
            kind: MessageKind::New,
            timestamp,
            content,
            identifier,
        }
    }

    /// Builds the acknowledgment for this message. The reply keeps the
    /// identifier and is never stamped earlier than the acknowledged message.
    pub fn acknowledge(&self) -> Message {
        let now = Utc::now();
        Message {
            kind: MessageKind::Acknowledge,
            timestamp: now.max(self.timestamp),
            content: String::from(DELIMITER as char),
            identifier: self.identifier,
        }
    }

    /// Reassembles a message from decoded frame fields without rehashing.
    pub(crate) fn from_parts(
        kind: MessageKind,
        identifier: u64,
        timestamp: DateTime<Utc>,
        content: Option<String>,
    ) -> Self {
        let content = match kind {
            MessageKind::New => normalize(content.unwrap_or_default()),
            MessageKind::Acknowledge => String::from(DELIMITER as char),
        };
        Message {
            kind,
            timestamp,
            content,
            identifier,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content without the trailing delimiter.
    pub fn text(&self) -> &str {
        self.content
            .strip_suffix(DELIMITER as char)
            .unwrap_or(&self.content)
    }

    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    pub fn is_acknowledge(&self) -> bool {
        self.kind == MessageKind::Acknowledge
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message {{ kind: {:?}, identifier: {:#018x}, timestamp: {}, content: {:?} }}",
            self.kind,
            self.identifier,
            self.timestamp.to_rfc3339(),
            self.text()
        )
    }
}

/// Nanoseconds since the Unix epoch, clamped into the range the frame can carry.
pub fn timestamp_nanos(timestamp: DateTime<Utc>) -> u64 {
    timestamp
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(0)
}

pub fn timestamp_from_nanos(nanos: u64) -> AppResult<DateTime<Utc>> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec).ok_or_else(|| {
        AppError::MalformedProtocol(format!("timestamp {} out of range", nanos))
    })
}

fn normalize(content: String) -> String {
    let delimiter = DELIMITER as char;
    let body = content.strip_suffix(delimiter).unwrap_or(&content);
    let mut normalized = body.replace(delimiter, " ");
    normalized.push(delimiter);
    normalized
}

fn representable(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    match timestamp.timestamp_nanos_opt() {
        Some(nanos) if nanos >= 0 => timestamp,
        Some(_) => DateTime::from_timestamp_nanos(0),
        None if timestamp.timestamp() < 0 => DateTime::from_timestamp_nanos(0),
        None => DateTime::from_timestamp_nanos(i64::MAX),
    }
}

fn content_identifier(content: &str, timestamp: DateTime<Utc>) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(content.as_bytes());
    hasher.write(timestamp_nanos(timestamp).to_string().as_bytes());
    hasher.finish()
}
