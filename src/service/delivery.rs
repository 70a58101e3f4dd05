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

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::message::{Message, MessageKind};

/// Correlates acknowledgments with the messages they answer and measures the
/// round trip on the local clock.
///
/// Shared between the thread that sends and the manager's background thread
/// that receives, hence the concurrent map.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    pending: DashMap<u64, DateTime<Utc>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, message: &Message) {
        if message.kind() == MessageKind::New {
            self.pending.insert(message.identifier(), Utc::now());
        }
    }

    /// Removes the entry matching `ack` and returns the elapsed time since the
    /// message was recorded. `None` for unknown identifiers and New messages.
    pub fn acknowledge(&self, ack: &Message) -> Option<Duration> {
        self.acknowledge_at(ack, Utc::now())
    }

    fn acknowledge_at(&self, ack: &Message, now: DateTime<Utc>) -> Option<Duration> {
        if ack.kind() != MessageKind::Acknowledge {
            return None;
        }
        self.pending
            .remove(&ack.identifier())
            .map(|(_, sent_at)| now - sent_at)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Forgets every unacknowledged message, e.g. once the peer is gone and
    /// no acknowledgment can arrive anymore. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
