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

use std::net::SocketAddr;

use crate::message::Message;
use crate::AppError;

/// Notifications delivered by a [`ConnectionManager`](super::ConnectionManager).
///
/// Every method runs on the manager's background thread. Implementations that
/// touch application state must hand the event off to their own context.
pub trait PeerHandler: Send + 'static {
    /// A frame was decoded, acknowledgments included.
    fn on_receive(&mut self, message: &Message);

    /// A peer connection was established.
    fn on_connect(&mut self, peer: SocketAddr);

    /// The current peer went away.
    fn on_disconnect(&mut self);

    /// The connector could not reach the listener. Fires at most once and is
    /// never followed by `on_connect`.
    fn on_connect_failed(&mut self, _error: &AppError) {}
}

/// A [`PeerHandler`] assembled from three closures.
pub struct Callbacks<R, C, D> {
    on_receive: R,
    on_connect: C,
    on_disconnect: D,
}

impl<R, C, D> Callbacks<R, C, D>
where
    R: FnMut(&Message) + Send + 'static,
    C: FnMut(SocketAddr) + Send + 'static,
    D: FnMut() + Send + 'static,
{
    pub fn new(on_receive: R, on_connect: C, on_disconnect: D) -> Self {
        Callbacks {
            on_receive,
            on_connect,
            on_disconnect,
        }
    }
}

impl<R, C, D> PeerHandler for Callbacks<R, C, D>
where
    R: FnMut(&Message) + Send + 'static,
    C: FnMut(SocketAddr) + Send + 'static,
    D: FnMut() + Send + 'static,
{
    fn on_receive(&mut self, message: &Message) {
        (self.on_receive)(message)
    }

    fn on_connect(&mut self, peer: SocketAddr) {
        (self.on_connect)(peer)
    }

    fn on_disconnect(&mut self) {
        (self.on_disconnect)()
    }
}
