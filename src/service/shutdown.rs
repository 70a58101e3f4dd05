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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Listens for the manager's teardown signal.
///
/// Besides the broadcast receiver it shares a `closing` flag with the owner,
/// which is raised before the signal is sent so that a task that is busy with
/// a frame can tell teardown has begun without waiting for the next await.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    closing: Arc<AtomicBool>,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>, closing: Arc<AtomicBool>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            closing,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown || self.closing.load(Ordering::Acquire)
    }

    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}
