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

use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use duochat::{
    setup_tracing, AppError, AppResult, ChatConfig, ConnectionManager, DeliveryTracker, Message,
    MessageKind, PeerHandler, Role,
};
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Two-party terminal chat")]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Wait for a peer to connect
    Listen {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Dial a listening peer
    Connect {
        #[arg(short, long)]
        address: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    PrintConfig,
}

/// Renders notifications on stdout. Runs on the manager's background thread.
struct TerminalHandler {
    role: Role,
    tracker: Arc<DeliveryTracker>,
}

impl PeerHandler for TerminalHandler {
    fn on_receive(&mut self, message: &Message) {
        match message.kind() {
            MessageKind::New => println!("[{}]: {}", self.role.peer(), message.text()),
            MessageKind::Acknowledge => match self.tracker.acknowledge(message) {
                Some(elapsed) => println!(
                    "[Delivered {:#018x} in {} us]",
                    message.identifier(),
                    elapsed.num_microseconds().unwrap_or(i64::MAX)
                ),
                None => info!(
                    "acknowledgment for unknown message {:#018x}",
                    message.identifier()
                ),
            },
        }
    }

    fn on_connect(&mut self, peer: SocketAddr) {
        println!("*** established a connection with {} ({})", self.role.peer(), peer);
    }

    fn on_disconnect(&mut self) {
        let undelivered = self.tracker.clear();
        if undelivered > 0 {
            println!("*** {} message(s) were not acknowledged", undelivered);
        }
        match self.role {
            Role::Listener => println!(
                "*** {} disconnected, awaiting a new connection",
                self.role.peer()
            ),
            Role::Connector => println!(
                "*** {} disconnected, restart once the listener is up again",
                self.role.peer()
            ),
        }
    }

    fn on_connect_failed(&mut self, error: &AppError) {
        println!("*** failed to connect: {}", error);
    }
}

fn main() -> AppResult<()> {
    dotenv().ok();

    //setup config
    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let mut chat_config = ChatConfig::set_up_config(config_path)?;
    match commandline.command {
        Some(Command::Listen { port }) => {
            chat_config.general.role = Role::Listener;
            if let Some(port) = port {
                chat_config.general.port = port;
            }
        }
        Some(Command::Connect { address, port }) => {
            chat_config.general.role = Role::Connector;
            if let Some(address) = address {
                chat_config.general.address = address;
            }
            if let Some(port) = port {
                chat_config.general.port = port;
            }
        }
        Some(Command::PrintConfig) => {
            println!("{:#?}", chat_config);
            return Ok(());
        }
        None => {}
    }
    chat_config.validate()?;

    let level = match commandline.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _log_guard = setup_tracing(&chat_config.general.log_dir, level)?;

    run(chat_config)
}

fn run(chat_config: ChatConfig) -> AppResult<()> {
    let ChatConfig { general, network } = chat_config;
    let tracker = Arc::new(DeliveryTracker::new());
    let handler = TerminalHandler {
        role: general.role,
        tracker: tracker.clone(),
    };

    let manager = match general.role {
        Role::Listener => ConnectionManager::listen_with_config(general.port, handler, network)?,
        Role::Connector => ConnectionManager::connect_with_config(
            general.port,
            general.address.clone(),
            handler,
            network,
        )?,
    };
    match manager.local_addr() {
        Some(addr) => println!("*** listening on {}, type /quit to leave", addr),
        None => println!(
            "*** connecting to {}:{}, type /quit to leave",
            general.address, general.port
        ),
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        let text = line.trim_end();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        if !manager.is_connected() {
            println!("*** no connection, message not sent");
            continue;
        }
        let message = Message::new(text);
        tracker.record_sent(&message);
        println!("[You]: {}", message.text());
        manager.send(message);
    }

    drop(manager);
    println!("*** leaving chat");
    Ok(())
}
