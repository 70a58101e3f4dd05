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

extern crate config as _;

use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub const DEFAULT_PORT: u16 = 7878;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Listener,
    Connector,
}

impl Role {
    /// The role on the other end of the connection.
    pub fn peer(self) -> Role {
        match self {
            Role::Listener => Role::Connector,
            Role::Connector => Role::Listener,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Listener => write!(f, "listener"),
            Role::Connector => write!(f, "connector"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub role: Role,
    pub port: u16,
    /// Remote listener address, numeric or host name. Only used by the connector.
    pub address: String,
    pub log_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            role: Role::Listener,
            port: DEFAULT_PORT,
            address: "127.0.0.1".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub conn_read_buffer_size: usize,
    pub max_frame_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            conn_read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
}

impl ChatConfig {
    /// Loads the config file at `path` (optional, any format the `config` crate
    /// recognises by extension), then applies `DUOCHAT__SECTION__KEY`
    /// environment overrides.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ChatConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str).required(false))
            .add_source(
                config::Environment::with_prefix("DUOCHAT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let chat_config: ChatConfig = config.try_deserialize()?;
        chat_config.validate()?;
        Ok(chat_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.general.role == Role::Connector && self.general.port == 0 {
            return Err(AppError::InvalidValue(
                "connector needs a non-zero port".to_string(),
            ));
        }
        if self.network.max_frame_size < crate::message::constants::HEADER_LENGTH + 1 {
            return Err(AppError::InvalidValue(format!(
                "max_frame_size {} cannot hold a frame header",
                self.network.max_frame_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_missing_file_uses_defaults() -> AppResult<()> {
        let config = ChatConfig::set_up_config("does-not-exist/duochat.toml")?;
        assert_eq!(config.general.role, Role::Listener);
        assert_eq!(config.general.port, DEFAULT_PORT);
        assert_eq!(config.network, NetworkConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_file_overrides() -> AppResult<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "[general]\nrole = \"connector\"\nport = 9000\naddress = \"10.0.0.2\"\n\n[network]\nmax_frame_size = 2048"
        )?;

        let config = ChatConfig::set_up_config(file.path())?;
        assert_eq!(config.general.role, Role::Connector);
        assert_eq!(config.general.port, 9000);
        assert_eq!(config.general.address, "10.0.0.2");
        assert_eq!(config.network.max_frame_size, 2048);
        assert_eq!(
            config.network.conn_read_buffer_size,
            DEFAULT_READ_BUFFER_SIZE
        );
        Ok(())
    }

    #[test]
    fn test_tiny_frame_limit_is_rejected() -> AppResult<()> {
        let mut file = Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[network]\nmax_frame_size = 4")?;

        let result = ChatConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
        Ok(())
    }

    #[test]
    fn test_role_peer() {
        assert_eq!(Role::Listener.peer(), Role::Connector);
        assert_eq!(Role::Connector.to_string(), "connector");
    }
}
