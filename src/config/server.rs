use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address of the HTTP API
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Directory receiving `d-config.log`
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            log_dir: default_log_dir(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.port() == 0 {
            return Err(Error::InvalidConfig("server.listen_address port cannot be 0".into()));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("server.log_dir cannot be empty".into()));
        }
        Ok(())
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8848))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
