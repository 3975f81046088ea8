//! Configuration module for aohttp
//!
//! JSON configuration for both roles. Every field has a default matching
//! the command-line defaults, so an empty object is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::Address;
use crate::error::{Error, Result};
use crate::protocol::{AcceptorConfig, InitiatorConfig, DEFAULT_PATH, DEFAULT_UPGRADE};
use crate::session::{SessionConfig, TlsConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log configuration
    pub log: LogConfig,

    /// Initiator settings
    pub client: ClientConfig,

    /// Acceptor settings
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Initiator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local address to bind on
    pub listen: String,

    /// Local port to bind on
    pub listen_port: u16,

    /// Remote server
    pub target: String,

    /// Remote server port
    pub port: u16,

    /// Remote path
    pub path: String,

    /// Wrap the remote connection in TLS
    pub ssl: bool,

    /// Host header to send; empty means the target name
    pub host: String,

    /// Upgrade token to request
    pub upgrade: String,

    /// TLS server name to present; empty means the target name
    pub sni: String,

    /// Skip certificate verification (self-signed acceptors)
    pub allow_insecure: bool,

    /// Seconds to wait for the upgrade response
    pub response_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen: "localhost".to_string(),
            listen_port: 42070,
            target: "localhost".to_string(),
            port: 42069,
            path: DEFAULT_PATH.to_string(),
            ssl: false,
            host: "localhost".to_string(),
            upgrade: DEFAULT_UPGRADE.to_string(),
            sni: String::new(),
            allow_insecure: false,
            response_timeout_secs: 3,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        validate_path(&self.path)?;
        validate_token("upgrade", &self.upgrade)?;
        if self.target.is_empty() {
            return Err(Error::Config("client.target must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("client.port must not be 0".into()));
        }
        if self.sni.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!("invalid client.sni: {:?}", self.sni)));
        }
        if self.response_timeout_secs == 0 {
            return Err(Error::Config("client.response_timeout_secs must not be 0".into()));
        }
        Ok(())
    }

    /// Where the local application connects
    pub fn listen_address(&self) -> Address {
        Address::from_host_port(&self.listen, self.listen_port)
    }

    /// The acceptor to dial
    pub fn target_address(&self) -> Address {
        Address::from_host_port(&self.target, self.port)
    }

    pub fn handshake(&self) -> InitiatorConfig {
        InitiatorConfig::new(&self.path, &self.host, &self.target, &self.upgrade)
            .with_response_timeout(Duration::from_secs(self.response_timeout_secs))
    }

    pub fn session(&self) -> SessionConfig {
        if self.ssl {
            SessionConfig::Tls(TlsConfig {
                server_name: (!self.sni.is_empty()).then(|| self.sni.clone()),
                allow_insecure: self.allow_insecure,
                ..Default::default()
            })
        } else {
            SessionConfig::Plain
        }
    }
}

/// Acceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind_address: String,

    /// Bind port
    pub bind_port: u16,

    /// Backend port on the loopback interface
    pub target_port: u16,

    /// Only acceptable path
    pub path: String,

    /// Only acceptable method
    pub method: String,

    /// Only acceptable upgrade token
    pub upgrade: String,

    /// Answer every rejection with 404
    pub hidden: bool,

    /// Serve the handshake over TLS
    pub tls: Option<ServerTlsSettings>,
}

/// Acceptor TLS settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTlsSettings {
    /// Certificate chain (PEM)
    pub certificate_file: String,

    /// Private key (PEM)
    pub key_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "localhost".to_string(),
            bind_port: 42069,
            target_port: 80,
            path: DEFAULT_PATH.to_string(),
            method: "GET".to_string(),
            upgrade: DEFAULT_UPGRADE.to_string(),
            hidden: false,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_path(&self.path)?;
        validate_token("method", &self.method)?;
        validate_token("upgrade", &self.upgrade)?;
        if self.target_port == 0 {
            return Err(Error::Config("server.target_port must not be 0".into()));
        }
        if let Some(tls) = &self.tls {
            if tls.certificate_file.is_empty() || tls.key_file.is_empty() {
                return Err(Error::Config(
                    "server.tls needs both certificate_file and key_file".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Address {
        Address::from_host_port(&self.bind_address, self.bind_port)
    }

    /// The local backend every tunnel is bridged to
    pub fn backend_address(&self) -> Address {
        Address::loopback(self.target_port)
    }

    pub fn acceptor(&self) -> AcceptorConfig {
        AcceptorConfig {
            path: self.path.clone(),
            method: self.method.clone(),
            upgrade: self.upgrade.clone(),
            hidden: self.hidden,
        }
    }

    pub fn session(&self) -> SessionConfig {
        match &self.tls {
            Some(tls) => SessionConfig::Tls(TlsConfig {
                certificate_file: Some(tls.certificate_file.clone()),
                key_file: Some(tls.key_file.clone()),
                ..Default::default()
            }),
            None => SessionConfig::Plain,
        }
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::Config(format!("path must start with '/': {:?}", path)));
    }
    Ok(())
}

fn validate_token(name: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Config(format!("invalid {}: {:?}", name, value)));
    }
    Ok(())
}
