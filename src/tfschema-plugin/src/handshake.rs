//! go-plugin compatible handshake.
//!
//! The host passes a magic cookie and the list of application protocol
//! versions it speaks through the environment. The plugin answers with one
//! line on stdout:
//!
//! ```text
//! CORE-PROTOCOL-VERSION|APP-PROTOCOL-VERSION|NETWORK|ADDRESS|PROTOCOL[|SERVER-CERT]
//! 1|5|unix|/tmp/plugin123456|grpc|
//! ```

use crate::error::PluginClientError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Version of the line format above. Plugins reporting anything else are rejected.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

pub const ENV_PROTOCOL_VERSIONS: &str = "PLUGIN_PROTOCOL_VERSIONS";
pub const ENV_MIN_PORT: &str = "PLUGIN_MIN_PORT";
pub const ENV_MAX_PORT: &str = "PLUGIN_MAX_PORT";
pub const ENV_UNIX_SOCKET_DIR: &str = "PLUGIN_UNIX_SOCKET_DIR";

const MIN_PORT: u16 = 10000;
const MAX_PORT: u16 = 25000;

/// Values both sides must agree on before a plugin will serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Fallback protocol version when no versioned plugin table is configured.
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl HandshakeConfig {
    /// The handshake Terraform uses for providers and provisioners.
    pub fn terraform() -> Self {
        Self {
            protocol_version: 4,
            magic_cookie_key: "TF_PLUGIN_MAGIC_COOKIE".to_string(),
            magic_cookie_value:
                "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2".to_string(),
        }
    }

    /// Environment variables to set on the plugin process.
    pub fn env(
        &self,
        protocol_versions: &[u32],
        unix_socket_dir: Option<&PathBuf>,
    ) -> Vec<(String, String)> {
        let versions = if protocol_versions.is_empty() {
            self.protocol_version.to_string()
        } else {
            protocol_versions
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut env = vec![
            (
                self.magic_cookie_key.clone(),
                self.magic_cookie_value.clone(),
            ),
            (ENV_PROTOCOL_VERSIONS.to_string(), versions),
            (ENV_MIN_PORT.to_string(), MIN_PORT.to_string()),
            (ENV_MAX_PORT.to_string(), MAX_PORT.to_string()),
        ];
        if let Some(dir) = unix_socket_dir {
            env.push((ENV_UNIX_SOCKET_DIR.to_string(), dir.display().to_string()));
        }
        env
    }
}

/// RPC protocols a plugin may announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    NetRpc,
    Grpc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::NetRpc => f.write_str("netrpc"),
            Protocol::Grpc => f.write_str("grpc"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // Plugins predating the protocol field announce nothing and speak net/rpc.
            "" | "netrpc" => Ok(Protocol::NetRpc),
            "grpc" => Ok(Protocol::Grpc),
            other => Err(format!("unknown protocol {other:?}")),
        }
    }
}

/// Where the plugin's RPC server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAddress {
    Tcp(String),
    Unix(PathBuf),
}

impl fmt::Display for PluginAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginAddress::Tcp(addr) => write!(f, "tcp://{addr}"),
            PluginAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// The parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub core_version: u32,
    pub protocol_version: u32,
    pub address: PluginAddress,
    pub protocol: Protocol,
    /// Base64 DER certificate, present when the plugin serves TLS.
    /// Plugins only serve TLS when the host offers a client certificate.
    pub server_cert: Option<String>,
}

impl HandshakeResponse {
    pub fn parse(line: &str) -> Result<Self, PluginClientError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let invalid = |reason: String| PluginClientError::Handshake {
            line: line.to_string(),
            reason,
        };

        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 4 {
            return Err(invalid(format!(
                "expected at least 4 fields, got {}",
                parts.len()
            )));
        }

        let core_version: u32 = parts[0]
            .parse()
            .map_err(|_| invalid(format!("core protocol version {:?} is not a number", parts[0])))?;
        if core_version != CORE_PROTOCOL_VERSION {
            return Err(invalid(format!(
                "incompatible core protocol version {core_version}, expected {CORE_PROTOCOL_VERSION}"
            )));
        }

        let protocol_version: u32 = parts[1]
            .parse()
            .map_err(|_| invalid(format!("protocol version {:?} is not a number", parts[1])))?;

        let address = match parts[2] {
            "tcp" => PluginAddress::Tcp(parts[3].to_string()),
            "unix" => PluginAddress::Unix(PathBuf::from(parts[3])),
            other => return Err(invalid(format!("unknown network type {other:?}"))),
        };

        let protocol = parts
            .get(4)
            .copied()
            .unwrap_or_default()
            .parse::<Protocol>()
            .map_err(invalid)?;

        let server_cert = parts
            .get(5)
            .filter(|cert| !cert.is_empty())
            .map(|cert| cert.to_string());

        Ok(Self {
            core_version,
            protocol_version,
            address,
            protocol,
            server_cert,
        })
    }

    /// Check the response against what the host is willing to speak.
    pub fn validate(&self, allowed_protocols: &[Protocol]) -> Result<(), PluginClientError> {
        if !allowed_protocols.contains(&self.protocol) {
            return Err(PluginClientError::Handshake {
                line: self.to_string(),
                reason: format!(
                    "plugin speaks {}, allowed protocols are {:?}",
                    self.protocol, allowed_protocols
                ),
            });
        }
        if self.server_cert.is_some() {
            return Err(PluginClientError::Handshake {
                line: self.to_string(),
                reason: "plugin announced a TLS certificate; TLS connections are not supported"
                    .to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for HandshakeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (network, addr) = match &self.address {
            PluginAddress::Tcp(addr) => ("tcp", addr.clone()),
            PluginAddress::Unix(path) => ("unix", path.display().to_string()),
        };
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.core_version,
            self.protocol_version,
            network,
            addr,
            self.protocol,
            self.server_cert.as_deref().unwrap_or_default()
        )
    }
}
