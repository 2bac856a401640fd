//! Server configuration loaded from environment variables and the port file.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use vault_shared::constants::DEFAULT_PORT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    /// Env: `VAULT_HOST`
    /// Default: `0.0.0.0`
    pub host: IpAddr,

    /// TCP port to listen on.
    /// Env: `VAULT_PORT`, otherwise the first line of `port_file`.
    /// Default: `1234`
    pub port: u16,

    /// File holding the port number on its first line.
    /// Env: `VAULT_PORT_FILE`
    /// Default: `port.info`
    pub port_file: PathBuf,

    /// Root directory for uploaded content (`<root>/<client-id-hex>/<file>`).
    /// Env: `VAULT_STORAGE_PATH`
    /// Default: `./files`
    pub storage_path: PathBuf,

    /// SQLite database file.
    /// Env: `VAULT_DB_PATH`
    /// Default: `./server.db`
    pub db_path: PathBuf,

    /// Largest accepted upload (ciphertext bytes); 0 disables the check.
    /// Env: `VAULT_MAX_FILE_SIZE`
    /// Default: 64 MiB
    pub max_file_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            port_file: PathBuf::from("port.info"),
            storage_path: PathBuf::from("./files"),
            db_path: PathBuf::from("./server.db"),
            max_file_size: 64 * 1024 * 1024, // 64 MiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to the
    /// port file and then to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("VAULT_HOST") {
            match host.parse::<IpAddr>() {
                Ok(parsed) => config.host = parsed,
                Err(_) => tracing::warn!(value = %host, "Invalid VAULT_HOST, using default"),
            }
        }

        if let Ok(path) = std::env::var("VAULT_PORT_FILE") {
            config.port_file = PathBuf::from(path);
        }

        config.port = match std::env::var("VAULT_PORT") {
            Ok(val) => parse_port(&val).unwrap_or_else(|| {
                tracing::warn!(value = %val, "Invalid VAULT_PORT, using default");
                DEFAULT_PORT
            }),
            Err(_) => load_port_file(&config.port_file),
        };

        if let Ok(path) = std::env::var("VAULT_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("VAULT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("VAULT_MAX_FILE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) => config.max_file_size = n,
                Err(_) => tracing::warn!(value = %val, "Invalid VAULT_MAX_FILE_SIZE, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Read the port from the first line of `path`. A missing, unreadable or
/// malformed file yields the default port.
pub fn load_port_file(path: &Path) -> u16 {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read port file");
            }
            return DEFAULT_PORT;
        }
    };

    let line = contents.lines().next().unwrap_or("");
    parse_port(line).unwrap_or_else(|| {
        tracing::warn!(path = %path.display(), value = %line.trim(), "Invalid port in port file, using default");
        DEFAULT_PORT
    })
}

/// Decimal digits only, within `0..=65535`.
fn parse_port(value: &str) -> Option<u16> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<u16>().ok()
}
