use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use url::Url;

pub const CONNECTION_MODE_ENV: &str = "REDACTIVE_CONNECTION_MODE";
pub const AUTH_BASE_URL_ENV: &str = "REDACTIVE_AUTH_BASE_URL";
pub const SEARCH_BASE_URL_ENV: &str = "REDACTIVE_SEARCH_BASE_URL";

/// Network path used to reach the Redactive services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    #[default]
    Internet,
    AwsPrivateLink,
    AzurePrivateLink,
    GcpPrivateServiceConnect,
}

impl ConnectionMode {
    /// Read the mode from `REDACTIVE_CONNECTION_MODE`, defaulting to the public internet.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONNECTION_MODE_ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(ConnectionMode::Internet),
        }
    }
}

impl std::str::FromStr for ConnectionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internet" => Ok(ConnectionMode::Internet),
            "awsprivatelink" => Ok(ConnectionMode::AwsPrivateLink),
            "azureprivatelink" => Ok(ConnectionMode::AzurePrivateLink),
            "gcpprivateserviceconnect" => Ok(ConnectionMode::GcpPrivateServiceConnect),
            other => Err(ConfigError::InvalidConnectionMode(other.to_owned())),
        }
    }
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            ConnectionMode::Internet => "internet",
            ConnectionMode::AwsPrivateLink => "awsprivatelink",
            ConnectionMode::AzurePrivateLink => "azureprivatelink",
            ConnectionMode::GcpPrivateServiceConnect => "gcpprivateserviceconnect",
        };
        write!(f, "{value}")
    }
}

/// Base URLs for the auth and search services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub auth_base_url: Url,
    pub search_base_url: Url,
}

impl ClientConfig {
    pub fn new(auth_base_url: Url, search_base_url: Url) -> Self {
        Self {
            auth_base_url,
            search_base_url,
        }
    }

    /// Default endpoints for a connection mode.
    pub fn for_mode(mode: ConnectionMode) -> Result<Self, ConfigError> {
        let (auth, search) = match mode {
            ConnectionMode::Internet => ("https://api.redactive.ai", "https://grpc.redactive.ai"),
            ConnectionMode::AwsPrivateLink => (
                "https://awsprivatelink.redactive.app",
                "https://awsprivatelink.redactive.app:50443",
            ),
            other => return Err(ConfigError::UnsupportedConnectionMode(other)),
        };
        Ok(Self::new(Url::parse(auth)?, Url::parse(search)?))
    }

    /// Resolve the connection mode from the environment, then apply any explicit URL overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::for_mode(ConnectionMode::from_env()?)?;
        if let Ok(value) = env::var(AUTH_BASE_URL_ENV) {
            config.auth_base_url = Url::parse(&value)?;
        }
        if let Ok(value) = env::var(SEARCH_BASE_URL_ENV) {
            config.search_base_url = Url::parse(&value)?;
        }
        Ok(config)
    }
}

/// Locates the directory holding persisted credential records.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("ai", "redactive", "redactive")
            .ok_or(ConfigError::MissingProjectDirs)?;
        Self::with_root(dirs.config_dir())
    }

    /// Use an explicit directory, creating it if needed.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one credential file per user.
    pub fn credentials_dir(&self) -> PathBuf {
        self.root.join("credentials")
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid REDACTIVE_CONNECTION_MODE value '{0}'")]
    InvalidConnectionMode(String),
    #[error("connection mode '{0}' is not yet supported")]
    UnsupportedConnectionMode(ConnectionMode),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("unable to determine configuration directory for redactive")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
