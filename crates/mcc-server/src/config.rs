//! Configuration: optional TOML file, overridden by flags and environment.

use crate::auth::SessionAuth;
use clap::Parser;
use mcc_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Command line. Every flag can also come from the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "mcc", version, about = "Mission Control console for an agent gateway")]
pub struct Cli {
    /// TOML config file; flags and env vars override its values.
    #[arg(long, env = "MCC_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, env = "MCC_HOST")]
    pub host: Option<String>,
    #[arg(long, env = "MCC_PORT")]
    pub port: Option<u16>,
    /// Directory for the audit database.
    #[arg(long, env = "MCC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    /// Agent workspace holding MEMORY.md and memory/*.md.
    #[arg(long, env = "OPENCLAW_WORKSPACE")]
    pub workspace: Option<PathBuf>,
    #[arg(long, env = "GATEWAY_BASE_URL")]
    pub gateway_base_url: Option<String>,
    #[arg(long, env = "GATEWAY_WS_URL")]
    pub gateway_ws_url: Option<String>,
    #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true)]
    pub gateway_token: Option<String>,
    #[arg(long, env = "GATEWAY_RPC_PATH")]
    pub gateway_rpc_path: Option<String>,
    #[arg(long, env = "GATEWAY_TOOLS_INVOKE_PATH")]
    pub gateway_invoke_path: Option<String>,
    /// Console login password. Required when listening on a non-loopback host.
    #[arg(long, env = "MCC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Secret used to sign session cookies.
    #[arg(long, env = "MCC_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub auth: AuthSection,
    pub gateway: GatewayConfig,
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub host: String,
    pub port: u16,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub password: Option<String>,
    pub session_secret: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            password: None,
            session_secret: "mcc-dev-secret".to_string(),
        }
    }
}

/// Unset entries resolve relative to the home directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub data_dir: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    /// Host-side agent runtime config listing configured agents.
    pub agents_file: Option<PathBuf>,
}

/// Fully resolved filesystem locations.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub db_file: PathBuf,
    pub workspace: PathBuf,
    pub memory_dir: PathBuf,
    pub long_term_memory: PathBuf,
    pub agents_file: PathBuf,
}

impl Paths {
    /// Layout rooted at `workspace`, with the database under `data_dir`.
    pub fn new(data_dir: PathBuf, workspace: PathBuf, agents_file: PathBuf) -> Self {
        Self {
            db_file: data_dir.join("mcc.sqlite"),
            memory_dir: workspace.join("memory"),
            long_term_memory: workspace.join("MEMORY.md"),
            data_dir,
            workspace,
            agents_file,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid listen address {0:?}")]
    Listen(String),
    #[error("MCC_PASSWORD is required when listening on non-loopback host {0:?}")]
    PasswordRequired(String),
}

impl AppConfig {
    /// Load the file named by `cli.config` (if any) and apply overrides.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    /// Refuse to expose the console beyond loopback without a password.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requires_auth() && self.password().is_none() {
            return Err(ConfigError::PasswordRequired(self.app.host.clone()));
        }
        Ok(())
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self.app.host.as_str(), "127.0.0.1" | "::1" | "localhost")
    }

    fn password(&self) -> Option<&str> {
        self.auth.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Login settings, when the console is reachable beyond loopback.
    pub fn session_auth(&self) -> Option<SessionAuth> {
        if !self.requires_auth() {
            return None;
        }
        let password = self.password()?;
        Some(SessionAuth::new(password, &self.auth.session_secret))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.app.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.app.port = port;
        }
        if let Some(dir) = &cli.data_dir {
            self.paths.data_dir = Some(dir.clone());
        }
        if let Some(dir) = &cli.workspace {
            self.paths.workspace = Some(dir.clone());
        }
        let gw = &mut self.gateway;
        override_with(&mut gw.base_url, &cli.gateway_base_url);
        override_with(&mut gw.ws_url, &cli.gateway_ws_url);
        override_with(&mut gw.rpc_path, &cli.gateway_rpc_path);
        override_with(&mut gw.invoke_path, &cli.gateway_invoke_path);
        if let Some(token) = &cli.gateway_token {
            gw.token = Some(token.clone());
        }
        if let Some(password) = &cli.password {
            self.auth.password = Some(password.clone());
        }
        override_with(&mut self.auth.session_secret, &cli.session_secret);
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = match self.app.host.as_str() {
            "localhost" => "127.0.0.1",
            other => other,
        };
        let raw = if host.contains(':') {
            format!("[{host}]:{}", self.app.port)
        } else {
            format!("{host}:{}", self.app.port)
        };
        raw.parse().map_err(|_| ConfigError::Listen(raw))
    }

    pub fn paths(&self) -> Paths {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = self
            .paths
            .data_dir
            .clone()
            .unwrap_or_else(|| home.join(".mcc-local"));
        let workspace = self
            .paths
            .workspace
            .clone()
            .unwrap_or_else(|| home.join(".openclaw").join("workspace"));
        let agents_file = self
            .paths
            .agents_file
            .clone()
            .unwrap_or_else(|| home.join(".openclaw").join("openclaw.json"));
        Paths::new(data_dir, workspace, agents_file)
    }
}

fn override_with(field: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *field = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [app]
            port = 4000

            [gateway]
            base_url = "http://gw:9471"
            token = "abc"

            [paths]
            workspace = "/srv/agent"
            "#,
        )
        .unwrap();
        assert_eq!(config.app.host, "127.0.0.1");
        assert_eq!(config.app.port, 4000);
        assert_eq!(config.gateway.base_url, "http://gw:9471");
        assert_eq!(config.gateway.invoke_path, "/tools/invoke");
        let paths = config.paths();
        assert_eq!(paths.memory_dir, PathBuf::from("/srv/agent/memory"));
        assert_eq!(paths.long_term_memory, PathBuf::from("/srv/agent/MEMORY.md"));
    }

    #[test]
    fn cli_overrides_file() {
        let mut config = AppConfig::default();
        let cli = Cli {
            port: Some(9999),
            gateway_ws_url: Some("ws://other:1/ws".into()),
            gateway_token: Some("tok".into()),
            ..Default::default()
        };
        config.apply(&cli);
        assert_eq!(config.app.port, 9999);
        assert_eq!(config.gateway.ws_url, "ws://other:1/ws");
        assert_eq!(config.gateway.token(), Some("tok"));
        assert_eq!(config.gateway.rpc_path, "/rpc");
    }

    #[test]
    fn listen_addr_forms() {
        let mut config = AppConfig::default();
        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:3001");
        config.app.host = "::1".into();
        assert_eq!(config.listen_addr().unwrap().to_string(), "[::1]:3001");
        config.app.host = "not a host".into();
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn public_host_needs_password() {
        let mut config = AppConfig::default();
        assert!(!config.requires_auth());
        config.validate().unwrap();
        assert!(config.session_auth().is_none());

        config.app.host = "0.0.0.0".into();
        assert!(config.requires_auth());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::PasswordRequired(ref host) if host == "0.0.0.0"));

        config.auth.password = Some(String::new());
        assert!(config.validate().is_err());

        config.apply(&Cli {
            password: Some("s3cret".into()),
            ..Default::default()
        });
        config.validate().unwrap();
        assert!(config.session_auth().unwrap().password_matches("s3cret"));
    }

    #[test]
    fn load_refuses_public_host_without_password() {
        let cli = Cli {
            host: Some("192.168.1.10".into()),
            ..Default::default()
        };
        assert!(matches!(
            AppConfig::load(&cli),
            Err(ConfigError::PasswordRequired(_))
        ));

        let cli = Cli {
            host: Some("localhost".into()),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_ok());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = AppConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
