// CLI Configuration - Convert CLI args and config file to node config
// Principle: Clear mapping between user input and internal configuration

use crate::cli::{base_path_or_default, RunCmd};
use crate::rpc::RpcConfig;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default EVM chain id
pub const DEFAULT_CHAIN_ID: u64 = 9000;

/// Complete node configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Transaction index location
    pub base_path: PathBuf,
    /// Config file, if any (re-read on reload)
    pub config_file: Option<PathBuf>,
    /// EVM chain id
    pub chain_id: u64,
    /// RPC configuration
    pub rpc: RpcConfig,
    /// Fix height given on the command line, wins over the file on reload
    fix_height_override: Option<u64>,
}

/// Configuration file format
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub chain_id: Option<u64>,
    pub json_rpc: RpcConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ConfigReadError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ConfigParseError(e.to_string()))
    }
}

impl NodeConfig {
    /// Create configuration from CLI run command. Flags override the file.
    pub fn from_run_cmd(cmd: &RunCmd) -> Result<Self, ConfigError> {
        let file = match &cmd.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };

        let mut rpc = file.json_rpc;

        if let Some(port) = cmd.rpc_port {
            rpc.port = port;
        }
        if let Some(addr) = &cmd.rpc_addr {
            rpc.address = parse_ip_addr(addr)?;
        }
        if !cmd.rpc_cors.is_empty() {
            rpc.cors_origins = cmd.rpc_cors.clone();
        }
        if let Some(height) = cmd.fix_revert_gas_refund_height {
            rpc.fix_revert_gas_refund_height = height;
        }

        Ok(Self {
            base_path: base_path_or_default(cmd.base_path.as_ref()),
            config_file: cmd.config.clone(),
            chain_id: cmd.chain_id.or(file.chain_id).unwrap_or(DEFAULT_CHAIN_ID),
            rpc,
            fix_height_override: cmd.fix_revert_gas_refund_height,
        })
    }

    /// Re-read the fix height, honouring a command line override
    pub fn reload_fix_revert_gas_refund_height(&self) -> Result<u64, ConfigError> {
        if let Some(height) = self.fix_height_override {
            return Ok(height);
        }
        match &self.config_file {
            Some(path) => Ok(FileConfig::load(path)?.json_rpc.fix_revert_gas_refund_height),
            None => Ok(self.rpc.fix_revert_gas_refund_height),
        }
    }
}

fn parse_ip_addr(addr: &str) -> Result<IpAddr, ConfigError> {
    match addr {
        "localhost" => Ok(IpAddr::from([127, 0, 0, 1])),
        _ => addr
            .parse()
            .map_err(|_| ConfigError::InvalidIpAddress(addr.to_string())),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Failed to read config file: {0}")]
    ConfigReadError(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_cmd() -> RunCmd {
        RunCmd {
            base_path: Some(PathBuf::from("/tmp/kratos-test")),
            config: None,
            chain_id: None,
            rpc_port: None,
            rpc_addr: None,
            rpc_cors: vec![],
            fix_revert_gas_refund_height: None,
        }
    }

    fn write_config(dir: &TempDir, fix_height: u64) -> PathBuf {
        let path = dir.path().join("config.json");
        let json = serde_json::json!({
            "chain_id": 777,
            "json_rpc": {
                "address": "0.0.0.0",
                "port": 9545,
                "fix_revert_gas_refund_height": fix_height,
            }
        });
        std::fs::write(&path, json.to_string()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::from_run_cmd(&run_cmd()).unwrap();
        assert_eq!(config.chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(config.rpc, RpcConfig::default());
        assert_eq!(config.rpc.fix_revert_gas_refund_height, 0);
        assert_eq!(config.reload_fix_revert_gas_refund_height().unwrap(), 0);
    }

    #[test]
    fn test_file_then_flags() {
        let dir = TempDir::new().unwrap();
        let mut cmd = run_cmd();
        cmd.config = Some(write_config(&dir, 500));

        let config = NodeConfig::from_run_cmd(&cmd).unwrap();
        assert_eq!(config.chain_id, 777);
        assert_eq!(config.rpc.port, 9545);
        assert_eq!(config.rpc.address, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.rpc.fix_revert_gas_refund_height, 500);

        cmd.rpc_port = Some(8546);
        cmd.rpc_addr = Some("localhost".to_string());
        cmd.chain_id = Some(1);
        let config = NodeConfig::from_run_cmd(&cmd).unwrap();
        assert_eq!(config.rpc.port, 8546);
        assert_eq!(config.rpc.address, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.chain_id, 1);
    }

    #[test]
    fn test_reload_reads_file_unless_overridden() {
        let dir = TempDir::new().unwrap();
        let mut cmd = run_cmd();
        cmd.config = Some(write_config(&dir, 500));

        let config = NodeConfig::from_run_cmd(&cmd).unwrap();
        write_config(&dir, 900);
        assert_eq!(config.reload_fix_revert_gas_refund_height().unwrap(), 900);

        cmd.fix_revert_gas_refund_height = Some(42);
        let config = NodeConfig::from_run_cmd(&cmd).unwrap();
        assert_eq!(config.rpc.fix_revert_gas_refund_height, 42);
        assert_eq!(config.reload_fix_revert_gas_refund_height().unwrap(), 42);
    }

    #[test]
    fn test_config_errors() {
        let dir = TempDir::new().unwrap();

        let mut cmd = run_cmd();
        cmd.config = Some(dir.path().join("missing.json"));
        assert!(matches!(
            NodeConfig::from_run_cmd(&cmd),
            Err(ConfigError::ConfigNotFound(_))
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        cmd.config = Some(bad);
        assert!(matches!(
            NodeConfig::from_run_cmd(&cmd),
            Err(ConfigError::ConfigParseError(_))
        ));

        // Negative heights are rejected at load time
        let negative = dir.path().join("negative.json");
        std::fs::write(&negative, r#"{"json_rpc":{"fix_revert_gas_refund_height":-1}}"#).unwrap();
        cmd.config = Some(negative);
        assert!(matches!(
            NodeConfig::from_run_cmd(&cmd),
            Err(ConfigError::ConfigParseError(_))
        ));

        let mut cmd = run_cmd();
        cmd.rpc_addr = Some("not-an-ip".to_string());
        assert!(matches!(
            NodeConfig::from_run_cmd(&cmd),
            Err(ConfigError::InvalidIpAddress(_))
        ));
    }
}
