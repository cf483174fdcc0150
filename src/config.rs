use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use sandbox_evm::{BlockContext, EvmConfig, MAX_CODE_SIZE};
use sandbox_executor::{SandboxConfig, DEFAULT_STACK_SIZE, FIRST_ACCOUNT_INDEX, MIN_STACK_SIZE};
use sandbox_types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Complete sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// The single block every request executes in
    pub block: BlockConfig,
    pub execution: ExecutionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin
    pub cors: bool,
    /// Defaults to the number of cores
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub coinbase: String,
    pub number: u64,
    pub timestamp: u64,
    pub difficulty: u64,
    pub gas_limit: u64,
    /// In wei
    pub base_fee: u64,
    pub blob_base_fee: u64,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_call_depth: usize,
    /// Instructions allowed per request, across all nested frames
    pub max_steps: u64,
    pub max_code_size: usize,
    /// Counter value of the first allocated account address
    pub first_account_index: u64,
    /// Stack size in bytes of the thread each request executes on. Nested
    /// frames recurse on the native stack.
    pub stack_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            block: BlockConfig::default(),
            execution: ExecutionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            cors: true,
            worker_threads: None,
        }
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        let block = BlockContext::default();
        Self {
            coinbase: block.coinbase.to_hex(),
            number: block.number.low_u64(),
            timestamp: block.timestamp.low_u64(),
            difficulty: block.difficulty.low_u64(),
            gas_limit: block.gas_limit.low_u64(),
            base_fee: block.base_fee.low_u64(),
            blob_base_fee: block.blob_base_fee.low_u64(),
            chain_id: block.chain_id.low_u64(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let evm = EvmConfig::default();
        Self {
            max_call_depth: evm.max_call_depth,
            max_steps: evm.max_steps,
            max_code_size: evm.max_code_size,
            first_account_index: FIRST_ACCOUNT_INDEX,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl BlockConfig {
    pub fn context(&self) -> Result<BlockContext> {
        let coinbase = Address::from_hex_lenient(&self.coinbase)
            .with_context(|| format!("Invalid coinbase address: {}", self.coinbase))?;
        Ok(BlockContext {
            coinbase,
            number: U256::from(self.number),
            timestamp: U256::from(self.timestamp),
            difficulty: U256::from(self.difficulty),
            gas_limit: U256::from(self.gas_limit),
            base_fee: U256::from(self.base_fee),
            blob_base_fee: U256::from(self.blob_base_fee),
            chain_id: U256::from(self.chain_id),
        })
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml()?).context("Failed to write configuration file")?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if self.server.worker_threads == Some(0) {
            anyhow::bail!("worker_threads must be greater than 0");
        }

        self.block.context()?;

        if self.execution.max_call_depth == 0 || self.execution.max_call_depth > 1024 {
            anyhow::bail!("max_call_depth must be between 1 and 1024");
        }
        if self.execution.max_steps == 0 {
            anyhow::bail!("max_steps must be greater than 0");
        }
        if self.execution.max_code_size == 0 || self.execution.max_code_size > MAX_CODE_SIZE {
            anyhow::bail!("max_code_size must be between 1 and {}", MAX_CODE_SIZE);
        }
        if self.execution.stack_size < MIN_STACK_SIZE {
            anyhow::bail!("stack_size must be at least {} MiB", MIN_STACK_SIZE / (1024 * 1024));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.server.host, self.server.port))
    }

    pub fn sandbox_config(&self) -> Result<SandboxConfig> {
        Ok(SandboxConfig {
            block: self.block.context()?,
            evm: EvmConfig {
                max_call_depth: self.execution.max_call_depth,
                max_steps: self.execution.max_steps,
                max_code_size: self.execution.max_code_size,
            },
            first_account_index: self.execution.first_account_index,
            stack_size: self.execution.stack_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.block.chain_id, 1337);
        assert_eq!(config.execution.max_call_depth, 1024);
        assert!(config.validate().is_ok());
        assert_eq!(config.sandbox_config().unwrap(), SandboxConfig::default());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();

        config.execution.max_call_depth = 0;
        assert!(config.validate().is_err());
        config.execution.max_call_depth = 16;
        assert!(config.validate().is_ok());

        config.execution.max_code_size = MAX_CODE_SIZE + 1;
        assert!(config.validate().is_err());
        config.execution.max_code_size = MAX_CODE_SIZE;

        config.execution.stack_size = 2 * 1024 * 1024;
        assert!(config.validate().is_err());
        config.execution.stack_size = MIN_STACK_SIZE;
        assert!(config.validate().is_ok());

        config.server.host = "not a host".to_string();
        assert!(config.validate().is_err());
        config.server.host = "127.0.0.1".to_string();

        config.block.coinbase = "0xzz".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [block]
            number = 12
            coinbase = "0x00000000000000000000000000000000000000aa"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.block.chain_id, 1337);

        let block = config.block.context().unwrap();
        assert_eq!(block.number, U256::from(12));
        assert_eq!(block.coinbase, Address::from_low_u64_be(0xaa));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let parsed: Config = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
