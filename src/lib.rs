use std::sync::Arc;

pub mod config;

pub use config::{BlockConfig, Config, ExecutionConfig, LogConfig, ServerConfig};

// Re-export crate modules
pub use sandbox_crypto as crypto;
pub use sandbox_evm as evm;
pub use sandbox_executor as executor;
pub use sandbox_rpc as rpc;
pub use sandbox_types as types;

use sandbox_executor::Sandbox;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A fresh sandbox with the configured chain parameters and the HTTP
/// routes serving it.
pub fn app(config: &Config) -> anyhow::Result<(Arc<Sandbox>, axum::Router)> {
    let sandbox = Arc::new(Sandbox::new(config.sandbox_config()?));
    let router = sandbox_rpc::router(sandbox.clone(), config.server.cors);
    Ok((sandbox, router))
}
