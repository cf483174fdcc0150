pub mod error;
pub mod sandbox;
pub mod types;

pub use error::{Result, SandboxError};
pub use sandbox::{
    Sandbox, SandboxConfig, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE, DEFAULT_STACK_SIZE,
    FIRST_ACCOUNT_INDEX, MIN_STACK_SIZE,
};
pub use types::{
    AccountCreated, AccountView, CallRequest, CallResponse, CreateAccountRequest, DeployRequest,
    DeployResponse, Status,
};
