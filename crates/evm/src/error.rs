use sandbox_types::Address;
use thiserror::Error;

pub type EvmResult<T> = Result<T, EvmError>;
pub type StateResult<T> = Result<T, StateError>;

/// Failures of a world state operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    #[error("code already set for account {0:x}")]
    CodeAlreadySet(Address),

    #[error("nonce uint64 overflow")]
    NonceOverflow,

    #[error("unknown or invalidated snapshot {0}")]
    InvalidSnapshot(u64),
}

/// Reasons an execution frame fails.
///
/// Messages use go-ethereum's wording, which clients match on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    #[error("stack limit reached 1024")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("invalid jump destination: {0}")]
    InvalidJump(usize),

    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("out of gas")]
    OutOfGas,

    #[error("execution reverted")]
    Reverted,

    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    #[error("max call depth exceeded")]
    CallDepthExceeded,

    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    #[error("write protection")]
    StaticCallStateModification,

    #[error("precompile failed: {0}")]
    PrecompileFailed(String),

    #[error("contract address collision")]
    CreateCollision,

    #[error("max code size exceeded")]
    CodeSizeExceeded,

    #[error("invalid code: must not begin with 0xef")]
    InvalidCode,

    #[error("nonce uint64 overflow")]
    NonceOverflow,

    #[error("execution step limit exceeded")]
    StepLimitExceeded,

    #[error("contract creation must not name a target")]
    UnexpectedTarget,

    #[error("call requires a target address")]
    MissingTarget,

    #[error(transparent)]
    State(StateError),
}

impl From<StateError> for EvmError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::InsufficientBalance => EvmError::InsufficientBalance,
            StateError::NonceOverflow => EvmError::NonceOverflow,
            other => EvmError::State(other),
        }
    }
}
