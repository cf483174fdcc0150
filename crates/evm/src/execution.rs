use crate::error::EvmError;
use sandbox_crypto::{keccak256, keccak256_concat};
use sandbox_types::{Address, H256, U256};

/// A top-level request against the world state.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub caller: Address,
    /// `None` deploys `data` as init code.
    pub target: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
}

impl ExecutionRequest {
    pub fn create(caller: Address, value: U256, init_code: Vec<u8>, gas_limit: u64) -> Self {
        Self {
            caller,
            target: None,
            value,
            data: init_code,
            gas_limit,
        }
    }

    pub fn call(
        caller: Address,
        target: Address,
        value: U256,
        input: Vec<u8>,
        gas_limit: u64,
    ) -> Self {
        Self {
            caller,
            target: Some(target),
            value,
            data: input,
            gas_limit,
        }
    }
}

/// The frame an interpreter runs in.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub caller: Address,
    pub address: Address,
    pub value: U256,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub is_static: bool,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    pub coinbase: Address,
    pub number: U256,
    pub timestamp: U256,
    pub difficulty: U256,
    pub gas_limit: U256,
    pub base_fee: U256,
    pub blob_base_fee: U256,
    pub chain_id: U256,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            coinbase: Address::ZERO,
            number: U256::zero(),
            timestamp: U256::zero(),
            difficulty: U256::zero(),
            gas_limit: U256::from(100_000_000u64),
            base_fee: U256::from(1_000_000_000u64),
            blob_base_fee: U256::one(),
            chain_id: U256::from(1337u64),
        }
    }
}

impl BlockContext {
    /// Hash of a recent block: `keccak256` of its decimal number for the 256
    /// blocks below the current one, zero otherwise.
    pub fn block_hash(&self, number: U256) -> H256 {
        if number >= self.number || self.number - number > U256::from(256u64) {
            return H256::zero();
        }
        keccak256(number.to_string().as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Revert,
    Halt(EvmError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub gas_left: u64,
    pub return_data: Vec<u8>,
    pub logs: Vec<Log>,
    pub created_address: Option<Address>,
}

impl ExecutionResult {
    pub fn success(return_data: Vec<u8>, gas_left: u64) -> Self {
        Self {
            status: ExecutionStatus::Success,
            gas_left,
            return_data,
            logs: Vec::new(),
            created_address: None,
        }
    }

    pub fn revert(return_data: Vec<u8>, gas_left: u64) -> Self {
        Self {
            status: ExecutionStatus::Revert,
            gas_left,
            return_data,
            logs: Vec::new(),
            created_address: None,
        }
    }

    /// Exceptional halt: the frame's gas is gone.
    pub fn halt(error: EvmError) -> Self {
        Self::aborted(error, 0)
    }

    /// A failure detected before the frame started running, so the gas
    /// handed to it is returned untouched.
    pub fn aborted(error: EvmError, gas_left: u64) -> Self {
        Self {
            status: ExecutionStatus::Halt(error),
            gas_left,
            return_data: Vec::new(),
            logs: Vec::new(),
            created_address: None,
        }
    }

    pub fn with_logs(mut self, logs: Vec<Log>) -> Self {
        self.logs = logs;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// The error a failed execution is reported with.
    pub fn error(&self) -> Option<EvmError> {
        match &self.status {
            ExecutionStatus::Success => None,
            ExecutionStatus::Revert => Some(EvmError::Reverted),
            ExecutionStatus::Halt(err) => Some(err.clone()),
        }
    }
}

/// Message for a nested or top-level call frame.
#[derive(Debug, Clone)]
pub(crate) struct CallMessage {
    pub caller: Address,
    /// Account whose storage and balance the frame runs against.
    pub address: Address,
    /// Account whose code is executed.
    pub code_address: Address,
    pub value: U256,
    pub transfers_value: bool,
    pub input: Vec<u8>,
    pub gas_limit: u64,
    pub is_static: bool,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct CreateMessage {
    pub caller: Address,
    pub value: U256,
    pub init_code: Vec<u8>,
    pub gas_limit: u64,
    pub salt: Option<H256>,
    pub depth: usize,
}

/// Address of a contract created with `CREATE`:
/// `keccak256(rlp([sender, nonce]))[12..]`.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let nonce_bytes = nonce.to_be_bytes();
    let significant = nonce_bytes
        .iter()
        .position(|b| *b != 0)
        .map_or(&[][..], |start| &nonce_bytes[start..]);

    let mut payload = Vec::with_capacity(30);
    payload.push(0x80 + Address::LEN as u8);
    payload.extend_from_slice(sender.as_bytes());
    match significant {
        [] => payload.push(0x80),
        [byte] if *byte < 0x80 => payload.push(*byte),
        bytes => {
            payload.push(0x80 + bytes.len() as u8);
            payload.extend_from_slice(bytes);
        }
    }

    let mut rlp = Vec::with_capacity(payload.len() + 1);
    rlp.push(0xc0 + payload.len() as u8);
    rlp.extend_from_slice(&payload);

    address_from_hash(&keccak256(&rlp))
}

/// Address of a contract created with `CREATE2`:
/// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`.
pub fn create2_address(sender: &Address, salt: &H256, init_code_hash: &H256) -> Address {
    let hash = keccak256_concat(&[
        &[0xff],
        sender.as_bytes(),
        salt.as_bytes(),
        init_code_hash.as_bytes(),
    ]);
    address_from_hash(&hash)
}

fn address_from_hash(hash: &H256) -> Address {
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_create_address() {
        let sender = Address::from_str("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
        assert_eq!(
            create_address(&sender, 0).to_hex(),
            "0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d"
        );
        assert_eq!(
            create_address(&sender, 1).to_hex(),
            "0x343c43a37d37dff08ae8c4a11544c718abb4fcf8"
        );
    }

    #[test]
    fn test_create_address_multi_byte_nonce() {
        let sender = Address::from_low_u64_be(1000);
        assert_ne!(create_address(&sender, 0x80), create_address(&sender, 0x7f));
        assert_ne!(create_address(&sender, 0x100), create_address(&sender, 0x80));
    }

    #[test]
    fn test_create2_address() {
        // EIP-1014 example 0.
        let address = create2_address(&Address::ZERO, &H256::zero(), &keccak256(&[0x00]));
        assert_eq!(address.to_hex(), "0x4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38");
    }

    #[test]
    fn test_block_hash_window() {
        let block = BlockContext {
            number: U256::from(300u64),
            ..Default::default()
        };
        assert_eq!(block.block_hash(U256::from(300u64)), H256::zero());
        assert_eq!(block.block_hash(U256::from(43u64)), H256::zero());
        assert_eq!(block.block_hash(U256::from(44u64)), keccak256(b"44"));
        assert_eq!(block.block_hash(U256::from(299u64)), keccak256(b"299"));
    }

    #[test]
    fn test_result_error() {
        assert_eq!(ExecutionResult::success(vec![], 5).error(), None);
        assert_eq!(ExecutionResult::revert(vec![], 5).error(), Some(EvmError::Reverted));
        let halted = ExecutionResult::halt(EvmError::OutOfGas);
        assert_eq!(halted.gas_left, 0);
        assert_eq!(halted.error(), Some(EvmError::OutOfGas));
    }
}
