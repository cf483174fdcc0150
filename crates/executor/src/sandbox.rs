use std::sync::{Mutex, MutexGuard};
use std::thread;

use num_bigint::BigUint;
use sandbox_evm::precompiled::is_precompiled;
use sandbox_evm::{
    BlockContext, Evm, EvmConfig, ExecutionRequest, ExecutionResult, Log, StateDB, WorldState,
};
use sandbox_types::{Address, Bytes, Wei, U256};
use tracing::{debug, info, warn};

use crate::types::{
    AccountCreated, AccountView, CallRequest, CallResponse, CreateAccountRequest, DeployRequest,
    DeployResponse, Status,
};
use crate::{Result, SandboxError};

/// Gas limit of every deploy and call.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000_000;
pub const DEFAULT_GAS_PRICE: u64 = 1;
/// First counter value used for allocated account addresses.
pub const FIRST_ACCOUNT_INDEX: u64 = 1000;
/// Stack of the thread each request executes on. Nested frames recurse, so
/// this bounds how deep a call chain can go before the depth limit.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024 * 1024;
pub const MIN_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub block: BlockContext,
    pub evm: EvmConfig,
    pub first_account_index: u64,
    pub stack_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            block: BlockContext::default(),
            evm: EvmConfig::default(),
            first_account_index: FIRST_ACCOUNT_INDEX,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

struct Ledger {
    state: WorldState,
    next_account: u64,
}

impl Ledger {
    /// Next counter-derived address that is neither in use nor a precompile.
    fn allocate(&mut self) -> Address {
        loop {
            let candidate = Address::from_low_u64_be(self.next_account);
            self.next_account = self.next_account.wrapping_add(1);
            if !self.state.exists(&candidate) && !is_precompiled(&candidate) {
                return candidate;
            }
        }
    }
}

/// One world state plus the fixed chain parameters it executes under.
///
/// Every operation holds the state lock from validation to commit, so
/// concurrent requests are serialized and never observe each other's
/// partial effects.
pub struct Sandbox {
    ledger: Mutex<Ledger>,
    block: BlockContext,
    evm: EvmConfig,
    stack_size: usize,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                state: WorldState::new(),
                next_account: config.first_account_index,
            }),
            block: config.block,
            evm: config.evm,
            stack_size: config.stack_size.max(MIN_STACK_SIZE),
        }
    }

    pub fn create_account(&self, request: CreateAccountRequest) -> Result<AccountCreated> {
        let balance = amount(request.balance)?;
        let requested = request.address.as_deref().map(parse_address).transpose()?;

        let mut ledger = self.lock()?;
        let address = match requested {
            Some(address) => address,
            None => ledger.allocate(),
        };
        ledger.state.create_account(address);
        ledger.state.add_balance(address, &balance);
        ledger.state.commit();

        info!(address = %address.to_hex(), %balance, "account created");
        Ok(AccountCreated {
            status: Status::Success,
            message: "account created".to_string(),
            address: address.to_hex(),
        })
    }

    /// Runs `code ++ input` as init code and stores the returned runtime code.
    pub fn deploy(&self, request: DeployRequest) -> Result<DeployResponse> {
        let from = parse_address(&request.from)?;
        let value = word(request.value)?;
        let mut payload = Bytes::from_hex(&request.code)?.into_vec();
        payload.extend_from_slice(&Bytes::from_hex(&request.input)?);
        debug!(from = %from.to_hex(), %value, payload = payload.len(), "deploy request");

        let result = self.execute(ExecutionRequest::create(from, value, payload, DEFAULT_GAS_LIMIT))?;
        let error = result.error();
        let address = result.created_address;
        let gas_left = result.gas_left;
        let output = Bytes::from_vec(result.return_data).to_hex();

        Ok(match error {
            None => {
                info!(address = ?address.map(|a| a.to_hex()), gas_left, "contract created");
                DeployResponse {
                    status: Status::Success,
                    message: "contract created".to_string(),
                    output,
                    address: address.map(|address| address.to_hex()),
                    gas_left,
                }
            }
            Some(err) => {
                warn!(%err, gas_left, "contract creation failed");
                DeployResponse {
                    status: Status::Error,
                    message: format!("contract creation failed, err: {}", err),
                    output,
                    address: None,
                    gas_left,
                }
            }
        })
    }

    pub fn call(&self, request: CallRequest) -> Result<CallResponse> {
        let from = parse_address(&request.from)?;
        let to = parse_address(&request.to)?;
        let value = word(request.value)?;
        let input = Bytes::from_hex(&request.input)?.into_vec();
        debug!(from = %from.to_hex(), to = %to.to_hex(), %value, input = input.len(), "call request");

        let result = self.execute(ExecutionRequest::call(from, to, value, input, DEFAULT_GAS_LIMIT))?;
        let error = result.error();
        let gas_left = result.gas_left;
        let output = Bytes::from_vec(result.return_data).to_hex();

        Ok(match error {
            None => {
                info!(to = %to.to_hex(), gas_left, "contract called");
                CallResponse {
                    status: Status::Success,
                    message: "contract called".to_string(),
                    output,
                    gas_left,
                }
            }
            Some(err) => {
                warn!(to = %to.to_hex(), %err, gas_left, "contract call failed");
                CallResponse {
                    status: Status::Error,
                    message: format!("contract call failed, err: {}", err),
                    output,
                    gas_left,
                }
            }
        })
    }

    /// Current view of an account, `None` if it does not exist.
    pub fn account(&self, address: &str) -> Result<Option<AccountView>> {
        let address = parse_address(address)?;
        let ledger = self.lock()?;
        Ok(ledger.state.account(&address).map(|account| AccountView {
            address: address.to_hex(),
            balance: account.balance.to_string(),
            nonce: account.nonce,
            code: Bytes::from_slice(&account.code).to_hex(),
            storage_slots: account.storage.len(),
        }))
    }

    /// Runs a raw engine request under the state lock.
    ///
    /// The engine runs on a dedicated thread with `stack_size` bytes of
    /// stack, whatever thread the caller is on.
    pub fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let mut ledger = self.lock()?;
        let state = &mut ledger.state;
        let result = thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("evm-exec".to_string())
                .stack_size(self.stack_size)
                .spawn_scoped(scope, move || {
                    Evm::new(state, self.block.clone(), self.evm.clone())
                        .with_gas_price(U256::from(DEFAULT_GAS_PRICE))
                        .execute(request)
                })
                .map_err(|err| SandboxError::ExecutionAborted(err.to_string()))?;
            worker.join().map_err(|_| {
                SandboxError::ExecutionAborted("execution thread panicked".to_string())
            })
        })?;
        trace_logs(&result.logs);
        Ok(result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger.lock().map_err(|_| SandboxError::StateUnavailable)
    }
}

fn trace_logs(logs: &[Log]) {
    for log in logs {
        debug!(
            address = %log.address.to_hex(),
            topics = log.topics.len(),
            data = %Bytes::from_slice(&log.data).to_hex(),
            "evm log"
        );
    }
}

fn parse_address(input: &str) -> Result<Address> {
    Ok(Address::from_hex_lenient(input)?)
}

fn amount(value: i64) -> Result<Wei> {
    u64::try_from(value)
        .map(BigUint::from)
        .map_err(|_| SandboxError::NegativeAmount(value))
}

fn word(value: i64) -> Result<U256> {
    u64::try_from(value)
        .map(U256::from)
        .map_err(|_| SandboxError::NegativeAmount(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Init code copying a ten byte runtime that returns the word 42.
    const RETURN_42: &str = "600a600c600039600a6000f3602a60005260206000f3";
    const RUNTIME_42: &str = "602a60005260206000f3";
    // Init code for a runtime that CALLs its own address with all gas, then STOPs.
    const SELF_CALL: &str = "600e600c600039600e6000f360006000600060006000305af100";

    fn funded(sandbox: &Sandbox, balance: i64) -> String {
        sandbox
            .create_account(CreateAccountRequest { balance, address: None })
            .unwrap()
            .address
    }

    fn balance(sandbox: &Sandbox, address: &str) -> String {
        sandbox.account(address).unwrap().map(|view| view.balance).unwrap_or_default()
    }

    #[test]
    fn test_account_addresses_are_allocated() {
        let sandbox = Sandbox::default();
        let first = funded(&sandbox, 10);
        let second = funded(&sandbox, 10);
        assert_eq!(first, "0x00000000000000000000000000000000000003e8");
        assert_eq!(second, "0x00000000000000000000000000000000000003e9");

        sandbox
            .create_account(CreateAccountRequest {
                balance: 0,
                address: Some("3ea".into()),
            })
            .unwrap();
        assert_eq!(funded(&sandbox, 0), "0x00000000000000000000000000000000000003eb");
    }

    #[test]
    fn test_create_account_is_idempotent() {
        let sandbox = Sandbox::default();
        let request = CreateAccountRequest {
            balance: 10,
            address: Some("0xabc".into()),
        };
        let created = sandbox.create_account(request.clone()).unwrap();
        assert_eq!(created.status, Status::Success);
        assert_eq!(created.message, "account created");

        sandbox
            .create_account(CreateAccountRequest { balance: 0, ..request })
            .unwrap();
        assert_eq!(balance(&sandbox, &created.address), "10");
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let sandbox = Sandbox::default();
        let err = sandbox
            .create_account(CreateAccountRequest { balance: -1, address: None })
            .unwrap_err();
        assert_eq!(err, SandboxError::NegativeAmount(-1));

        let err = sandbox
            .call(CallRequest {
                to: "0x01".into(),
                value: -5,
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, SandboxError::NegativeAmount(-5));
        assert!(sandbox.account("0x3e8").unwrap().is_none());
    }

    #[test]
    fn test_malformed_hex_rejected() {
        let sandbox = Sandbox::default();
        let err = sandbox
            .deploy(DeployRequest {
                code: "0xzz".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SandboxError::MalformedRequest(_)));
        assert!(sandbox.account("").unwrap().is_none());
    }

    #[test]
    fn test_deploy_then_call() {
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 1_000);

        let deployed = sandbox
            .deploy(DeployRequest {
                from: from.clone(),
                code: RETURN_42.into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(deployed.status, Status::Success, "{}", deployed.message);
        assert_eq!(deployed.message, "contract created");
        assert_eq!(deployed.output, RUNTIME_42);
        assert!(deployed.gas_left < DEFAULT_GAS_LIMIT);
        let address = deployed.address.unwrap();

        let view = sandbox.account(&address).unwrap().unwrap();
        assert_eq!(view.code, RUNTIME_42);
        assert_eq!(view.nonce, 1);
        assert_eq!(sandbox.account(&from).unwrap().unwrap().nonce, 1);

        let called = sandbox
            .call(CallRequest {
                from,
                to: address,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(called.status, Status::Success);
        assert_eq!(called.message, "contract called");
        assert_eq!(called.output, format!("{:064x}", 42));
        assert!(called.gas_left < DEFAULT_GAS_LIMIT);
    }

    #[test]
    fn test_failed_deploy_reports_error() {
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 0);
        let response = sandbox
            .deploy(DeployRequest {
                from: from.clone(),
                code: "fe".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.message, "contract creation failed, err: invalid opcode: 0xfe");
        assert_eq!(response.gas_left, 0);
        assert!(response.address.is_none());
        assert_eq!(sandbox.account(&from).unwrap().unwrap().nonce, 0);
    }

    #[test]
    fn test_call_to_codeless_account() {
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 100);
        let response = sandbox
            .call(CallRequest {
                from: from.clone(),
                to: "0xbeef".into(),
                value: 7,
                input: "0x1234".into(),
            })
            .unwrap();
        assert_eq!(response.status, Status::Success);
        assert!(response.output.is_empty());
        assert_eq!(response.gas_left, DEFAULT_GAS_LIMIT);
        assert_eq!(balance(&sandbox, &from), "93");
        assert_eq!(balance(&sandbox, "0xbeef"), "7");
    }

    #[test]
    fn test_call_without_funds_fails() {
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 1);
        let response = sandbox
            .call(CallRequest {
                from: from.clone(),
                to: "0xbeef".into(),
                value: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.status, Status::Error);
        assert_eq!(
            response.message,
            "contract call failed, err: insufficient balance for transfer"
        );
        assert_eq!(response.gas_left, DEFAULT_GAS_LIMIT);
        assert_eq!(balance(&sandbox, &from), "1");
        assert!(sandbox.account("0xbeef").unwrap().is_none());
    }

    #[test]
    fn test_constructor_arguments_follow_code() {
        // Init code copying its last byte into word 0 and returning that word:
        // PUSH1 1, CODESIZE, PUSH1 1, SWAP1, SUB, PUSH1 31, CODECOPY,
        // PUSH1 32, PUSH1 0, RETURN.
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 0);
        let response = sandbox
            .deploy(DeployRequest {
                from,
                code: "60013860019003601f3960206000f3".into(),
                input: "0x2a".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.status, Status::Success, "{}", response.message);
        assert_eq!(response.output, format!("{:064x}", 42));
    }

    #[test]
    fn test_deploy_transfers_value() {
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 100);

        let deployed = sandbox
            .deploy(DeployRequest {
                from: from.clone(),
                value: 30,
                code: RETURN_42.into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(deployed.status, Status::Success, "{}", deployed.message);
        assert_eq!(balance(&sandbox, &from), "70");
        assert_eq!(balance(&sandbox, &deployed.address.unwrap()), "30");

        let failed = sandbox
            .deploy(DeployRequest {
                from: from.clone(),
                value: 30,
                code: "fe".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(failed.status, Status::Error);
        assert_eq!(failed.gas_left, 0);
        assert_eq!(balance(&sandbox, &from), "70");
    }

    #[test]
    fn test_deploy_without_funds_fails() {
        let sandbox = Sandbox::default();
        let from = funded(&sandbox, 100);
        let response = sandbox
            .deploy(DeployRequest {
                from: from.clone(),
                value: 1_000,
                code: RETURN_42.into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.status, Status::Error);
        assert_eq!(
            response.message,
            "contract creation failed, err: insufficient balance for transfer"
        );
        assert_eq!(response.gas_left, DEFAULT_GAS_LIMIT);
        assert!(response.address.is_none());
        assert_eq!(balance(&sandbox, &from), "100");
        assert_eq!(sandbox.account(&from).unwrap().unwrap().nonce, 0);
    }

    #[test]
    fn test_deep_self_call_on_small_caller_stack() {
        // The test thread keeps its default stack; recursion happens on the
        // execution thread. A tiny configured stack is raised to the floor.
        let sandbox = Sandbox::new(SandboxConfig {
            stack_size: 0,
            ..Default::default()
        });
        let from = funded(&sandbox, 0);
        let deployed = sandbox
            .deploy(DeployRequest {
                from: from.clone(),
                code: SELF_CALL.into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(deployed.status, Status::Success, "{}", deployed.message);

        let called = sandbox
            .call(CallRequest {
                from,
                to: deployed.address.unwrap(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(called.status, Status::Success, "{}", called.message);
        assert!(called.gas_left < DEFAULT_GAS_LIMIT);
    }
}
