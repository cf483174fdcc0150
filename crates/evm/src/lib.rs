pub mod error;
pub mod execution;
pub mod gas;
pub mod interpreter;
pub mod memory;
pub mod opcodes;
pub mod precompiled;
pub mod stack;
pub mod state;


pub use error::{EvmError, EvmResult, StateError, StateResult};
pub use execution::{
    create2_address, create_address, BlockContext, ExecutionContext, ExecutionRequest,
    ExecutionResult, ExecutionStatus, Log,
};
pub use interpreter::Interpreter;
pub use state::{Account, Snapshot, StateDB, WorldState};

use execution::{CallMessage, CreateMessage};
use gas::GasCost;
use sandbox_crypto::keccak256;
use sandbox_types::{Address, Wei, WeiExt, U256};
use tracing::{debug, error, trace};

/// Contract code size limit (EIP-170).
pub const MAX_CODE_SIZE: usize = 24_576;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmConfig {
    pub max_call_depth: usize,
    /// Instructions allowed across a whole top-level call tree.
    pub max_steps: u64,
    pub max_code_size: usize,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_steps: 100_000_000,
            max_code_size: MAX_CODE_SIZE,
        }
    }
}

/// Executes requests against a borrowed world state.
///
/// Each top-level [`Evm::create`] or [`Evm::call`] either commits all of
/// its state changes or none of them.
pub struct Evm<'s, S: StateDB> {
    pub(crate) state: &'s mut S,
    pub(crate) block: BlockContext,
    pub(crate) config: EvmConfig,
    pub(crate) origin: Address,
    pub(crate) gas_price: U256,
    steps: u64,
}

impl<'s, S: StateDB> Evm<'s, S> {
    pub fn new(state: &'s mut S, block: BlockContext, config: EvmConfig) -> Self {
        Self {
            state,
            block,
            config,
            origin: Address::ZERO,
            gas_price: U256::one(),
            steps: 0,
        }
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Dispatches on the request shape: no target deploys, a target calls.
    pub fn execute(&mut self, request: ExecutionRequest) -> ExecutionResult {
        match request.target {
            None => self.create(request),
            Some(_) => self.call(request),
        }
    }

    /// Deploys `request.data` as init code.
    pub fn create(&mut self, request: ExecutionRequest) -> ExecutionResult {
        if request.target.is_some() {
            return ExecutionResult::aborted(EvmError::UnexpectedTarget, request.gas_limit);
        }
        let snapshot = self.begin_transaction(&request);
        let result = self.create_frame(CreateMessage {
            caller: request.caller,
            value: request.value,
            init_code: request.data,
            gas_limit: request.gas_limit,
            salt: None,
            depth: 0,
        });
        self.finish_transaction(snapshot, result)
    }

    /// Runs the code of `request.target` with `request.data` as calldata.
    pub fn call(&mut self, request: ExecutionRequest) -> ExecutionResult {
        let Some(target) = request.target else {
            return ExecutionResult::aborted(EvmError::MissingTarget, request.gas_limit);
        };
        let snapshot = self.begin_transaction(&request);
        let result = self.call_frame(CallMessage {
            caller: request.caller,
            address: target,
            code_address: target,
            value: request.value,
            transfers_value: true,
            input: request.data,
            gas_limit: request.gas_limit,
            is_static: false,
            depth: 0,
        });
        self.finish_transaction(snapshot, result)
    }

    fn begin_transaction(&mut self, request: &ExecutionRequest) -> Snapshot {
        self.origin = request.caller;
        self.steps = 0;
        let snapshot = self.state.snapshot();
        self.state.create_account(request.caller);
        snapshot
    }

    fn finish_transaction(&mut self, snapshot: Snapshot, result: ExecutionResult) -> ExecutionResult {
        if !result.is_success() {
            self.revert(snapshot);
        }
        self.state.commit();
        debug!(
            status = ?result.status,
            gas_left = result.gas_left,
            steps = self.steps,
            logs = result.logs.len(),
            "transaction finished"
        );
        result
    }

    fn revert(&mut self, snapshot: Snapshot) {
        if let Err(err) = self.state.revert_to_snapshot(snapshot) {
            error!(%err, "failed to revert world state");
        }
    }

    /// Counts one interpreted instruction against the step cap.
    pub(crate) fn tick(&mut self) -> EvmResult<()> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(EvmError::StepLimitExceeded);
        }
        Ok(())
    }

    pub(crate) fn call_frame(&mut self, message: CallMessage) -> ExecutionResult {
        if message.depth > self.config.max_call_depth {
            return ExecutionResult::aborted(EvmError::CallDepthExceeded, message.gas_limit);
        }
        trace!(
            depth = message.depth,
            to = %message.address,
            code = %message.code_address,
            gas = message.gas_limit,
            "call frame"
        );

        let snapshot = self.state.snapshot();
        if message.transfers_value && !message.value.is_zero() {
            let value = Wei::from_u256(message.value);
            if let Err(err) = self.state.transfer(message.caller, message.address, &value) {
                self.revert(snapshot);
                return ExecutionResult::aborted(err.into(), message.gas_limit);
            }
        }

        let result = if let Some(contract) = precompiled::precompile(&message.code_address) {
            precompiled::run_precompile(contract, &message.input, message.gas_limit)
        } else {
            let code = self.state.code(&message.code_address).to_vec();
            if code.is_empty() {
                ExecutionResult::success(Vec::new(), message.gas_limit)
            } else {
                let context = ExecutionContext {
                    caller: message.caller,
                    address: message.address,
                    value: message.value,
                    code,
                    data: message.input,
                    gas_limit: message.gas_limit,
                    is_static: message.is_static,
                    depth: message.depth,
                };
                Interpreter::new(context, self).run()
            }
        };

        if !result.is_success() {
            self.revert(snapshot);
        }
        result
    }

    pub(crate) fn create_frame(&mut self, message: CreateMessage) -> ExecutionResult {
        if message.depth > self.config.max_call_depth {
            return ExecutionResult::aborted(EvmError::CallDepthExceeded, message.gas_limit);
        }
        let value = Wei::from_u256(message.value);
        if self.state.balance(&message.caller) < value {
            return ExecutionResult::aborted(EvmError::InsufficientBalance, message.gas_limit);
        }

        let nonce = self.state.nonce(&message.caller);
        if let Err(err) = self.state.increment_nonce(message.caller) {
            return ExecutionResult::aborted(err.into(), message.gas_limit);
        }
        let address = match &message.salt {
            Some(salt) => create2_address(&message.caller, salt, &keccak256(&message.init_code)),
            None => create_address(&message.caller, nonce),
        };
        if self
            .state
            .account(&address)
            .is_some_and(|account| account.nonce != 0 || account.is_contract())
        {
            return ExecutionResult::halt(EvmError::CreateCollision);
        }
        trace!(depth = message.depth, %address, gas = message.gas_limit, "create frame");

        let snapshot = self.state.snapshot();
        self.state.create_account(address);
        if let Err(err) = self.state.increment_nonce(address) {
            self.revert(snapshot);
            return ExecutionResult::halt(err.into());
        }
        if value != Wei::default() {
            if let Err(err) = self.state.transfer(message.caller, address, &value) {
                self.revert(snapshot);
                return ExecutionResult::aborted(err.into(), message.gas_limit);
            }
        }

        let context = ExecutionContext {
            caller: message.caller,
            address,
            value: message.value,
            code: message.init_code,
            data: Vec::new(),
            gas_limit: message.gas_limit,
            is_static: false,
            depth: message.depth,
        };
        let mut result = Interpreter::new(context, self).run();
        if result.is_success() && !self.state.exists(&address) {
            // Init code self-destructed; there is no account to hold code.
            trace!(%address, "created account self-destructed");
            return result;
        }
        if result.is_success() {
            result = self.deposit_code(address, result);
        }

        if result.is_success() {
            result.created_address = Some(address);
        } else {
            self.revert(snapshot);
        }
        result
    }

    /// Validates and stores the runtime code returned by init code.
    fn deposit_code(&mut self, address: Address, mut result: ExecutionResult) -> ExecutionResult {
        let code = &result.return_data;
        if code.len() > self.config.max_code_size {
            return ExecutionResult::halt(EvmError::CodeSizeExceeded);
        }
        if code.first() == Some(&0xef) {
            return ExecutionResult::halt(EvmError::InvalidCode);
        }
        let deposit = GasCost::code_deposit_cost(code.len());
        if result.gas_left < deposit {
            return ExecutionResult::halt(EvmError::OutOfGas);
        }
        if let Err(err) = self.state.set_code(address, code.clone()) {
            return ExecutionResult::halt(err.into());
        }
        result.gas_left -= deposit;
        result
    }
}
