use crate::{
    error::{EvmError, EvmResult},
    execution::{CallMessage, CreateMessage, ExecutionContext, ExecutionResult, ExecutionStatus, Log},
    gas::{Gas, GasCost},
    memory::{padded_slice, Memory},
    opcodes::{analyze_jumpdests, Opcode},
    stack::Stack,
    state::StateDB,
    Evm,
};
use sandbox_crypto::keccak256;
use sandbox_types::{h256_to_u256, u256_to_h256, Address, Wei, WeiExt, U256, U512};
use tracing::{debug, trace};

/// Offsets and sizes above this fail as out of gas: the expansion cost of
/// anything larger is beyond any gas limit.
const MAX_MEMORY_BOUND: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// Runs one frame. Nested frames re-enter the [`Evm`] and get their own
/// interpreter.
pub struct Interpreter<'a, 's, S: StateDB> {
    evm: &'a mut Evm<'s, S>,
    context: ExecutionContext,
    jumpdests: Vec<bool>,
    stack: Stack,
    memory: Memory,
    gas: Gas,
    pc: usize,
    return_data: Vec<u8>,
    logs: Vec<Log>,
    result: Option<ExecutionResult>,
}

impl<'a, 's, S: StateDB> Interpreter<'a, 's, S> {
    pub fn new(context: ExecutionContext, evm: &'a mut Evm<'s, S>) -> Self {
        let gas = Gas::new(context.gas_limit);
        let jumpdests = analyze_jumpdests(&context.code);
        Self {
            evm,
            context,
            jumpdests,
            stack: Stack::new(),
            memory: Memory::new(),
            gas,
            pc: 0,
            return_data: Vec::new(),
            logs: Vec::new(),
            result: None,
        }
    }

    pub fn run(mut self) -> ExecutionResult {
        loop {
            if let Err(err) = self.step() {
                trace!(depth = self.context.depth, pc = self.pc, %err, "frame halted");
                return ExecutionResult::halt(err);
            }
            if let Some(result) = self.result.take() {
                return result;
            }
        }
    }

    fn step(&mut self) -> EvmResult<()> {
        let Some(byte) = self.context.code.get(self.pc).copied() else {
            self.finish(Vec::new());
            return Ok(());
        };
        let opcode = Opcode::from_u8(byte).ok_or(EvmError::InvalidOpcode(byte))?;
        self.evm.tick()?;

        trace!(
            depth = self.context.depth,
            pc = self.pc,
            op = opcode.name(),
            gas = self.gas.remaining(),
            stack = self.stack.len(),
            "step"
        );

        self.stack.require(opcode.stack_inputs())?;
        self.stack
            .limit_check(opcode.stack_outputs().saturating_sub(opcode.stack_inputs()))?;

        self.pc += 1;
        self.execute_opcode(opcode)
    }

    fn execute_opcode(&mut self, opcode: Opcode) -> EvmResult<()> {
        match opcode {
            Opcode::STOP => self.finish(Vec::new()),

            Opcode::ADD => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(a.overflowing_add(b).0)?;
            }
            Opcode::MUL => {
                self.gas.consume(GasCost::LOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(a.overflowing_mul(b).0)?;
            }
            Opcode::SUB => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(a.overflowing_sub(b).0)?;
            }
            Opcode::DIV => {
                self.gas.consume(GasCost::LOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(if b.is_zero() { U256::zero() } else { a / b })?;
            }
            Opcode::SDIV => {
                self.gas.consume(GasCost::LOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(signed_div(a, b))?;
            }
            Opcode::MOD => {
                self.gas.consume(GasCost::LOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(if b.is_zero() { U256::zero() } else { a % b })?;
            }
            Opcode::SMOD => {
                self.gas.consume(GasCost::LOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(signed_mod(a, b))?;
            }
            Opcode::ADDMOD => {
                self.gas.consume(GasCost::MID)?;
                let [a, b, n] = self.stack.pop_n()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    narrow((U512::from(a) + U512::from(b)) % U512::from(n))
                };
                self.stack.push(result)?;
            }
            Opcode::MULMOD => {
                self.gas.consume(GasCost::MID)?;
                let [a, b, n] = self.stack.pop_n()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    narrow(a.full_mul(b) % U512::from(n))
                };
                self.stack.push(result)?;
            }
            Opcode::EXP => {
                let [base, exponent] = self.stack.pop_n()?;
                self.gas.consume(GasCost::exp_cost(exponent))?;
                self.stack.push(base.overflowing_pow(exponent).0)?;
            }
            Opcode::SIGNEXTEND => {
                self.gas.consume(GasCost::LOW)?;
                let [byte_index, value] = self.stack.pop_n()?;
                self.stack.push(sign_extend(byte_index, value))?;
            }

            Opcode::LT => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.push_bool(a < b)?;
            }
            Opcode::GT => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.push_bool(a > b)?;
            }
            Opcode::SLT => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.push_bool(signed_lt(a, b))?;
            }
            Opcode::SGT => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.push_bool(signed_lt(b, a))?;
            }
            Opcode::EQ => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.push_bool(a == b)?;
            }
            Opcode::ISZERO => {
                self.gas.consume(GasCost::VERYLOW)?;
                let a = self.stack.pop()?;
                self.push_bool(a.is_zero())?;
            }
            Opcode::AND => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(a & b)?;
            }
            Opcode::OR => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(a | b)?;
            }
            Opcode::XOR => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [a, b] = self.stack.pop_n()?;
                self.stack.push(a ^ b)?;
            }
            Opcode::NOT => {
                self.gas.consume(GasCost::VERYLOW)?;
                let a = self.stack.pop()?;
                self.stack.push(!a)?;
            }
            Opcode::BYTE => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [index, value] = self.stack.pop_n()?;
                let result = if index < U256::from(32) {
                    U256::from(value.byte(31 - index.as_usize()))
                } else {
                    U256::zero()
                };
                self.stack.push(result)?;
            }
            Opcode::SHL => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [shift, value] = self.stack.pop_n()?;
                let result = if shift < U256::from(256) {
                    value << shift.as_usize()
                } else {
                    U256::zero()
                };
                self.stack.push(result)?;
            }
            Opcode::SHR => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [shift, value] = self.stack.pop_n()?;
                let result = if shift < U256::from(256) {
                    value >> shift.as_usize()
                } else {
                    U256::zero()
                };
                self.stack.push(result)?;
            }
            Opcode::SAR => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [shift, value] = self.stack.pop_n()?;
                self.stack.push(arithmetic_shr(shift, value))?;
            }

            Opcode::KECCAK256 => {
                let [offset, size] = self.stack.pop_n()?;
                let (offset, size) = self.memory_range(offset, size)?;
                self.gas.consume(GasCost::keccak256_cost(size))?;
                let hash = keccak256(&self.memory.get(offset, size));
                self.stack.push(h256_to_u256(hash))?;
            }

            Opcode::ADDRESS => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.context.address.to_word())?;
            }
            Opcode::BALANCE => {
                self.gas.consume(GasCost::COLD_ACCOUNT_ACCESS)?;
                let address = Address::from_word(self.stack.pop()?);
                let balance = self.evm.state.balance(&address).to_u256_saturating();
                self.stack.push(balance)?;
            }
            Opcode::ORIGIN => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.origin.to_word())?;
            }
            Opcode::CALLER => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.context.caller.to_word())?;
            }
            Opcode::CALLVALUE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.context.value)?;
            }
            Opcode::CALLDATALOAD => {
                self.gas.consume(GasCost::VERYLOW)?;
                let offset = self.stack.pop()?;
                let word = padded_slice(&self.context.data, offset, 32);
                self.stack.push(U256::from_big_endian(&word))?;
            }
            Opcode::CALLDATASIZE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::from(self.context.data.len()))?;
            }
            Opcode::CALLDATACOPY => {
                let [dest, offset, size] = self.stack.pop_n()?;
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.consume(GasCost::VERYLOW + GasCost::copy_cost(size))?;
                self.memory.set_padded(dest, &self.context.data, offset, size);
            }
            Opcode::CODESIZE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::from(self.context.code.len()))?;
            }
            Opcode::CODECOPY => {
                let [dest, offset, size] = self.stack.pop_n()?;
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.consume(GasCost::VERYLOW + GasCost::copy_cost(size))?;
                self.memory.set_padded(dest, &self.context.code, offset, size);
            }
            Opcode::GASPRICE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.gas_price)?;
            }
            Opcode::EXTCODESIZE => {
                self.gas.consume(GasCost::COLD_ACCOUNT_ACCESS)?;
                let address = Address::from_word(self.stack.pop()?);
                let size = self.evm.state.code(&address).len();
                self.stack.push(U256::from(size))?;
            }
            Opcode::EXTCODECOPY => {
                let address = Address::from_word(self.stack.pop()?);
                let [dest, offset, size] = self.stack.pop_n()?;
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas
                    .consume(GasCost::COLD_ACCOUNT_ACCESS + GasCost::copy_cost(size))?;
                self.memory
                    .set_padded(dest, self.evm.state.code(&address), offset, size);
            }
            Opcode::RETURNDATASIZE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::from(self.return_data.len()))?;
            }
            Opcode::RETURNDATACOPY => {
                let [dest, offset, size] = self.stack.pop_n()?;
                let end = offset
                    .checked_add(size)
                    .ok_or(EvmError::ReturnDataOutOfBounds)?;
                if end > U256::from(self.return_data.len()) {
                    return Err(EvmError::ReturnDataOutOfBounds);
                }
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.consume(GasCost::VERYLOW + GasCost::copy_cost(size))?;
                self.memory.set_padded(dest, &self.return_data, offset, size);
            }
            Opcode::EXTCODEHASH => {
                self.gas.consume(GasCost::COLD_ACCOUNT_ACCESS)?;
                let address = Address::from_word(self.stack.pop()?);
                let hash = if self.evm.state.exists(&address) {
                    h256_to_u256(keccak256(self.evm.state.code(&address)))
                } else {
                    U256::zero()
                };
                self.stack.push(hash)?;
            }

            Opcode::BLOCKHASH => {
                self.gas.consume(GasCost::BLOCKHASH)?;
                let number = self.stack.pop()?;
                let hash = self.evm.block.block_hash(number);
                self.stack.push(h256_to_u256(hash))?;
            }
            Opcode::COINBASE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.coinbase.to_word())?;
            }
            Opcode::TIMESTAMP => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.timestamp)?;
            }
            Opcode::NUMBER => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.number)?;
            }
            Opcode::DIFFICULTY => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.difficulty)?;
            }
            Opcode::GASLIMIT => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.gas_limit)?;
            }
            Opcode::CHAINID => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.chain_id)?;
            }
            Opcode::SELFBALANCE => {
                self.gas.consume(GasCost::LOW)?;
                let balance = self.evm.state.balance(&self.context.address);
                self.stack.push(balance.to_u256_saturating())?;
            }
            Opcode::BASEFEE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.base_fee)?;
            }
            Opcode::BLOBHASH => {
                // No blob transactions reach the sandbox.
                self.gas.consume(GasCost::VERYLOW)?;
                self.stack.pop()?;
                self.stack.push(U256::zero())?;
            }
            Opcode::BLOBBASEFEE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(self.evm.block.blob_base_fee)?;
            }

            Opcode::POP => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.pop()?;
            }
            Opcode::MLOAD => {
                self.gas.consume(GasCost::VERYLOW)?;
                let offset = self.stack.pop()?;
                let (offset, _) = self.memory_range(offset, U256::from(32))?;
                self.stack.push(self.memory.get_word(offset))?;
            }
            Opcode::MSTORE => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [offset, value] = self.stack.pop_n()?;
                let (offset, _) = self.memory_range(offset, U256::from(32))?;
                self.memory.set_word(offset, value);
            }
            Opcode::MSTORE8 => {
                self.gas.consume(GasCost::VERYLOW)?;
                let [offset, value] = self.stack.pop_n()?;
                let (offset, _) = self.memory_range(offset, U256::one())?;
                self.memory.set_byte(offset, value.byte(0));
            }
            Opcode::SLOAD => {
                self.gas.consume(GasCost::COLD_SLOAD)?;
                let key = u256_to_h256(self.stack.pop()?);
                let value = self.evm.state.storage(&self.context.address, &key);
                self.stack.push(h256_to_u256(value))?;
            }
            Opcode::SSTORE => {
                self.require_non_static()?;
                if self.gas.remaining() <= GasCost::SSTORE_SENTRY {
                    return Err(EvmError::OutOfGas);
                }
                let [key, value] = self.stack.pop_n()?;
                let (key, value) = (u256_to_h256(key), u256_to_h256(value));
                let current = self.evm.state.storage(&self.context.address, &key);
                self.gas.consume(GasCost::sstore_cost(&current, &value))?;
                self.evm.state.set_storage(self.context.address, key, value);
            }
            Opcode::JUMP => {
                self.gas.consume(GasCost::MID)?;
                let dest = self.stack.pop()?;
                self.jump(dest)?;
            }
            Opcode::JUMPI => {
                self.gas.consume(GasCost::HIGH)?;
                let [dest, condition] = self.stack.pop_n()?;
                if !condition.is_zero() {
                    self.jump(dest)?;
                }
            }
            Opcode::PC => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::from(self.pc - 1))?;
            }
            Opcode::MSIZE => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::from(self.memory.len()))?;
            }
            Opcode::GAS => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::from(self.gas.remaining()))?;
            }
            Opcode::JUMPDEST => {
                self.gas.consume(GasCost::JUMPDEST)?;
            }
            Opcode::TLOAD => {
                self.gas.consume(GasCost::WARM_ACCESS)?;
                let key = u256_to_h256(self.stack.pop()?);
                let value = self.evm.state.transient_storage(&self.context.address, &key);
                self.stack.push(h256_to_u256(value))?;
            }
            Opcode::TSTORE => {
                self.require_non_static()?;
                self.gas.consume(GasCost::WARM_ACCESS)?;
                let [key, value] = self.stack.pop_n()?;
                self.evm.state.set_transient_storage(
                    self.context.address,
                    u256_to_h256(key),
                    u256_to_h256(value),
                );
            }
            Opcode::MCOPY => {
                let [dest, src, size] = self.stack.pop_n()?;
                if size.is_zero() {
                    self.gas.consume(GasCost::VERYLOW)?;
                } else {
                    let (dest, src, size) = (memory_bound(dest)?, memory_bound(src)?, memory_bound(size)?);
                    self.gas.consume(GasCost::VERYLOW + GasCost::copy_cost(size))?;
                    let end = dest.max(src).checked_add(size).ok_or(EvmError::OutOfGas)?;
                    self.expand_memory(end)?;
                    self.memory.copy_within(dest, src, size);
                }
            }
            Opcode::PUSH0 => {
                self.gas.consume(GasCost::BASE)?;
                self.stack.push(U256::zero())?;
            }

            Opcode::LOG0 | Opcode::LOG1 | Opcode::LOG2 | Opcode::LOG3 | Opcode::LOG4 => {
                self.require_non_static()?;
                let topic_count = opcode.log_topics().unwrap_or(0);
                let [offset, size] = self.stack.pop_n()?;
                let mut topics = Vec::with_capacity(topic_count);
                for _ in 0..topic_count {
                    topics.push(u256_to_h256(self.stack.pop()?));
                }
                let (offset, size) = self.memory_range(offset, size)?;
                self.gas.consume(GasCost::log_cost(topic_count, size))?;

                let log = Log {
                    address: self.context.address,
                    topics,
                    data: self.memory.get(offset, size),
                };
                debug!(
                    address = %log.address,
                    topics = log.topics.len(),
                    data = log.data.len(),
                    "contract log"
                );
                self.logs.push(log);
            }

            Opcode::CREATE => self.create(false)?,
            Opcode::CREATE2 => self.create(true)?,
            Opcode::CALL => self.call(CallKind::Call)?,
            Opcode::CALLCODE => self.call(CallKind::CallCode)?,
            Opcode::DELEGATECALL => self.call(CallKind::DelegateCall)?,
            Opcode::STATICCALL => self.call(CallKind::StaticCall)?,

            Opcode::RETURN => {
                let [offset, size] = self.stack.pop_n()?;
                let (offset, size) = self.memory_range(offset, size)?;
                let data = self.memory.get(offset, size);
                self.finish(data);
            }
            Opcode::REVERT => {
                let [offset, size] = self.stack.pop_n()?;
                let (offset, size) = self.memory_range(offset, size)?;
                let data = self.memory.get(offset, size);
                self.result = Some(ExecutionResult::revert(data, self.gas.remaining()));
            }
            Opcode::INVALID => return Err(EvmError::InvalidOpcode(opcode as u8)),
            Opcode::SELFDESTRUCT => {
                self.require_non_static()?;
                let beneficiary = Address::from_word(self.stack.pop()?);
                let mut cost = GasCost::SELFDESTRUCT;
                if !self.evm.state.exists(&beneficiary)
                    && self.evm.state.balance(&self.context.address) != Wei::default()
                {
                    cost += GasCost::SELFDESTRUCT_NEWACCOUNT;
                }
                self.gas.consume(cost)?;
                self.evm
                    .state
                    .destroy_account(self.context.address, beneficiary);
                self.finish(Vec::new());
            }

            op => {
                if let Some(n) = op.push_bytes() {
                    self.gas.consume(GasCost::VERYLOW)?;
                    self.push_immediate(n)?;
                } else if let Some(n) = op.dup_index() {
                    self.gas.consume(GasCost::VERYLOW)?;
                    self.stack.dup(n)?;
                } else if let Some(n) = op.swap_index() {
                    self.gas.consume(GasCost::VERYLOW)?;
                    self.stack.swap(n)?;
                } else {
                    return Err(EvmError::InvalidOpcode(op as u8));
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, output: Vec<u8>) {
        let logs = std::mem::take(&mut self.logs);
        self.result = Some(ExecutionResult::success(output, self.gas.remaining()).with_logs(logs));
    }

    fn push_bool(&mut self, value: bool) -> EvmResult<()> {
        self.stack.push(if value { U256::one() } else { U256::zero() })
    }

    /// Reads the `n` immediate bytes after a `PUSHn`; bytes past the end of
    /// the code read as zero.
    fn push_immediate(&mut self, n: usize) -> EvmResult<()> {
        let code = &self.context.code;
        let start = self.pc.min(code.len());
        let end = (self.pc + n).min(code.len());
        let mut word = [0u8; 32];
        word[32 - n..32 - n + (end - start)].copy_from_slice(&code[start..end]);
        self.pc += n;
        self.stack.push(U256::from_big_endian(&word))
    }

    fn jump(&mut self, dest: U256) -> EvmResult<()> {
        if dest < U256::from(self.jumpdests.len()) {
            let target = dest.as_usize();
            if self.jumpdests[target] {
                self.pc = target;
                return Ok(());
            }
        }
        Err(EvmError::InvalidJump(dest.low_u64() as usize))
    }

    fn require_non_static(&self) -> EvmResult<()> {
        if self.context.is_static {
            Err(EvmError::StaticCallStateModification)
        } else {
            Ok(())
        }
    }

    /// Validates a memory range and charges for growing memory to cover it.
    /// Empty ranges touch nothing, whatever their offset.
    fn memory_range(&mut self, offset: U256, size: U256) -> EvmResult<(usize, usize)> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let (offset, size) = (memory_bound(offset)?, memory_bound(size)?);
        let end = offset.checked_add(size).ok_or(EvmError::OutOfGas)?;
        self.expand_memory(end)?;
        Ok((offset, size))
    }

    fn expand_memory(&mut self, end: usize) -> EvmResult<()> {
        let current = self.memory.words();
        let required = end.div_ceil(32);
        if required > current {
            let cost = GasCost::memory_cost(required as u64) - GasCost::memory_cost(current as u64);
            self.gas.consume(cost)?;
            self.memory.resize_words(required);
        }
        Ok(())
    }

    fn call(&mut self, kind: CallKind) -> EvmResult<()> {
        let [requested_gas, target] = self.stack.pop_n()?;
        let target = Address::from_word(target);
        let value = match kind {
            CallKind::Call | CallKind::CallCode => self.stack.pop()?,
            CallKind::DelegateCall | CallKind::StaticCall => U256::zero(),
        };
        let [in_offset, in_size, out_offset, out_size] = self.stack.pop_n()?;

        let transfers_value = !value.is_zero();
        if kind == CallKind::Call && transfers_value {
            self.require_non_static()?;
        }

        let (in_offset, in_size) = self.memory_range(in_offset, in_size)?;
        let (out_offset, out_size) = self.memory_range(out_offset, out_size)?;

        let mut cost = GasCost::COLD_ACCOUNT_ACCESS;
        if transfers_value {
            cost += GasCost::CALLVALUE;
            if kind == CallKind::Call && !self.evm.state.exists(&target) {
                cost += GasCost::NEWACCOUNT;
            }
        }
        self.gas.consume(cost)?;

        let forwarded = self.gas.forwardable(requested_gas);
        self.gas.consume(forwarded)?;
        let gas_limit = if transfers_value {
            forwarded + GasCost::CALLSTIPEND
        } else {
            forwarded
        };

        let mut message = CallMessage {
            caller: self.context.address,
            address: target,
            code_address: target,
            value,
            transfers_value,
            input: self.memory.get(in_offset, in_size),
            gas_limit,
            is_static: self.context.is_static,
            depth: self.context.depth + 1,
        };
        match kind {
            CallKind::Call => {}
            CallKind::CallCode => message.address = self.context.address,
            CallKind::DelegateCall => {
                message.caller = self.context.caller;
                message.address = self.context.address;
                message.value = self.context.value;
            }
            CallKind::StaticCall => message.is_static = true,
        }

        let result = self.evm.call_frame(message);

        self.gas.return_gas(result.gas_left);
        let success = result.is_success();
        let copied = out_size.min(result.return_data.len());
        self.memory.set(out_offset, &result.return_data[..copied]);
        if success {
            self.logs.extend(result.logs);
        }
        self.return_data = result.return_data;
        self.push_bool(success)
    }

    fn create(&mut self, with_salt: bool) -> EvmResult<()> {
        self.require_non_static()?;
        let [value, offset, size] = self.stack.pop_n()?;
        let salt = if with_salt {
            Some(u256_to_h256(self.stack.pop()?))
        } else {
            None
        };

        let (offset, size) = self.memory_range(offset, size)?;
        let mut cost = GasCost::CREATE;
        if with_salt {
            cost += GasCost::keccak256_word_cost(size);
        }
        self.gas.consume(cost)?;

        let init_code = self.memory.get(offset, size);
        let gas_limit = self.gas.forwardable(U256::MAX);
        self.gas.consume(gas_limit)?;

        let result = self.evm.create_frame(CreateMessage {
            caller: self.context.address,
            value,
            init_code,
            gas_limit,
            salt,
            depth: self.context.depth + 1,
        });

        self.gas.return_gas(result.gas_left);
        let created = match result.status {
            ExecutionStatus::Success => {
                self.logs.extend(result.logs);
                self.return_data = Vec::new();
                result.created_address.map(|address| address.to_word()).unwrap_or_default()
            }
            ExecutionStatus::Revert => {
                self.return_data = result.return_data;
                U256::zero()
            }
            ExecutionStatus::Halt(_) => {
                self.return_data = Vec::new();
                U256::zero()
            }
        };
        self.stack.push(created)
    }
}

fn memory_bound(value: U256) -> EvmResult<usize> {
    if value > U256::from(MAX_MEMORY_BOUND) {
        Err(EvmError::OutOfGas)
    } else {
        Ok(value.as_usize())
    }
}

fn narrow(value: U512) -> U256 {
    U256::try_from(value).unwrap_or(U256::MAX)
}

fn is_negative(value: U256) -> bool {
    value.bit(255)
}

fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

fn abs(value: U256) -> U256 {
    if is_negative(value) {
        negate(value)
    } else {
        value
    }
}

fn signed_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let quotient = abs(a) / abs(b);
    if is_negative(a) != is_negative(b) {
        negate(quotient)
    } else {
        quotient
    }
}

/// The result takes the sign of the dividend.
fn signed_mod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let remainder = abs(a) % abs(b);
    if is_negative(a) {
        negate(remainder)
    } else {
        remainder
    }
}

fn signed_lt(a: U256, b: U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

fn sign_extend(byte_index: U256, value: U256) -> U256 {
    if byte_index >= U256::from(31) {
        return value;
    }
    let bit = byte_index.as_usize() * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if value.bit(bit) {
        value | !mask
    } else {
        value & mask
    }
}

fn arithmetic_shr(shift: U256, value: U256) -> U256 {
    let negative = is_negative(value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.as_usize();
    if negative {
        (value >> shift) | !(U256::MAX >> shift)
    } else {
        value >> shift
    }
}
