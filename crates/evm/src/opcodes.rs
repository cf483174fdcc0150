/// Declares the instruction set from one table of
/// `NAME = byte, stack inputs, stack outputs` rows.
macro_rules! opcodes {
    ($($name:ident = $byte:literal, $inputs:literal, $outputs:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        const OPCODE_TABLE: [Option<Opcode>; 256] = {
            let mut table = [None; 256];
            $(table[$byte] = Some(Opcode::$name);)*
            table
        };

        impl Opcode {
            pub const fn from_u8(byte: u8) -> Option<Self> {
                OPCODE_TABLE[byte as usize]
            }

            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            pub const fn stack_inputs(&self) -> usize {
                match self {
                    $(Self::$name => $inputs,)*
                }
            }

            pub const fn stack_outputs(&self) -> usize {
                match self {
                    $(Self::$name => $outputs,)*
                }
            }
        }
    };
}

opcodes! {
    // 0x00 - 0x0F: stop and arithmetic
    STOP = 0x00, 0, 0;
    ADD = 0x01, 2, 1;
    MUL = 0x02, 2, 1;
    SUB = 0x03, 2, 1;
    DIV = 0x04, 2, 1;
    SDIV = 0x05, 2, 1;
    MOD = 0x06, 2, 1;
    SMOD = 0x07, 2, 1;
    ADDMOD = 0x08, 3, 1;
    MULMOD = 0x09, 3, 1;
    EXP = 0x0a, 2, 1;
    SIGNEXTEND = 0x0b, 2, 1;

    // 0x10 - 0x1F: comparison and bitwise
    LT = 0x10, 2, 1;
    GT = 0x11, 2, 1;
    SLT = 0x12, 2, 1;
    SGT = 0x13, 2, 1;
    EQ = 0x14, 2, 1;
    ISZERO = 0x15, 1, 1;
    AND = 0x16, 2, 1;
    OR = 0x17, 2, 1;
    XOR = 0x18, 2, 1;
    NOT = 0x19, 1, 1;
    BYTE = 0x1a, 2, 1;
    SHL = 0x1b, 2, 1;
    SHR = 0x1c, 2, 1;
    SAR = 0x1d, 2, 1;

    KECCAK256 = 0x20, 2, 1;

    // 0x30 - 0x3F: environment
    ADDRESS = 0x30, 0, 1;
    BALANCE = 0x31, 1, 1;
    ORIGIN = 0x32, 0, 1;
    CALLER = 0x33, 0, 1;
    CALLVALUE = 0x34, 0, 1;
    CALLDATALOAD = 0x35, 1, 1;
    CALLDATASIZE = 0x36, 0, 1;
    CALLDATACOPY = 0x37, 3, 0;
    CODESIZE = 0x38, 0, 1;
    CODECOPY = 0x39, 3, 0;
    GASPRICE = 0x3a, 0, 1;
    EXTCODESIZE = 0x3b, 1, 1;
    EXTCODECOPY = 0x3c, 4, 0;
    RETURNDATASIZE = 0x3d, 0, 1;
    RETURNDATACOPY = 0x3e, 3, 0;
    EXTCODEHASH = 0x3f, 1, 1;

    // 0x40 - 0x4F: block information
    BLOCKHASH = 0x40, 1, 1;
    COINBASE = 0x41, 0, 1;
    TIMESTAMP = 0x42, 0, 1;
    NUMBER = 0x43, 0, 1;
    DIFFICULTY = 0x44, 0, 1;
    GASLIMIT = 0x45, 0, 1;
    CHAINID = 0x46, 0, 1;
    SELFBALANCE = 0x47, 0, 1;
    BASEFEE = 0x48, 0, 1;
    BLOBHASH = 0x49, 1, 1;
    BLOBBASEFEE = 0x4a, 0, 1;

    // 0x50 - 0x5F: stack, memory, storage and flow
    POP = 0x50, 1, 0;
    MLOAD = 0x51, 1, 1;
    MSTORE = 0x52, 2, 0;
    MSTORE8 = 0x53, 2, 0;
    SLOAD = 0x54, 1, 1;
    SSTORE = 0x55, 2, 0;
    JUMP = 0x56, 1, 0;
    JUMPI = 0x57, 2, 0;
    PC = 0x58, 0, 1;
    MSIZE = 0x59, 0, 1;
    GAS = 0x5a, 0, 1;
    JUMPDEST = 0x5b, 0, 0;
    TLOAD = 0x5c, 1, 1;
    TSTORE = 0x5d, 2, 0;
    MCOPY = 0x5e, 3, 0;
    PUSH0 = 0x5f, 0, 1;

    PUSH1 = 0x60, 0, 1;
    PUSH2 = 0x61, 0, 1;
    PUSH3 = 0x62, 0, 1;
    PUSH4 = 0x63, 0, 1;
    PUSH5 = 0x64, 0, 1;
    PUSH6 = 0x65, 0, 1;
    PUSH7 = 0x66, 0, 1;
    PUSH8 = 0x67, 0, 1;
    PUSH9 = 0x68, 0, 1;
    PUSH10 = 0x69, 0, 1;
    PUSH11 = 0x6a, 0, 1;
    PUSH12 = 0x6b, 0, 1;
    PUSH13 = 0x6c, 0, 1;
    PUSH14 = 0x6d, 0, 1;
    PUSH15 = 0x6e, 0, 1;
    PUSH16 = 0x6f, 0, 1;
    PUSH17 = 0x70, 0, 1;
    PUSH18 = 0x71, 0, 1;
    PUSH19 = 0x72, 0, 1;
    PUSH20 = 0x73, 0, 1;
    PUSH21 = 0x74, 0, 1;
    PUSH22 = 0x75, 0, 1;
    PUSH23 = 0x76, 0, 1;
    PUSH24 = 0x77, 0, 1;
    PUSH25 = 0x78, 0, 1;
    PUSH26 = 0x79, 0, 1;
    PUSH27 = 0x7a, 0, 1;
    PUSH28 = 0x7b, 0, 1;
    PUSH29 = 0x7c, 0, 1;
    PUSH30 = 0x7d, 0, 1;
    PUSH31 = 0x7e, 0, 1;
    PUSH32 = 0x7f, 0, 1;

    DUP1 = 0x80, 1, 2;
    DUP2 = 0x81, 2, 3;
    DUP3 = 0x82, 3, 4;
    DUP4 = 0x83, 4, 5;
    DUP5 = 0x84, 5, 6;
    DUP6 = 0x85, 6, 7;
    DUP7 = 0x86, 7, 8;
    DUP8 = 0x87, 8, 9;
    DUP9 = 0x88, 9, 10;
    DUP10 = 0x89, 10, 11;
    DUP11 = 0x8a, 11, 12;
    DUP12 = 0x8b, 12, 13;
    DUP13 = 0x8c, 13, 14;
    DUP14 = 0x8d, 14, 15;
    DUP15 = 0x8e, 15, 16;
    DUP16 = 0x8f, 16, 17;

    SWAP1 = 0x90, 2, 2;
    SWAP2 = 0x91, 3, 3;
    SWAP3 = 0x92, 4, 4;
    SWAP4 = 0x93, 5, 5;
    SWAP5 = 0x94, 6, 6;
    SWAP6 = 0x95, 7, 7;
    SWAP7 = 0x96, 8, 8;
    SWAP8 = 0x97, 9, 9;
    SWAP9 = 0x98, 10, 10;
    SWAP10 = 0x99, 11, 11;
    SWAP11 = 0x9a, 12, 12;
    SWAP12 = 0x9b, 13, 13;
    SWAP13 = 0x9c, 14, 14;
    SWAP14 = 0x9d, 15, 15;
    SWAP15 = 0x9e, 16, 16;
    SWAP16 = 0x9f, 17, 17;

    LOG0 = 0xa0, 2, 0;
    LOG1 = 0xa1, 3, 0;
    LOG2 = 0xa2, 4, 0;
    LOG3 = 0xa3, 5, 0;
    LOG4 = 0xa4, 6, 0;

    // 0xF0 - 0xFF: system
    CREATE = 0xf0, 3, 1;
    CALL = 0xf1, 7, 1;
    CALLCODE = 0xf2, 7, 1;
    RETURN = 0xf3, 2, 0;
    DELEGATECALL = 0xf4, 6, 1;
    CREATE2 = 0xf5, 4, 1;
    STATICCALL = 0xfa, 6, 1;
    REVERT = 0xfd, 2, 0;
    INVALID = 0xfe, 0, 0;
    SELFDESTRUCT = 0xff, 1, 0;
}

impl Opcode {
    /// Immediate bytes following a `PUSHn`.
    pub const fn push_bytes(&self) -> Option<usize> {
        let byte = *self as u8;
        if byte >= Self::PUSH1 as u8 && byte <= Self::PUSH32 as u8 {
            Some((byte - Self::PUSH1 as u8 + 1) as usize)
        } else {
            None
        }
    }

    /// Depth below the top a `DUPn` copies from, `0` for `DUP1`.
    pub const fn dup_index(&self) -> Option<usize> {
        let byte = *self as u8;
        if byte >= Self::DUP1 as u8 && byte <= Self::DUP16 as u8 {
            Some((byte - Self::DUP1 as u8) as usize)
        } else {
            None
        }
    }

    /// Depth below the top a `SWAPn` exchanges with, `1` for `SWAP1`.
    pub const fn swap_index(&self) -> Option<usize> {
        let byte = *self as u8;
        if byte >= Self::SWAP1 as u8 && byte <= Self::SWAP16 as u8 {
            Some((byte - Self::SWAP1 as u8 + 1) as usize)
        } else {
            None
        }
    }

    pub const fn log_topics(&self) -> Option<usize> {
        let byte = *self as u8;
        if byte >= Self::LOG0 as u8 && byte <= Self::LOG4 as u8 {
            Some((byte - Self::LOG0 as u8) as usize)
        } else {
            None
        }
    }
}

/// Marks every offset of `code` holding a `JUMPDEST` instruction, skipping
/// bytes that are immediates of a `PUSHn`.
pub fn analyze_jumpdests(code: &[u8]) -> Vec<bool> {
    let mut valid = vec![false; code.len()];
    let mut pc = 0;
    while pc < code.len() {
        match Opcode::from_u8(code[pc]) {
            Some(Opcode::JUMPDEST) => valid[pc] = true,
            Some(op) => pc += op.push_bytes().unwrap_or(0),
            None => {}
        }
        pc += 1;
    }
    valid
}
