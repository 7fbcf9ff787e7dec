//! Bytecode
//!
//! Instruction set, chunks and runtime values. Chunks and functions are
//! serde types so the compiler can emit them as artifact payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opcodes. Operands follow the opcode byte, u16 operands big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Constants
    OpConst,       // Push constant (u16 index)
    OpNull,        // Push null
    OpTrue,        // Push true
    OpFalse,       // Push false

    // Stack operations
    OpPop,         // Pop top value

    // Variables
    OpGetLocal,    // Push local (u8 slot)
    OpSetLocal,    // Store top into local (u8 slot), keeps it on the stack
    OpGetGlobal,   // Push global (u16 name constant)
    OpSetGlobal,   // Store top into existing global (u16 name constant)
    OpDefineGlobal,// Pop into new global (u16 name constant)

    // Arithmetic
    OpAdd,         // Addition, concatenates when either side is a string
    OpSub,         // Subtraction
    OpMul,         // Multiplication
    OpDiv,         // Division
    OpMod,         // Modulo
    OpNeg,         // Negation
    OpConcat,      // String concatenation (~)

    // Comparison
    OpEqual,       // Equality check
    OpNotEqual,    // Inequality check
    OpLess,        // Less than
    OpGreater,     // Greater than
    OpLessEqual,   // Less than or equal
    OpGreaterEqual,// Greater than or equal

    // Logical
    OpNot,         // Logical not

    // Control flow
    OpJump,        // Forward jump (u16 offset)
    OpJumpIfFalse, // Forward jump if top is falsy, top stays
    OpJumpIfTrue,  // Forward jump if top is truthy, top stays
    OpLoop,        // Backward jump (u16 offset)
    OpCall,        // Call by name (u16 name constant, u8 argc)
    OpReturn,      // Return top of stack
}

impl OpCode {
    /// Convert opcode to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert byte to opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(OpCode::OpConst),
            1 => Some(OpCode::OpNull),
            2 => Some(OpCode::OpTrue),
            3 => Some(OpCode::OpFalse),

            4 => Some(OpCode::OpPop),

            5 => Some(OpCode::OpGetLocal),
            6 => Some(OpCode::OpSetLocal),
            7 => Some(OpCode::OpGetGlobal),
            8 => Some(OpCode::OpSetGlobal),
            9 => Some(OpCode::OpDefineGlobal),

            10 => Some(OpCode::OpAdd),
            11 => Some(OpCode::OpSub),
            12 => Some(OpCode::OpMul),
            13 => Some(OpCode::OpDiv),
            14 => Some(OpCode::OpMod),
            15 => Some(OpCode::OpNeg),
            16 => Some(OpCode::OpConcat),

            17 => Some(OpCode::OpEqual),
            18 => Some(OpCode::OpNotEqual),
            19 => Some(OpCode::OpLess),
            20 => Some(OpCode::OpGreater),
            21 => Some(OpCode::OpLessEqual),
            22 => Some(OpCode::OpGreaterEqual),

            23 => Some(OpCode::OpNot),

            24 => Some(OpCode::OpJump),
            25 => Some(OpCode::OpJumpIfFalse),
            26 => Some(OpCode::OpJumpIfTrue),
            27 => Some(OpCode::OpLoop),
            28 => Some(OpCode::OpCall),
            29 => Some(OpCode::OpReturn),

            _ => None,
        }
    }

    /// Number of operand bytes following the opcode
    pub fn operand_len(self) -> usize {
        match self {
            OpCode::OpGetLocal | OpCode::OpSetLocal => 1,
            OpCode::OpConst
            | OpCode::OpGetGlobal
            | OpCode::OpSetGlobal
            | OpCode::OpDefineGlobal
            | OpCode::OpJump
            | OpCode::OpJumpIfFalse
            | OpCode::OpJumpIfTrue
            | OpCode::OpLoop => 2,
            OpCode::OpCall => 3,
            _ => 0,
        }
    }
}

/// Compiled chunk of bytecode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Bytecode instructions
    pub code: Vec<u8>,

    /// Constant pool
    pub constants: Vec<Value>,

    /// Source line per code byte; empty unless compiled with debug info
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<usize>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a byte to the chunk
    pub fn write(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write an opcode to the chunk
    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.write(op.to_byte(), line);
    }

    /// Write a big-endian u16 operand
    pub fn write_u16(&mut self, value: u16, line: usize) {
        let [hi, lo] = value.to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
    }

    /// Read a big-endian u16 operand
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let hi = *self.code.get(offset)?;
        let lo = *self.code.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Overwrite a previously written u16 operand
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Add a constant to the constant pool, reusing an equal string constant
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Value::String(_) = value {
            if let Some(idx) = self.constants.iter().position(|c| *c == value) {
                return idx;
            }
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Source line of the instruction at `offset`, when debug info is present
    pub fn line_at(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    /// Disassemble the chunk for debugging
    pub fn disassemble(&self, name: &str) -> String {
        let mut output = format!("== {} ==\n", name);

        let mut offset = 0;
        while offset < self.code.len() {
            output.push_str(&self.disassemble_instruction(offset));
            output.push('\n');
            offset += self.instruction_length(offset);
        }

        output
    }

    /// Disassemble a single instruction
    fn disassemble_instruction(&self, offset: usize) -> String {
        let byte = self.code[offset];
        let Some(op) = OpCode::from_byte(byte) else {
            return format!("{:04} UNKNOWN_OP({})", offset, byte);
        };

        match op {
            OpCode::OpConst
            | OpCode::OpGetGlobal
            | OpCode::OpSetGlobal
            | OpCode::OpDefineGlobal => {
                let idx = self.read_u16(offset + 1).unwrap_or(u16::MAX) as usize;
                match self.constants.get(idx) {
                    Some(value) => format!("{:04} {:?} {} ({:?})", offset, op, idx, value),
                    None => format!("{:04} {:?} {} (?)", offset, op, idx),
                }
            }
            OpCode::OpGetLocal | OpCode::OpSetLocal => {
                let slot = self.code.get(offset + 1).copied().unwrap_or(0);
                format!("{:04} {:?} {}", offset, op, slot)
            }
            OpCode::OpJump | OpCode::OpJumpIfFalse | OpCode::OpJumpIfTrue => {
                let jump = self.read_u16(offset + 1).unwrap_or(0) as usize;
                format!("{:04} {:?} -> {:04}", offset, op, offset + 3 + jump)
            }
            OpCode::OpLoop => {
                let jump = self.read_u16(offset + 1).unwrap_or(0) as usize;
                format!("{:04} {:?} -> {:04}", offset, op, (offset + 3).saturating_sub(jump))
            }
            OpCode::OpCall => {
                let idx = self.read_u16(offset + 1).unwrap_or(u16::MAX) as usize;
                let argc = self.code.get(offset + 3).copied().unwrap_or(0);
                let name = self.constants.get(idx).map(|v| v.to_string()).unwrap_or_default();
                format!("{:04} {:?} {}({})", offset, op, name, argc)
            }
            _ => format!("{:04} {:?}", offset, op),
        }
    }

    /// Get the length of an instruction
    fn instruction_length(&self, offset: usize) -> usize {
        1 + OpCode::from_byte(self.code[offset]).map_or(0, OpCode::operand_len)
    }
}

/// Function object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    pub chunk: Chunk,
}

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

impl Value {
    /// Check if value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => f.write_str("null"),
        }
    }
}

/// Format a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
