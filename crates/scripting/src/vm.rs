//! Bytecode VM
//!
//! Loads a group's artifacts and executes them: `__init__` first, then every
//! unit body in entry point order.

use crate::bytecode::{Chunk, Function, OpCode, Value};
use crate::compiler::{CompiledUnit, EntryPoint, INIT_ARTIFACT, MAIN_ARTIFACT};
use crate::error::{Result, ScriptError};
use crate::host::Natives;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tweaker_core::ArtifactSet;

/// Maximum nesting of chunk executions (unit bodies count as one level)
pub const MAX_CALL_DEPTH: usize = 256;

/// Decoded, ready-to-run group
#[derive(Debug, Clone)]
pub struct Program {
    entry: EntryPoint,
    init: Vec<CompiledUnit>,
    units: Vec<CompiledUnit>,
    /// Function name -> (declaring unit, function)
    functions: HashMap<String, (String, Function)>,
}

impl Program {
    /// Decode the artifacts produced by [`compile_group`](crate::compiler::compile_group)
    pub fn load(artifacts: &ArtifactSet) -> Result<Self> {
        let entry: EntryPoint = decode(artifacts, MAIN_ARTIFACT)?;
        let init: Vec<CompiledUnit> = decode(artifacts, INIT_ARTIFACT)?;

        let mut units = Vec::with_capacity(entry.units.len());
        let mut functions = HashMap::new();
        for name in &entry.units {
            let unit: CompiledUnit = decode(artifacts, name)?;
            for function in &unit.functions {
                functions.insert(function.name.clone(), (unit.source.clone(), function.clone()));
            }
            units.push(unit);
        }

        Ok(Self {
            entry,
            init,
            units,
            functions,
        })
    }

    pub fn group(&self) -> &str {
        &self.entry.group
    }

    pub fn debug(&self) -> bool {
        self.entry.debug
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

fn decode<T: DeserializeOwned>(artifacts: &ArtifactSet, name: &str) -> Result<T> {
    let payload = artifacts.get(name).ok_or_else(|| ScriptError::InvalidArtifact {
        name: name.to_string(),
        message: "missing".into(),
    })?;

    serde_json::from_slice(payload).map_err(|e| ScriptError::InvalidArtifact {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Bytecode virtual machine
pub struct Vm<'p> {
    program: &'p Program,
    natives: &'p Natives,
    globals: HashMap<String, Value>,
    stack: Vec<Value>,
    depth: usize,
}

impl<'p> Vm<'p> {
    /// Create a new VM
    pub fn new(program: &'p Program, natives: &'p Natives) -> Self {
        Self {
            program,
            natives,
            globals: HashMap::new(),
            stack: Vec::with_capacity(256),
            depth: 0,
        }
    }

    /// Run global initialisers, then every unit body
    pub fn run(&mut self) -> Result<()> {
        let program = self.program;

        for unit in program.init.iter().chain(&program.units) {
            self.stack.clear();
            self.execute(&unit.body, 0, &unit.source)?;
        }

        self.stack.clear();
        Ok(())
    }

    /// Value of a global after (or during) a run
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Execute one chunk with its locals starting at `base`
    fn execute(&mut self, chunk: &Chunk, base: usize, source: &str) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::StackOverflow);
        }

        self.depth += 1;
        let result = self.run_chunk(chunk, base, source);
        self.depth -= 1;
        result
    }

    fn run_chunk(&mut self, chunk: &Chunk, base: usize, source: &str) -> Result<Value> {
        let mut ip = 0;

        loop {
            let offset = ip;
            match self.step(chunk, &mut ip, base) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => {
                    return Err(err.at(|| match chunk.line_at(offset) {
                        Some(line) => format!("{}:{}", source, line),
                        None => source.to_string(),
                    }))
                }
            }
        }
    }

    /// Execute one instruction; `Some` when the chunk returned
    fn step(&mut self, chunk: &Chunk, ip: &mut usize, base: usize) -> Result<Option<Value>> {
        let byte = read_u8(chunk, ip)?;
        let op = OpCode::from_byte(byte)
            .ok_or_else(|| ScriptError::RuntimeError(format!("Unknown opcode: {}", byte)))?;

        match op {
            OpCode::OpConst => {
                let value = constant(chunk, read_u16(chunk, ip)?)?;
                self.stack.push(value.clone());
            }
            OpCode::OpNull => self.stack.push(Value::Null),
            OpCode::OpTrue => self.stack.push(Value::Bool(true)),
            OpCode::OpFalse => self.stack.push(Value::Bool(false)),
            OpCode::OpPop => {
                self.pop()?;
            }

            OpCode::OpGetLocal => {
                let slot = base + read_u8(chunk, ip)? as usize;
                let value = self
                    .stack
                    .get(slot)
                    .cloned()
                    .ok_or_else(|| ScriptError::RuntimeError(format!("Invalid local slot {}", slot)))?;
                self.stack.push(value);
            }
            OpCode::OpSetLocal => {
                let slot = base + read_u8(chunk, ip)? as usize;
                let value = self.peek()?.clone();
                let target = self
                    .stack
                    .get_mut(slot)
                    .ok_or_else(|| ScriptError::RuntimeError(format!("Invalid local slot {}", slot)))?;
                *target = value;
            }
            OpCode::OpGetGlobal => {
                let name = name_constant(chunk, read_u16(chunk, ip)?)?;
                let value = self
                    .globals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ScriptError::RuntimeError(format!("Undefined global {}", name)))?;
                self.stack.push(value);
            }
            OpCode::OpSetGlobal => {
                let name = name_constant(chunk, read_u16(chunk, ip)?)?;
                let value = self.peek()?.clone();
                match self.globals.get_mut(name) {
                    Some(global) => *global = value,
                    None => return Err(ScriptError::RuntimeError(format!("Undefined global {}", name))),
                }
            }
            OpCode::OpDefineGlobal => {
                let name = name_constant(chunk, read_u16(chunk, ip)?)?;
                let value = self.pop()?;
                self.globals.insert(name.to_string(), value);
            }

            OpCode::OpAdd => {
                let (a, b) = self.pop_pair()?;
                let value = match (a, b) {
                    (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                    (a @ Value::String(_), b) | (a, b @ Value::String(_)) => {
                        Value::String(format!("{}{}", a, b))
                    }
                    (a, b) => return Err(type_error("+", &a, &b)),
                };
                self.stack.push(value);
            }
            OpCode::OpSub | OpCode::OpMul | OpCode::OpDiv | OpCode::OpMod => {
                let (a, b) = self.pop_pair()?;
                let value = arithmetic(op, &a, &b)?;
                self.stack.push(Value::Number(value));
            }
            OpCode::OpNeg => match self.pop()? {
                Value::Number(n) => self.stack.push(Value::Number(-n)),
                other => {
                    return Err(ScriptError::RuntimeError(format!(
                        "Cannot negate a {}",
                        other.type_name()
                    )))
                }
            },
            OpCode::OpConcat => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::String(format!("{}{}", a, b)));
            }

            OpCode::OpEqual => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Bool(a == b));
            }
            OpCode::OpNotEqual => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Bool(a != b));
            }
            OpCode::OpLess | OpCode::OpGreater | OpCode::OpLessEqual | OpCode::OpGreaterEqual => {
                let (a, b) = self.pop_pair()?;
                let result = compare(op, &a, &b)?;
                self.stack.push(Value::Bool(result));
            }

            OpCode::OpNot => {
                let value = self.pop()?;
                self.stack.push(Value::Bool(!value.is_truthy()));
            }

            OpCode::OpJump => {
                let jump = read_u16(chunk, ip)?;
                *ip += jump as usize;
            }
            OpCode::OpJumpIfFalse => {
                let jump = read_u16(chunk, ip)?;
                if !self.peek()?.is_truthy() {
                    *ip += jump as usize;
                }
            }
            OpCode::OpJumpIfTrue => {
                let jump = read_u16(chunk, ip)?;
                if self.peek()?.is_truthy() {
                    *ip += jump as usize;
                }
            }
            OpCode::OpLoop => {
                let jump = read_u16(chunk, ip)?;
                *ip = ip
                    .checked_sub(jump as usize)
                    .ok_or_else(|| ScriptError::RuntimeError("Invalid loop offset".into()))?;
            }

            OpCode::OpCall => {
                let name = name_constant(chunk, read_u16(chunk, ip)?)?;
                let argc = read_u8(chunk, ip)? as usize;
                let value = self.call(name, argc)?;
                self.stack.push(value);
            }
            OpCode::OpReturn => return self.pop().map(Some),
        }

        Ok(None)
    }

    /// Call a script function or native with `argc` arguments on the stack
    fn call(&mut self, name: &str, argc: usize) -> Result<Value> {
        let frame_base = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or_else(|| ScriptError::RuntimeError("Stack underflow".into()))?;

        let program = self.program;
        if let Some((source, function)) = program.functions.get(name) {
            if function.arity != argc {
                return Err(ScriptError::InvalidFunctionCall(format!(
                    "{} expects {} argument(s), got {}",
                    name, function.arity, argc
                )));
            }
            let result = self.execute(&function.chunk, frame_base, source)?;
            self.stack.truncate(frame_base);
            return Ok(result);
        }

        let native = self
            .natives
            .get(name)
            .ok_or_else(|| ScriptError::InvalidFunctionCall(format!("Undefined function {}", name)))?;
        if !native.accepts(argc) {
            return Err(ScriptError::InvalidFunctionCall(format!(
                "{} does not accept {} argument(s)",
                name, argc
            )));
        }

        let args = self.stack.split_off(frame_base);
        native
            .call(&args)
            .map_err(|message| ScriptError::RuntimeError(format!("{}: {}", name, message)))
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| ScriptError::RuntimeError("Stack underflow".into()))
    }

    fn pop_pair(&mut self) -> Result<(Value, Value)> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn peek(&self) -> Result<&Value> {
        self.stack
            .last()
            .ok_or_else(|| ScriptError::RuntimeError("Stack underflow".into()))
    }
}

fn read_u8(chunk: &Chunk, ip: &mut usize) -> Result<u8> {
    let byte = chunk
        .code
        .get(*ip)
        .copied()
        .ok_or_else(|| ScriptError::RuntimeError("Unexpected end of bytecode".into()))?;
    *ip += 1;
    Ok(byte)
}

fn read_u16(chunk: &Chunk, ip: &mut usize) -> Result<u16> {
    let value = chunk
        .read_u16(*ip)
        .ok_or_else(|| ScriptError::RuntimeError("Unexpected end of bytecode".into()))?;
    *ip += 2;
    Ok(value)
}

fn constant(chunk: &Chunk, idx: u16) -> Result<&Value> {
    chunk
        .constants
        .get(idx as usize)
        .ok_or_else(|| ScriptError::RuntimeError(format!("Invalid constant index {}", idx)))
}

fn name_constant(chunk: &Chunk, idx: u16) -> Result<&str> {
    match constant(chunk, idx)? {
        Value::String(name) => Ok(name),
        other => Err(ScriptError::RuntimeError(format!(
            "Expected a name constant, found {}",
            other.type_name()
        ))),
    }
}

fn arithmetic(op: OpCode, a: &Value, b: &Value) -> Result<f64> {
    let symbol = match op {
        OpCode::OpSub => "-",
        OpCode::OpMul => "*",
        OpCode::OpDiv => "/",
        _ => "%",
    };

    let (Value::Number(a), Value::Number(b)) = (a, b) else {
        return Err(type_error(symbol, a, b));
    };

    match op {
        OpCode::OpSub => Ok(a - b),
        OpCode::OpMul => Ok(a * b),
        _ if *b == 0.0 => Err(ScriptError::RuntimeError("Division by zero".into())),
        OpCode::OpDiv => Ok(a / b),
        _ => Ok(a % b),
    }
}

fn compare(op: OpCode, a: &Value, b: &Value) -> Result<bool> {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => {
            let symbol = match op {
                OpCode::OpLess => "<",
                OpCode::OpGreater => ">",
                OpCode::OpLessEqual => "<=",
                _ => ">=",
            };
            return Err(type_error(symbol, a, b));
        }
    };

    Ok(ordering.is_some_and(|ordering| match op {
        OpCode::OpLess => ordering.is_lt(),
        OpCode::OpGreater => ordering.is_gt(),
        OpCode::OpLessEqual => ordering.is_le(),
        _ => ordering.is_ge(),
    }))
}

fn type_error(symbol: &str, a: &Value, b: &Value) -> ScriptError {
    ScriptError::RuntimeError(format!(
        "Cannot apply {} to {} and {}",
        symbol,
        a.type_name(),
        b.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_group;
    use crate::environment::{BracketRegistry, GlobalEnvironment};
    use crate::parser::parse_source;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Natives with a `record(x)` that captures its argument
    fn natives() -> (Natives, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut natives = Natives::with_defaults();
        natives.register("record", Some(1), move |args| {
            sink.lock().push(args[0].to_string());
            Ok(Value::Null)
        });
        natives.register("fail", Some(0), |_| Err("refused".into()));
        (natives, seen)
    }

    fn build(sources: &[(&str, &str)], natives: &Natives, debug: bool) -> Program {
        let mut env = GlobalEnvironment::new(
            "test",
            Arc::new(natives.clone()),
            Arc::new(BracketRegistry::with_namespaces(["item"])),
        );
        let mut files = Vec::new();
        for (name, source) in sources {
            let artifact = tweaker_core::artifact_name(name);
            files.push(parse_source(source, &mut env, name, &artifact, false).unwrap());
        }
        let mut artifacts = ArtifactSet::new();
        compile_group(&files, &env, debug, &mut artifacts).unwrap();
        Program::load(&artifacts).unwrap()
    }

    fn run(source: &str) -> Vec<String> {
        let (natives, seen) = natives();
        let program = build(&[("main.zs", source)], &natives, false);
        Vm::new(&program, &natives).run().unwrap();
        let out = seen.lock().clone();
        out
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(
            run("record(1 + 2 * 3); record('a' + 1); record(7 % 4 - 1); record('x' ~ true);"),
            vec!["7", "a1", "2", "xtrue"]
        );
    }

    #[test]
    fn test_control_flow() {
        let out = run(
            "var total = 0;
             var i = 0;
             while (i < 5) {
                 if (i % 2 == 0) { total += i; } else { var skip = i; }
                 i += 1;
             }
             record(total);
             record(i >= 5 && total == 6);
             record(false || 'fallback');",
        );
        assert_eq!(out, vec!["6", "true", "fallback"]);
    }

    #[test]
    fn test_functions_and_recursion() {
        let out = run(
            "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }
             function greet(name) { var msg = 'hi ' ~ name; return msg; }
             record(fib(10));
             record(greet('bob'));",
        );
        assert_eq!(out, vec!["55", "hi bob"]);
    }

    #[test]
    fn test_globals_across_units() {
        let (natives, seen) = natives();
        let program = build(
            &[
                ("a.zs", "global count = 1; function bump() { count = count + 1; return count; }"),
                ("b.zs", "bump(); record(bump()); record(<item:minecraft:stone>);"),
            ],
            &natives,
            false,
        );

        assert_eq!(program.group(), "test");
        assert_eq!(program.unit_count(), 2);

        let mut vm = Vm::new(&program, &natives);
        vm.run().unwrap();
        assert_eq!(*seen.lock(), vec!["3", "item:minecraft:stone"]);
        assert_eq!(vm.global("count"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_runtime_error_location_with_debug() {
        let (natives, _) = natives();
        let program = build(&[("boom.zs", "var a = 1;\n\nrecord(a - 'x');")], &natives, true);
        assert!(program.debug());

        let err = Vm::new(&program, &natives).run().unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: Cannot apply - to number and string (at boom.zs:3)");
    }

    #[test]
    fn test_runtime_error_location_without_debug() {
        let (natives, _) = natives();
        let program = build(&[("boom.zs", "\nfail();")], &natives, false);

        let err = Vm::new(&program, &natives).run().unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: fail: refused (at boom.zs)");
    }

    #[test]
    fn test_stack_overflow() {
        let (natives, _) = natives();
        let program = build(&[("deep.zs", "function down(n) { return down(n + 1); } down(0);")], &natives, false);

        let err = Vm::new(&program, &natives).run().unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Located { ref source, .. } if matches!(**source, ScriptError::StackOverflow)
        ));
    }

    #[test]
    fn test_missing_artifact() {
        let err = Program::load(&ArtifactSet::new()).unwrap_err();
        assert!(matches!(err, ScriptError::InvalidArtifact { ref name, .. } if name == MAIN_ARTIFACT));
    }
}
