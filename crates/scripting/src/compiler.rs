//! Bytecode Compiler
//!
//! Compiles the parsed units of one group into artifacts: `__init__` (global
//! initialisers), one artifact per unit and the `__main__` entry point.

use crate::ast::*;
use crate::bytecode::{Chunk, Function, OpCode, Value};
use crate::environment::GlobalEnvironment;
use crate::error::{Result, ScriptError};
use crate::parser::MAX_NESTING;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tweaker_core::ArtifactSet;

/// Entry point artifact
pub const MAIN_ARTIFACT: &str = "__main__";

/// Global initialiser artifact
pub const INIT_ARTIFACT: &str = "__init__";

const MAX_LOCALS: usize = 256;

/// Compiled form of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// External unit name, used in runtime error locations
    pub source: String,
    pub body: Chunk,
    pub functions: Vec<Function>,
}

/// Contents of the `__main__` artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub group: String,
    pub debug: bool,
    /// Unit artifact names in execution order
    pub units: Vec<String>,
}

/// Compile a group's parsed units into `target`.
///
/// `__init__` holds one [`CompiledUnit`] per unit declaring globals, whose
/// body evaluates them in declaration order. Line tables are kept only when
/// `debug` is set.
pub fn compile_group(
    files: &[ParsedFile],
    env: &GlobalEnvironment,
    debug: bool,
    target: &mut ArtifactSet,
) -> Result<()> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for file in files {
        let name = file.artifact_name.as_str();
        if name == MAIN_ARTIFACT || name == INIT_ARTIFACT {
            return Err(compile_error(&file.name, 0, format!("Artifact name {} is reserved", name)));
        }
        if let Some(owner) = owners.insert(name, &file.name) {
            return Err(compile_error(
                &file.name,
                0,
                format!("Artifact name {} is already used by {}", name, owner),
            ));
        }
    }

    let mut init = Vec::new();
    for file in files.iter().filter(|f| !f.globals.is_empty()) {
        let mut compiler = Compiler::new(env, &file.name);
        for global in &file.globals {
            compiler.line = global.line;
            compiler.expression(&global.initializer)?;
            let idx = compiler.name_constant(&global.name)?;
            compiler.emit(OpCode::OpDefineGlobal);
            compiler.emit_u16(idx);
        }
        init.push(CompiledUnit {
            source: file.name.clone(),
            body: compiler.finish(debug),
            functions: Vec::new(),
        });
    }
    store(target, INIT_ARTIFACT, &init)?;

    let mut units = Vec::with_capacity(files.len());
    for file in files {
        let unit = compile_unit(file, env, debug)?;
        store(target, &file.artifact_name, &unit)?;
        units.push(file.artifact_name.clone());
    }

    let entry = EntryPoint {
        group: env.group().to_string(),
        debug,
        units,
    };
    store(target, MAIN_ARTIFACT, &entry)
}

fn compile_unit(file: &ParsedFile, env: &GlobalEnvironment, debug: bool) -> Result<CompiledUnit> {
    let mut functions = Vec::with_capacity(file.functions.len());
    for decl in &file.functions {
        let mut compiler = Compiler::new(env, &file.name);
        compiler.line = decl.line;
        for param in &decl.params {
            compiler.add_local(param, true)?;
        }
        compiler.statements(&decl.body)?;
        functions.push(Function {
            name: decl.name.clone(),
            arity: decl.params.len(),
            chunk: compiler.finish(debug),
        });
    }

    let mut compiler = Compiler::new(env, &file.name);
    compiler.statements(&file.statements)?;

    Ok(CompiledUnit {
        source: file.name.clone(),
        body: compiler.finish(debug),
        functions,
    })
}

fn store<T: Serialize>(target: &mut ArtifactSet, name: &str, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value).map_err(|e| ScriptError::InvalidArtifact {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    target.insert(name, payload);
    Ok(())
}

fn compile_error(file: &str, line: usize, message: String) -> ScriptError {
    ScriptError::CompileError {
        file: file.to_string(),
        line,
        message,
    }
}

#[derive(Debug)]
struct Local {
    name: String,
    depth: usize,
    mutable: bool,
}

/// Single-chunk compiler
struct Compiler<'a> {
    env: &'a GlobalEnvironment,
    file: &'a str,
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: usize,
    nesting: usize,
    line: usize,
}

impl<'a> Compiler<'a> {
    fn new(env: &'a GlobalEnvironment, file: &'a str) -> Self {
        Self {
            env,
            file,
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
            nesting: 0,
            line: 1,
        }
    }

    /// Terminate with an implicit `return null`
    fn finish(mut self, debug: bool) -> Chunk {
        self.emit(OpCode::OpNull);
        self.emit(OpCode::OpReturn);
        if !debug {
            self.chunk.lines.clear();
        }
        self.chunk
    }

    fn statements(&mut self, statements: &[Stmt]) -> Result<()> {
        statements.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<()> {
        self.nested(|compiler| compiler.statement_kind(stmt))
    }

    fn statement_kind(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.expression(expr)?;
                self.emit(OpCode::OpPop);
            }

            Stmt::Var { name, mutable, initializer, line } => {
                self.line = *line;
                match initializer {
                    Some(init) => self.expression(init)?,
                    None => self.emit(OpCode::OpNull),
                }
                // The value stays on the stack as the local's slot
                self.add_local(name, *mutable)?;
            }

            Stmt::If { condition, then_branch, else_branch } => {
                self.expression(condition)?;
                let then_jump = self.emit_jump(OpCode::OpJumpIfFalse);
                self.emit(OpCode::OpPop);
                self.scoped(then_branch)?;

                let else_jump = self.emit_jump(OpCode::OpJump);
                self.patch_jump(then_jump)?;
                self.emit(OpCode::OpPop);

                if let Some(else_branch) = else_branch {
                    self.scoped(else_branch)?;
                }
                self.patch_jump(else_jump)?;
            }

            Stmt::While { condition, body } => {
                let loop_start = self.chunk.code.len();
                self.expression(condition)?;
                let exit_jump = self.emit_jump(OpCode::OpJumpIfFalse);
                self.emit(OpCode::OpPop);
                self.scoped(body)?;
                self.emit_loop(loop_start)?;

                self.patch_jump(exit_jump)?;
                self.emit(OpCode::OpPop);
            }

            Stmt::Return { value, line } => {
                self.line = *line;
                match value {
                    Some(value) => self.expression(value)?,
                    None => self.emit(OpCode::OpNull),
                }
                self.emit(OpCode::OpReturn);
            }

            Stmt::Block(statements) => {
                self.scope_depth += 1;
                self.statements(statements)?;
                self.end_scope();
            }

            Stmt::Empty => {}
        }

        Ok(())
    }

    /// Compile a branch or loop body in its own scope
    fn scoped(&mut self, stmt: &Stmt) -> Result<()> {
        self.scope_depth += 1;
        self.statement(stmt)?;
        self.end_scope();
        Ok(())
    }

    fn expression(&mut self, expr: &Expr) -> Result<()> {
        self.nested(|compiler| compiler.expression_kind(expr))
    }

    fn expression_kind(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Number(n) => self.constant(Value::Number(*n))?,
            Expr::String(s) => self.constant(Value::String(s.clone()))?,
            Expr::Bool(true) => self.emit(OpCode::OpTrue),
            Expr::Bool(false) => self.emit(OpCode::OpFalse),
            Expr::Null | Expr::Bracket { value: Value::Null, .. } => self.emit(OpCode::OpNull),
            Expr::Bracket { value, .. } => self.constant(value.clone())?,

            Expr::Variable { name, line } => {
                self.line = *line;
                if let Some(slot) = self.resolve_local(name) {
                    self.emit(OpCode::OpGetLocal);
                    self.chunk.write(slot, self.line);
                } else if self.env.has_global(name) {
                    let idx = self.name_constant(name)?;
                    self.emit(OpCode::OpGetGlobal);
                    self.emit_u16(idx);
                } else if self.env.function(name).is_some() || self.env.natives().contains(name) {
                    return Err(self.error(format!("{} is a function and cannot be used as a value", name)));
                } else {
                    return Err(self.error(format!("Undefined variable {}", name)));
                }
            }

            Expr::Assign { name, value, line } => {
                self.line = *line;
                self.expression(value)?;
                self.line = *line;

                if let Some(slot) = self.resolve_local(name) {
                    if !self.locals[slot as usize].mutable {
                        return Err(self.error(format!("Cannot assign to val {}", name)));
                    }
                    self.emit(OpCode::OpSetLocal);
                    self.chunk.write(slot, self.line);
                } else if self.env.has_global(name) {
                    let idx = self.name_constant(name)?;
                    self.emit(OpCode::OpSetGlobal);
                    self.emit_u16(idx);
                } else {
                    return Err(self.error(format!("Undefined variable {}", name)));
                }
            }

            Expr::Binary { left, op, right, line } => {
                self.expression(left)?;
                self.expression(right)?;
                self.line = *line;
                self.emit(match op {
                    BinaryOp::Add => OpCode::OpAdd,
                    BinaryOp::Sub => OpCode::OpSub,
                    BinaryOp::Mul => OpCode::OpMul,
                    BinaryOp::Div => OpCode::OpDiv,
                    BinaryOp::Mod => OpCode::OpMod,
                    BinaryOp::Concat => OpCode::OpConcat,
                    BinaryOp::Equal => OpCode::OpEqual,
                    BinaryOp::NotEqual => OpCode::OpNotEqual,
                    BinaryOp::Less => OpCode::OpLess,
                    BinaryOp::Greater => OpCode::OpGreater,
                    BinaryOp::LessEqual => OpCode::OpLessEqual,
                    BinaryOp::GreaterEqual => OpCode::OpGreaterEqual,
                });
            }

            Expr::Logical { left, op, right, line } => {
                self.expression(left)?;
                self.line = *line;
                let short_circuit = self.emit_jump(match op {
                    LogicalOp::And => OpCode::OpJumpIfFalse,
                    LogicalOp::Or => OpCode::OpJumpIfTrue,
                });
                self.emit(OpCode::OpPop);
                self.expression(right)?;
                self.patch_jump(short_circuit)?;
            }

            Expr::Unary { op, operand, line } => {
                self.expression(operand)?;
                self.line = *line;
                self.emit(match op {
                    UnaryOp::Negate => OpCode::OpNeg,
                    UnaryOp::Not => OpCode::OpNot,
                });
            }

            Expr::Call { name, args, line } => {
                self.line = *line;
                self.check_call(name, args.len())?;

                for arg in args {
                    self.expression(arg)?;
                }
                self.line = *line;

                let idx = self.name_constant(name)?;
                self.emit(OpCode::OpCall);
                self.emit_u16(idx);
                self.chunk.write(args.len() as u8, self.line);
            }
        }

        Ok(())
    }

    /// Resolve a call target and check its arity
    fn check_call(&self, name: &str, argc: usize) -> Result<()> {
        if self.resolve_local(name).is_some() || self.env.has_global(name) {
            return Err(self.error(format!("{} is not a function", name)));
        }
        if argc > u8::MAX as usize {
            return Err(self.error(format!("Too many arguments in call to {}", name)));
        }

        if let Some(signature) = self.env.function(name) {
            if signature.arity != argc {
                return Err(self.error(format!(
                    "{} expects {} argument(s), got {}",
                    name, signature.arity, argc
                )));
            }
        } else if let Some(native) = self.env.natives().get(name) {
            if !native.accepts(argc) {
                return Err(self.error(format!(
                    "{} expects {} argument(s), got {}",
                    name,
                    native.arity.unwrap_or_default(),
                    argc
                )));
            }
        } else {
            return Err(self.error(format!("Undefined function {}", name)));
        }

        Ok(())
    }

    fn add_local(&mut self, name: &str, mutable: bool) -> Result<()> {
        let duplicate = self
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth == self.scope_depth)
            .any(|local| local.name == name);
        if duplicate {
            return Err(self.error(format!("{} is already declared in this scope", name)));
        }
        if self.locals.len() >= MAX_LOCALS {
            return Err(self.error("Too many local variables".into()));
        }

        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
            mutable,
        });
        Ok(())
    }

    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .rposition(|local| local.name == name)
            .map(|slot| slot as u8)
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while self.locals.last().is_some_and(|local| local.depth > self.scope_depth) {
            self.locals.pop();
            self.emit(OpCode::OpPop);
        }
    }

    fn constant(&mut self, value: Value) -> Result<()> {
        let idx = self.add_constant(value)?;
        self.emit(OpCode::OpConst);
        self.emit_u16(idx);
        Ok(())
    }

    fn name_constant(&mut self, name: &str) -> Result<u16> {
        self.add_constant(Value::String(name.to_string()))
    }

    fn add_constant(&mut self, value: Value) -> Result<u16> {
        let idx = self.chunk.add_constant(value);
        u16::try_from(idx).map_err(|_| self.error("Too many constants in one chunk".into()))
    }

    fn emit(&mut self, op: OpCode) {
        self.chunk.write_op(op, self.line);
    }

    fn emit_u16(&mut self, value: u16) {
        self.chunk.write_u16(value, self.line);
    }

    /// Emit a forward jump and return the offset of its operand
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op);
        self.emit_u16(u16::MAX);
        self.chunk.code.len() - 2
    }

    fn patch_jump(&mut self, operand: usize) -> Result<()> {
        let jump = self.chunk.code.len() - operand - 2;
        let jump = u16::try_from(jump).map_err(|_| self.error("Too much code to jump over".into()))?;
        self.chunk.patch_u16(operand, jump);
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize) -> Result<()> {
        self.emit(OpCode::OpLoop);
        let offset = self.chunk.code.len() - loop_start + 2;
        let offset = u16::try_from(offset).map_err(|_| self.error("Loop body too large".into()))?;
        self.emit_u16(offset);
        Ok(())
    }

    fn nested(&mut self, compile: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error("Script nested too deeply".into()));
        }
        self.nesting += 1;
        let result = compile(self);
        self.nesting -= 1;
        result
    }

    fn error(&self, message: String) -> ScriptError {
        compile_error(self.file, self.line, message)
    }
}
