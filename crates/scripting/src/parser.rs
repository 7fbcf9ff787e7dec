//! Script Parser
//!
//! Recursive descent parser producing a [`ParsedFile`] bound to a group's
//! [`GlobalEnvironment`].

use crate::ast::*;
use crate::bytecode::format_number;
use crate::environment::GlobalEnvironment;
use crate::error::{Result, ScriptError};
use crate::lexer::{LexError, Lexer, Spanned, Token};
use std::collections::HashSet;
use std::io::Read;
use std::mem;
use tracing::warn;

/// Deepest statement/expression nesting a unit may use
pub const MAX_NESTING: usize = 128;

/// Parse a unit from a reader and commit its declarations to `env`.
///
/// The reader is consumed to the end. Invalid UTF-8 surfaces as
/// [`ScriptError::Io`].
pub fn parse_reader(
    reader: &mut dyn Read,
    env: &mut GlobalEnvironment,
    file: &str,
    artifact_name: &str,
    ignore_bracket_errors: bool,
) -> Result<ParsedFile> {
    let mut source = String::new();
    reader.read_to_string(&mut source)?;
    parse_source(&source, env, file, artifact_name, ignore_bracket_errors)
}

/// Parse a unit and commit its declarations to `env`.
///
/// Nothing is committed when parsing fails.
pub fn parse_source(
    source: &str,
    env: &mut GlobalEnvironment,
    file: &str,
    artifact_name: &str,
    ignore_bracket_errors: bool,
) -> Result<ParsedFile> {
    let parsed = Parser::new(source, env, file, ignore_bracket_errors)?.parse(artifact_name)?;

    for global in &parsed.globals {
        env.declare_global(global.name.clone(), file);
    }
    for function in &parsed.functions {
        env.declare_function(function.name.clone(), function.params.len(), file);
    }

    Ok(parsed)
}

/// Script parser
pub struct Parser<'a, 'e> {
    lexer: Lexer<'a>,
    current: Spanned,
    env: &'e GlobalEnvironment,
    file: String,
    ignore_bracket_errors: bool,
    declared: HashSet<String>,
    nesting: usize,
}

impl<'a, 'e> Parser<'a, 'e> {
    /// Create a new parser
    pub fn new(
        input: &'a str,
        env: &'e GlobalEnvironment,
        file: &str,
        ignore_bracket_errors: bool,
    ) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token().map_err(|e| lex_error(file, e))?;

        Ok(Self {
            lexer,
            current,
            env,
            file: file.to_string(),
            ignore_bracket_errors,
            declared: HashSet::new(),
            nesting: 0,
        })
    }

    /// Parse the whole unit
    pub fn parse(mut self, artifact_name: &str) -> Result<ParsedFile> {
        let mut globals = Vec::new();
        let mut functions = Vec::new();
        let mut statements = Vec::new();

        while !self.check(&Token::EOF) {
            match self.current.token {
                Token::Global => globals.push(self.global_declaration()?),
                Token::Function => functions.push(self.function_declaration()?),
                _ => statements.push(self.statement()?),
            }
        }

        Ok(ParsedFile {
            name: self.file,
            artifact_name: artifact_name.to_string(),
            globals,
            functions,
            statements,
        })
    }

    /// Parse `global name = value;`
    fn global_declaration(&mut self) -> Result<GlobalDecl> {
        self.consume(Token::Global, "Expected 'global'")?;
        let line = self.current.line;
        let name = self.identifier("Expected global name")?;
        self.declare(&name, line)?;

        self.consume(Token::Assign, "Expected '=' after global name")?;
        let initializer = self.expression()?;
        self.consume(Token::Semicolon, "Expected ';' after global declaration")?;

        Ok(GlobalDecl { name, initializer, line })
    }

    /// Parse `function name(params) { ... }`
    fn function_declaration(&mut self) -> Result<FunctionDecl> {
        self.consume(Token::Function, "Expected 'function'")?;
        let line = self.current.line;
        let name = self.identifier("Expected function name")?;
        self.declare(&name, line)?;

        self.consume(Token::LParen, "Expected '(' after function name")?;
        let mut params: Vec<String> = Vec::new();

        if !self.check(&Token::RParen) {
            loop {
                let param_line = self.current.line;
                let param = self.identifier("Expected parameter name")?;
                if params.contains(&param) {
                    return Err(self.error_at(param_line, format!("Duplicate parameter {}", param)));
                }
                params.push(param);

                if !self.match_token(Token::Comma)? {
                    break;
                }
            }
        }

        self.consume(Token::RParen, "Expected ')' after parameters")?;
        let body = self.block()?;

        Ok(FunctionDecl { name, params, body, line })
    }

    /// Reject names already taken in this group or this unit
    fn declare(&mut self, name: &str, line: usize) -> Result<()> {
        if self.env.natives().contains(name) {
            return Err(self.error_at(line, format!("{} shadows a native function", name)));
        }
        if let Some(unit) = self.env.declared_in(name) {
            return Err(self.error_at(line, format!("{} is already defined in {}", name, unit)));
        }
        if !self.declared.insert(name.to_string()) {
            return Err(self.error_at(line, format!("{} is already defined in this file", name)));
        }
        Ok(())
    }

    /// Parse a statement
    fn statement(&mut self) -> Result<Stmt> {
        self.nested(Self::statement_kind)
    }

    fn statement_kind(&mut self) -> Result<Stmt> {
        match self.current.token {
            Token::Var | Token::Val => self.var_declaration(),
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::Return => self.return_statement(),
            Token::LBrace => Ok(Stmt::Block(self.block()?)),
            Token::Semicolon => {
                self.advance()?;
                Ok(Stmt::Empty)
            }
            Token::Global | Token::Function => Err(self.error_at(
                self.current.line,
                "Globals and functions can only be declared at the top level".into(),
            )),
            _ => self.expression_statement(),
        }
    }

    /// Parse `var x = e;` / `val x = e;`
    fn var_declaration(&mut self) -> Result<Stmt> {
        let mutable = self.check(&Token::Var);
        self.advance()?;

        let line = self.current.line;
        let name = self.identifier("Expected variable name")?;

        let initializer = if self.match_token(Token::Assign)? {
            Some(self.expression()?)
        } else if !mutable {
            return Err(self.error_at(line, format!("val {} must be initialized", name)));
        } else {
            None
        };

        self.consume(Token::Semicolon, "Expected ';' after variable declaration")?;

        Ok(Stmt::Var {
            name,
            mutable,
            initializer,
            line,
        })
    }

    /// Parse an if statement
    fn if_statement(&mut self) -> Result<Stmt> {
        self.consume(Token::If, "Expected 'if'")?;
        self.consume(Token::LParen, "Expected '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(Token::RParen, "Expected ')' after condition")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(Token::Else)? {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// Parse a while statement
    fn while_statement(&mut self) -> Result<Stmt> {
        self.consume(Token::While, "Expected 'while'")?;
        self.consume(Token::LParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(Token::RParen, "Expected ')' after condition")?;

        let body = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    /// Parse a return statement
    fn return_statement(&mut self) -> Result<Stmt> {
        let line = self.current.line;
        self.consume(Token::Return, "Expected 'return'")?;

        let value = if !self.check(&Token::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(Token::Semicolon, "Expected ';' after return")?;

        Ok(Stmt::Return { value, line })
    }

    /// Parse `{ ... }`
    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.consume(Token::LBrace, "Expected '{'")?;

        let mut statements = Vec::new();
        while !self.check(&Token::RBrace) && !self.check(&Token::EOF) {
            statements.push(self.statement()?);
        }

        self.consume(Token::RBrace, "Expected '}' after block")?;

        Ok(statements)
    }

    /// Parse an expression statement
    fn expression_statement(&mut self) -> Result<Stmt> {
        let expr = self.expression()?;
        self.consume(Token::Semicolon, "Expected ';' after expression")?;
        Ok(Stmt::Expr(expr))
    }

    /// Parse an expression
    fn expression(&mut self) -> Result<Expr> {
        self.nested(Self::assignment)
    }

    /// Parse `=`, `+=` and `-=`
    fn assignment(&mut self) -> Result<Expr> {
        let expr = self.or()?;

        let compound = match self.current.token {
            Token::Assign => None,
            Token::PlusEqual => Some(BinaryOp::Add),
            Token::MinusEqual => Some(BinaryOp::Sub),
            _ => return Ok(expr),
        };
        let line = self.current.line;
        self.advance()?;
        let value = self.expression()?;

        let Expr::Variable { name, .. } = expr else {
            return Err(self.error_at(line, "Invalid assignment target".into()));
        };

        let value = match compound {
            Some(op) => Expr::Binary {
                left: Box::new(Expr::Variable {
                    name: name.clone(),
                    line,
                }),
                op,
                right: Box::new(value),
                line,
            },
            None => value,
        };

        Ok(Expr::Assign {
            name,
            value: Box::new(value),
            line,
        })
    }

    /// Parse logical OR
    fn or(&mut self) -> Result<Expr> {
        let mut expr = self.and()?;
        let outer = self.nesting;

        while self.check(&Token::Or) {
            let line = self.current.line;
            self.advance()?;
            self.deepen()?;
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op: LogicalOp::Or,
                right: Box::new(right),
                line,
            };
        }

        self.nesting = outer;
        Ok(expr)
    }

    /// Parse logical AND
    fn and(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;
        let outer = self.nesting;

        while self.check(&Token::And) {
            let line = self.current.line;
            self.advance()?;
            self.deepen()?;
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op: LogicalOp::And,
                right: Box::new(right),
                line,
            };
        }

        self.nesting = outer;
        Ok(expr)
    }

    /// Parse equality
    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(&[Token::Equal, Token::NotEqual], Self::comparison)
    }

    /// Parse comparison
    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[Token::Less, Token::Greater, Token::LessEqual, Token::GreaterEqual],
            Self::term,
        )
    }

    /// Parse term
    fn term(&mut self) -> Result<Expr> {
        self.binary_level(&[Token::Plus, Token::Minus, Token::Tilde], Self::factor)
    }

    /// Parse factor
    fn factor(&mut self) -> Result<Expr> {
        self.binary_level(&[Token::Star, Token::Slash, Token::Percent], Self::unary)
    }

    /// Left-associative binary operators of one precedence level
    fn binary_level(
        &mut self,
        operators: &[Token],
        operand: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut expr = operand(self)?;
        let outer = self.nesting;

        while operators.contains(&self.current.token) {
            let line = self.current.line;
            let op = BinaryOp::from_token(&self.current.token)
                .ok_or_else(|| self.error_at(line, "Expected binary operator".into()))?;
            self.advance()?;
            self.deepen()?;
            let right = operand(self)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
                line,
            };
        }

        self.nesting = outer;
        Ok(expr)
    }

    /// Parse unary expression
    fn unary(&mut self) -> Result<Expr> {
        let op = match self.current.token {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            _ => return self.call(),
        };
        let line = self.current.line;
        self.advance()?;
        let operand = self.nested(Self::unary)?;

        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            line,
        })
    }

    /// Parse function call
    fn call(&mut self) -> Result<Expr> {
        let expr = self.primary()?;

        if !self.check(&Token::LParen) {
            return Ok(expr);
        }

        let Expr::Variable { name, line } = expr else {
            return Err(self.error_at(self.current.line, "Only named functions can be called".into()));
        };
        self.advance()?;

        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(Token::Comma)? {
                    break;
                }
            }
        }
        self.consume(Token::RParen, "Expected ')' after arguments")?;

        Ok(Expr::Call { name, args, line })
    }

    /// Parse primary expression
    fn primary(&mut self) -> Result<Expr> {
        let Spanned { token, line } = self.current.clone();

        let expr = match token {
            Token::Number(n) => Expr::Number(n),
            Token::String(s) => Expr::String(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::Identifier(name) => Expr::Variable { name, line },
            Token::LParen => {
                self.advance()?;
                let expr = self.expression()?;
                self.consume(Token::RParen, "Expected ')' after expression")?;
                return Ok(expr);
            }
            Token::Less => return self.bracket(),
            _ => {
                return Err(self.error_at(line, format!("Unexpected token: {:?}", token)));
            }
        };

        self.advance()?;
        Ok(expr)
    }

    /// Parse and resolve `<part:part:...>`
    fn bracket(&mut self) -> Result<Expr> {
        let line = self.current.line;
        self.consume(Token::Less, "Expected '<'")?;

        let mut parts = Vec::new();
        let mut segment = String::new();

        loop {
            match self.current.token.clone() {
                Token::Greater => {
                    self.advance()?;
                    break;
                }
                Token::Colon => parts.push(mem::take(&mut segment)),
                Token::Identifier(s) => segment.push_str(&s),
                Token::Number(n) => segment.push_str(&format_number(n)),
                Token::Dot => segment.push('.'),
                Token::Star => segment.push('*'),
                Token::Minus => segment.push('-'),
                _ => {
                    parts.push(segment);
                    return self.bracket_failure(
                        line,
                        format!("Unclosed bracket expression <{}", parts.join(":")),
                    );
                }
            }
            self.advance()?;
        }
        parts.push(segment);

        let path = parts.join(":");
        if parts.iter().any(String::is_empty) {
            return self.bracket_failure(line, format!("Malformed bracket expression <{}>", path));
        }

        match self.env.resolve_bracket(&parts) {
            Some(value) => Ok(Expr::Bracket { path, value }),
            None => self.bracket_failure(line, format!("Could not resolve <{}>", path)),
        }
    }

    /// Fail, or evaluate to null when this unit tolerates bracket errors
    fn bracket_failure(&self, line: usize, message: String) -> Result<Expr> {
        if self.ignore_bracket_errors {
            warn!(target: "scripting", "{}:{}: {} (ignored)", self.file, line, message);
            Ok(Expr::Null)
        } else {
            Err(self.error_at(line, message))
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.deepen()?;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn deepen(&mut self) -> Result<()> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error_at(self.current.line, "Script nested too deeply".into()));
        }
        self.nesting += 1;
        Ok(())
    }

    /// Consume an identifier and return its name
    fn identifier(&mut self, message: &str) -> Result<String> {
        if let Token::Identifier(name) = &self.current.token {
            let name = name.clone();
            self.advance()?;
            Ok(name)
        } else {
            Err(self.error_at(self.current.line, message.into()))
        }
    }

    /// Check if current token matches
    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current.token) == mem::discriminant(token)
    }

    /// Match token and advance
    fn match_token(&mut self, token: Token) -> Result<bool> {
        if self.check(&token) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Consume a specific token or error
    fn consume(&mut self, token: Token, message: &str) -> Result<()> {
        if self.check(&token) {
            return self.advance();
        }

        Err(self.error_at(self.current.line, message.into()))
    }

    /// Advance to next token
    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token().map_err(|e| lex_error(&self.file, e))?;
        Ok(())
    }

    fn error_at(&self, line: usize, message: String) -> ScriptError {
        ScriptError::ParseError {
            file: self.file.clone(),
            line,
            message,
        }
    }
}

fn lex_error(file: &str, err: LexError) -> ScriptError {
    ScriptError::ParseError {
        file: file.to_string(),
        line: err.line,
        message: err.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::BracketRegistry;
    use crate::host::Natives;
    use std::sync::Arc;

    fn env() -> GlobalEnvironment {
        GlobalEnvironment::new(
            "test",
            Arc::new(Natives::with_defaults()),
            Arc::new(BracketRegistry::with_namespaces(["item"])),
        )
    }

    fn parse(source: &str) -> Result<ParsedFile> {
        parse_source(source, &mut env(), "test.zs", "test", false)
    }

    #[test]
    fn test_parse_statements() {
        let file = parse("var a = 1 + 2 * 3; val b = 'x' ~ a; print(a, b);").unwrap();
        assert_eq!(file.name, "test.zs");
        assert_eq!(file.artifact_name, "test");
        assert_eq!(file.statements.len(), 3);
    }

    #[test]
    fn test_precedence() {
        let file = parse("1 + 2 * 3;").unwrap();
        let Stmt::Expr(Expr::Binary { op, right, .. }) = &file.statements[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let file = parse("var a = 1; a += 2;").unwrap();
        let Stmt::Expr(Expr::Assign { name, value, .. }) = &file.statements[1] else {
            panic!("expected assignment");
        };
        assert_eq!(name, "a");
        assert!(matches!(**value, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_parse_declarations() {
        let file = parse(
            "global limit = 10;
             function clamp(x) { if (x > limit) { return limit; } return x; }
             print(clamp(20));",
        )
        .unwrap();

        assert_eq!(file.globals.len(), 1);
        assert_eq!(file.functions.len(), 1);
        assert_eq!(file.functions[0].params, vec!["x"]);
        assert_eq!(file.statements.len(), 1);
    }

    #[test]
    fn test_declarations_are_committed_to_environment() {
        let mut env = env();
        parse_source("global a = 1; function f(x, y) { }", &mut env, "a.zs", "a", false).unwrap();

        assert!(env.has_global("a"));
        assert_eq!(env.function("f").map(|f| f.arity), Some(2));

        let err = parse_source("global a = 2;", &mut env, "b.zs", "b", false).unwrap_err();
        assert!(err.to_string().contains("a is already defined in a.zs"), "{}", err);
    }

    #[test]
    fn test_failed_parse_commits_nothing() {
        let mut env = env();
        assert!(parse_source("global a = 1; oops(", &mut env, "a.zs", "a", false).is_err());
        assert!(!env.has_global("a"));
        assert_eq!(env.global_count(), 0);
    }

    #[test]
    fn test_redeclaration_errors() {
        assert!(parse("global print = 1;").is_err());
        assert!(parse("global a = 1; function a() {}").is_err());
        assert!(parse("function f(x, x) {}").is_err());
        assert!(parse("if (true) { global a = 1; }").is_err());
        assert!(parse("val a;").is_err());
    }

    #[test]
    fn test_parse_error_location() {
        let err = parse("var a = 1;\nvar b = ;").unwrap_err();
        match err {
            ScriptError::ParseError { file, line, .. } => {
                assert_eq!(file, "test.zs");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let depth = 200_000;
        let cases = [
            format!("var x = {}1{};", "(".repeat(depth), ")".repeat(depth)),
            format!("var x = {}1;", "-".repeat(depth)),
            format!("var x = 1{};", " + 1".repeat(depth)),
            format!("{}{}", "{".repeat(depth), "}".repeat(depth)),
            format!("{}print(1);", "if (true) ".repeat(depth)),
        ];

        for source in &cases {
            match parse(source).unwrap_err() {
                ScriptError::ParseError { line, message, .. } => {
                    assert_eq!(line, 1);
                    assert_eq!(message, "Script nested too deeply");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let depth = MAX_NESTING / 4;
        assert!(parse(&format!("var x = {}1{};", "(".repeat(depth), ")".repeat(depth))).is_ok());
        assert!(parse(&format!("var x = 1{};", " ~ 'a'".repeat(depth))).is_ok());
        assert!(parse(&format!("{}{}", "{".repeat(depth), "}".repeat(depth))).is_ok());
    }

    #[test]
    fn test_bracket_resolution() {
        let file = parse("val stone = <item:minecraft:stone>;").unwrap();
        let Stmt::Var { initializer: Some(Expr::Bracket { path, .. }), .. } = &file.statements[0] else {
            panic!("expected bracket initializer");
        };
        assert_eq!(path, "item:minecraft:stone");
    }

    #[test]
    fn test_bracket_errors() {
        assert!(parse("val x = <entity:pig>;").is_err());
        assert!(parse("val x = <item::stone>;").is_err());
        assert!(parse("val x = <item:stone;").is_err());
    }

    #[test]
    fn test_bracket_errors_suppressed() {
        let mut env = env();
        let file = parse_source(
            "val x = <entity:pig>; val y = <item:stone; print(x);",
            &mut env,
            "test.zs",
            "test",
            true,
        )
        .unwrap();

        assert_eq!(file.statements.len(), 3);
        assert!(matches!(
            &file.statements[0],
            Stmt::Var { initializer: Some(Expr::Null), .. }
        ));
        assert!(matches!(
            &file.statements[1],
            Stmt::Var { initializer: Some(Expr::Null), .. }
        ));
    }

    #[test]
    fn test_parse_reader_rejects_invalid_utf8() {
        let mut bytes: &[u8] = &[0x70, 0xff, 0xfe];
        let err = parse_reader(&mut bytes, &mut env(), "bin.zs", "bin", false).unwrap_err();
        assert!(matches!(err, ScriptError::Io(_)));
    }
}
