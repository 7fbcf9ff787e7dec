//! Script Lexer and Tokenizer
//!
//! Lexical analysis for tweaker scripts. `#` and `//` start line comments,
//! `/* ... */` is a block comment. Directive lines (`#debug`, ...) are plain
//! comments at this level.

use std::iter::Peekable;
use std::str::Chars;

/// Script token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Identifier(String),

    // Keywords
    Var,
    Val,
    Global,
    Function,
    If,
    Else,
    While,
    Return,
    True,
    False,
    Null,

    // Operators
    Plus,           // +
    Minus,          // -
    Star,           // *
    Slash,          // /
    Percent,        // %
    Tilde,          // ~

    // Comparison
    Equal,          // ==
    NotEqual,       // !=
    Less,           // <
    Greater,        // >
    LessEqual,      // <=
    GreaterEqual,   // >=

    // Logical
    And,            // &&
    Or,             // ||
    Not,            // !

    // Assignment
    Assign,         // =
    PlusEqual,      // +=
    MinusEqual,     // -=

    // Delimiters
    LParen,         // (
    RParen,         // )
    LBrace,         // {
    RBrace,         // }
    Semicolon,      // ;
    Comma,          // ,
    Colon,          // :
    Dot,            // .

    // End of file
    EOF,
}

/// A token and the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Tokenizer failure
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

/// Script lexer
pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
    ch: Option<char>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars().peekable();
        let ch = chars.next();
        Self { input: chars, line: 1, ch }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_trivia()?;

        let line = self.line;
        let token = match self.ch {
            None => Token::EOF,
            Some(ch) => self.read_token(ch)?,
        };

        Ok(Spanned { token, line })
    }

    fn read_token(&mut self, ch: char) -> Result<Token, LexError> {
        match ch {
            // Numbers
            '0'..='9' => self.read_number(),

            // Identifiers and keywords
            'a'..='z' | 'A'..='Z' | '_' => Ok(self.read_identifier()),

            // Strings
            '"' | '\'' => self.read_string(ch),

            '+' => Ok(self.either('=', Token::PlusEqual, Token::Plus)),
            '-' => Ok(self.either('=', Token::MinusEqual, Token::Minus)),
            '=' => Ok(self.either('=', Token::Equal, Token::Assign)),
            '!' => Ok(self.either('=', Token::NotEqual, Token::Not)),
            '<' => Ok(self.either('=', Token::LessEqual, Token::Less)),
            '>' => Ok(self.either('=', Token::GreaterEqual, Token::Greater)),

            '&' | '|' => {
                self.advance();
                if self.ch == Some(ch) {
                    self.advance();
                    Ok(if ch == '&' { Token::And } else { Token::Or })
                } else {
                    Err(self.error(format!("Unexpected character: {}", ch)))
                }
            }

            '*' => Ok(self.single(Token::Star)),
            '/' => Ok(self.single(Token::Slash)),
            '%' => Ok(self.single(Token::Percent)),
            '~' => Ok(self.single(Token::Tilde)),
            '(' => Ok(self.single(Token::LParen)),
            ')' => Ok(self.single(Token::RParen)),
            '{' => Ok(self.single(Token::LBrace)),
            '}' => Ok(self.single(Token::RBrace)),
            ';' => Ok(self.single(Token::Semicolon)),
            ',' => Ok(self.single(Token::Comma)),
            ':' => Ok(self.single(Token::Colon)),
            '.' => Ok(self.single(Token::Dot)),

            _ => {
                self.advance();
                Err(self.error(format!("Unexpected character: {}", ch)))
            }
        }
    }

    /// Consume the current char and return `token`
    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// Consume the current char, and `next` too when it follows
    fn either(&mut self, next: char, matched: Token, otherwise: Token) -> Token {
        self.advance();
        if self.ch == Some(next) {
            self.advance();
            matched
        } else {
            otherwise
        }
    }

    /// Read a number literal
    fn read_number(&mut self) -> Result<Token, LexError> {
        let mut num_str = String::new();
        let mut seen_dot = false;

        while let Some(ch) = self.ch {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !seen_dot && self.peek_is_digit() {
                seen_dot = true;
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        num_str
            .parse()
            .map(Token::Number)
            .map_err(|_| self.error(format!("Invalid number: {}", num_str)))
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(ch) = self.ch {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "var" => Token::Var,
            "val" => Token::Val,
            "global" => Token::Global,
            "function" => Token::Function,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Identifier(ident),
        }
    }

    /// Read a string literal delimited by `quote`
    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let start_line = self.line;
        self.advance(); // Skip opening quote

        let mut s = String::new();

        while let Some(ch) = self.ch {
            if ch == quote {
                self.advance();
                return Ok(Token::String(s));
            } else if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.ch {
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        _ => s.push(escaped),
                    }
                    self.advance();
                }
            } else {
                if ch == '\n' {
                    self.line += 1;
                }
                s.push(ch);
                self.advance();
            }
        }

        Err(LexError {
            line: start_line,
            message: "Unterminated string".into(),
        })
    }

    /// Skip whitespace and comments, counting lines
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let next = self.peek();
            match self.ch {
                Some('\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some(ch) if ch.is_whitespace() => self.advance(),
                Some('#') => self.skip_line(),
                Some('/') if next == Some('/') => self.skip_line(),
                Some('/') if next == Some('*') => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_line(&mut self) {
        while self.ch.is_some() && self.ch != Some('\n') {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        self.advance();
        self.advance();

        loop {
            let next = self.peek();
            match self.ch {
                None => {
                    return Err(LexError {
                        line: start_line,
                        message: "Unterminated block comment".into(),
                    })
                }
                Some('*') if next == Some('/') => {
                    self.advance();
                    self.advance();
                    return Ok(());
                }
                Some('\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn peek_is_digit(&mut self) -> bool {
        self.peek().is_some_and(|c| c.is_ascii_digit())
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.ch = self.input.next();
    }

    fn error(&self, message: String) -> LexError {
        LexError { line: self.line, message }
    }
}
