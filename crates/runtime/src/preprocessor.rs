//! Directive preprocessor
//!
//! Units are scanned before they are parsed. Lines of the form
//! `#name [argument]` are directives:
//!
//! - `#debug`: compile the unit's group with debug artifacts
//! - `#ignoreBracketErrors`: tolerate bracket errors in this unit
//! - `#norun`: skip the unit
//! - `#loader <name>`: only load the unit under the named loader
//!
//! Any other `#word` line is a comment.

use crate::error::ScanError;
use nom::{
    bytes::complete::take_while1,
    character::complete::{char, space0, space1},
    combinator::{all_consuming, opt},
    sequence::{pair, preceded, terminated},
    IResult,
};
use std::io::Read;
use tracing::trace;

/// Directives found in one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub debug: bool,
    pub ignore_bracket_errors: bool,
    pub norun: bool,
    pub loader: Option<String>,
}

impl Directives {
    /// Whether the unit should be loaded by the loader with this name
    pub fn runs_under(&self, loader: &str) -> bool {
        self.loader.as_deref().map_or(true, |wanted| wanted == loader)
    }
}

/// Inspects a unit's raw content before parsing
pub trait Preprocessor: Send + Sync {
    fn scan(&self, unit: &str, reader: &mut dyn Read) -> Result<Directives, ScanError>;
}

/// Default preprocessor recognising `#` directives
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveScanner;

impl Preprocessor for DirectiveScanner {
    fn scan(&self, unit: &str, reader: &mut dyn Read) -> Result<Directives, ScanError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let content = String::from_utf8(bytes)?;

        let mut directives = Directives::default();
        for (idx, line) in content.lines().enumerate() {
            let Ok((_, (name, argument))) = directive(line.trim()) else {
                continue;
            };

            match name {
                "debug" => directives.debug = true,
                "ignoreBracketErrors" => directives.ignore_bracket_errors = true,
                "norun" => directives.norun = true,
                "loader" => match argument {
                    Some(loader) => directives.loader = Some(loader.to_string()),
                    None => {
                        return Err(ScanError::Directive {
                            line: idx + 1,
                            message: "#loader requires a loader name".into(),
                        })
                    }
                },
                _ => continue,
            }
            trace!("{}:{}: #{}", unit, idx + 1, name);
        }

        Ok(directives)
    }
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn directive_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// `#name [argument]`, the whole (trimmed) line
fn directive(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    all_consuming(pair(
        preceded(char('#'), directive_name),
        terminated(opt(preceded(space1, word)), space0),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Result<Directives, ScanError> {
        DirectiveScanner.scan("test.zs", &mut text.as_bytes())
    }

    #[test]
    fn test_directive_line() {
        assert_eq!(directive("#debug"), Ok(("", ("debug", None))));
        assert_eq!(directive("#loader contenttweaker"), Ok(("", ("loader", Some("contenttweaker")))));
        assert!(directive("# a comment").is_err());
        assert!(directive("#loader two words").is_err());
        assert!(directive("print(1);").is_err());
    }

    #[test]
    fn test_scan_directives() {
        let directives = scan(
            "#debug\n  #ignoreBracketErrors  \n#priority 10\n// #norun in a comment\nprint(1);\n",
        )
        .unwrap();

        assert!(directives.debug);
        assert!(directives.ignore_bracket_errors);
        assert!(!directives.norun);
        assert_eq!(directives.loader, None);
        assert!(directives.runs_under("tweaker"));
    }

    #[test]
    fn test_loader_directive() {
        let directives = scan("#norun\n#loader preinit\n").unwrap();
        assert!(directives.norun);
        assert!(directives.runs_under("preinit"));
        assert!(!directives.runs_under("tweaker"));
    }

    #[test]
    fn test_scan_errors() {
        let err = scan("print(1);\n#loader\n").unwrap_err();
        assert_eq!(err.to_string(), "line 2: #loader requires a loader name");

        let mut bytes: &[u8] = &[b'#', 0xff, 0xfe];
        let err = DirectiveScanner.scan("bin.zs", &mut bytes).unwrap_err();
        assert!(matches!(err, ScanError::Encoding(_)));
    }
}
