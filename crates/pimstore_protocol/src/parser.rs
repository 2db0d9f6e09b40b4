//! Command line tokenizer.
//!
//! A command line is `tag verb arguments…`. Arguments are atoms, quoted
//! strings (with `\"` and `\\` escapes) or parenthesized lists that may nest.

use crate::error::{ProtocolError, ProtocolResult};
use std::collections::VecDeque;
use std::fmt;

/// A single lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A bare word such as `LIST`, `1:5` or `-key`.
    Atom(String),
    /// A double-quoted string, unescaped.
    Quoted(String),
    /// A parenthesized list.
    List(Vec<Token>),
}

impl Token {
    /// Returns the text of an atom or quoted string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Atom(s) | Token::Quoted(s) => Some(s),
            Token::List(_) => None,
        }
    }

    /// Returns the text of an atom.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Token::Atom(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Atom(s) => f.write_str(s),
            Token::Quoted(s) => f.write_str(&crate::response::quote(s)),
            Token::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Splits a line into tokens.
pub fn tokenize(line: &str) -> ProtocolResult<Vec<Token>> {
    let mut stack: Vec<Vec<Token>> = vec![Vec::new()];
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                stack.push(Vec::new());
            }
            ')' => {
                chars.next();
                let list = stack.pop().ok_or(ProtocolError::UnbalancedParenthesis)?;
                stack
                    .last_mut()
                    .ok_or(ProtocolError::UnbalancedParenthesis)?
                    .push(Token::List(list));
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(ProtocolError::UnterminatedString);
                }
                push_token(&mut stack, Token::Quoted(text))?;
            }
            _ => {
                let mut atom = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                push_token(&mut stack, Token::Atom(atom))?;
            }
        }
    }

    if stack.len() != 1 {
        return Err(ProtocolError::UnbalancedParenthesis);
    }
    stack.pop().ok_or(ProtocolError::UnbalancedParenthesis)
}

fn push_token(stack: &mut [Vec<Token>], token: Token) -> ProtocolResult<()> {
    stack
        .last_mut()
        .ok_or(ProtocolError::UnbalancedParenthesis)?
        .push(token);
    Ok(())
}

/// A decoded command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Client-chosen tag echoed in the final response.
    pub tag: String,
    /// Command verb, uppercased.
    pub verb: String,
    /// Remaining arguments.
    pub args: Args,
}

impl CommandLine {
    /// Parses a full command line.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let mut tokens = VecDeque::from(tokenize(line)?);
        let tag = match tokens.pop_front() {
            Some(Token::Atom(tag)) => tag,
            Some(other) => return Err(ProtocolError::unexpected("tag", other.to_string())),
            None => return Err(ProtocolError::EmptyLine),
        };
        let verb = match tokens.pop_front() {
            Some(Token::Atom(verb)) => verb.to_ascii_uppercase(),
            Some(other) => return Err(ProtocolError::unexpected("verb", other.to_string())),
            None => return Err(ProtocolError::MissingVerb),
        };
        Ok(Self {
            tag,
            verb,
            args: Args { tokens },
        })
    }

    /// Extracts the tag of a line that may otherwise be malformed.
    ///
    /// Used to address the error response of a line that failed to parse.
    pub fn tag_of(line: &str) -> Option<&str> {
        line.split_whitespace()
            .next()
            .filter(|t| !t.starts_with('(') && !t.starts_with('"'))
    }
}

/// Cursor over command arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    tokens: VecDeque<Token>,
}

impl Args {
    /// Creates a cursor over the given tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    /// Returns true if no arguments remain.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the next argument without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    /// Consumes the next argument of any shape.
    pub fn next_token(&mut self, name: &'static str) -> ProtocolResult<Token> {
        self.tokens
            .pop_front()
            .ok_or(ProtocolError::MissingArgument(name))
    }

    /// Consumes an atom.
    pub fn next_atom(&mut self, name: &'static str) -> ProtocolResult<String> {
        match self.next_token(name)? {
            Token::Atom(s) => Ok(s),
            other => Err(ProtocolError::unexpected(name, other.to_string())),
        }
    }

    /// Consumes an atom or quoted string.
    pub fn next_string(&mut self, name: &'static str) -> ProtocolResult<String> {
        match self.next_token(name)? {
            Token::Atom(s) | Token::Quoted(s) => Ok(s),
            other => Err(ProtocolError::unexpected(name, other.to_string())),
        }
    }

    /// Consumes a non-negative decimal number.
    pub fn next_number(&mut self, name: &'static str) -> ProtocolResult<u64> {
        let atom = self.next_atom(name)?;
        parse_number(&atom)
    }

    /// Consumes a parenthesized list.
    pub fn next_list(&mut self, name: &'static str) -> ProtocolResult<Vec<Token>> {
        match self.next_token(name)? {
            Token::List(items) => Ok(items),
            other => Err(ProtocolError::unexpected(name, other.to_string())),
        }
    }

    /// Consumes all remaining arguments.
    pub fn rest(&mut self) -> Vec<Token> {
        self.tokens.drain(..).collect()
    }

    /// Fails if any argument remains.
    pub fn finish(&self) -> ProtocolResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(extra) => Err(ProtocolError::unexpected("end of line", extra.to_string())),
        }
    }
}

/// Parses a non-negative decimal number.
pub fn parse_number(text: &str) -> ProtocolResult<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidNumber(text.to_string()));
    }
    text.parse()
        .map_err(|_| ProtocolError::InvalidNumber(text.to_string()))
}

/// Collects the string values of a list, rejecting nested lists.
pub fn string_list(name: &'static str, items: Vec<Token>) -> ProtocolResult<Vec<String>> {
    items
        .into_iter()
        .map(|token| match token {
            Token::Atom(s) | Token::Quoted(s) => Ok(s),
            other => Err(ProtocolError::unexpected(name, other.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(s: &str) -> Token {
        Token::Atom(s.to_string())
    }

    #[test]
    fn tokenize_nested_lists() {
        let tokens = tokenize(r#"2 LIST 0 INF (MIMETYPE (text/calendar)) ()"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                atom("2"),
                atom("LIST"),
                atom("0"),
                atom("INF"),
                Token::List(vec![
                    atom("MIMETYPE"),
                    Token::List(vec![atom("text/calendar")]),
                ]),
                Token::List(vec![]),
            ]
        );
    }

    #[test]
    fn tokenize_quoted_escapes() {
        let tokens = tokenize(r#"NAME "a \"b\" c\\d""#).unwrap();
        assert_eq!(tokens[1], Token::Quoted(r#"a "b" c\d"#.to_string()));
    }

    #[test]
    fn tokenize_rejects_unbalanced_input() {
        assert_eq!(
            tokenize("a (b"),
            Err(ProtocolError::UnbalancedParenthesis)
        );
        assert_eq!(tokenize("a b)"), Err(ProtocolError::UnbalancedParenthesis));
        assert_eq!(tokenize(r#"a "b"#), Err(ProtocolError::UnterminatedString));
    }

    #[test]
    fn parse_command_line() {
        let mut cmd = CommandLine::parse("a1 modify 5 NAME \"Inbox\"").unwrap();
        assert_eq!(cmd.tag, "a1");
        assert_eq!(cmd.verb, "MODIFY");
        assert_eq!(cmd.args.next_number("id").unwrap(), 5);
        assert_eq!(cmd.args.next_atom("field").unwrap(), "NAME");
        assert_eq!(cmd.args.next_string("name").unwrap(), "Inbox");
        assert!(cmd.args.finish().is_ok());
    }

    #[test]
    fn parse_errors() {
        assert_eq!(CommandLine::parse("   "), Err(ProtocolError::EmptyLine));
        assert_eq!(CommandLine::parse("7"), Err(ProtocolError::MissingVerb));
        assert!(matches!(
            CommandLine::parse("(x) LIST"),
            Err(ProtocolError::UnexpectedToken { name: "tag", .. })
        ));
    }

    #[test]
    fn args_report_missing_and_wrong_shapes() {
        let mut args = Args::new(vec![Token::List(vec![])]);
        assert!(matches!(
            args.next_atom("set"),
            Err(ProtocolError::UnexpectedToken { name: "set", .. })
        ));
        assert_eq!(
            args.next_atom("set"),
            Err(ProtocolError::MissingArgument("set"))
        );
        assert_eq!(
            parse_number("12a"),
            Err(ProtocolError::InvalidNumber("12a".into()))
        );
    }

    #[test]
    fn token_display_roundtrips_wire_form() {
        let tokens = tokenize(r#"(FLAGS ("\\Seen" x))"#).unwrap();
        assert_eq!(tokens[0].to_string(), r#"(FLAGS ("\\Seen" x))"#);
    }

    #[test]
    fn tag_of_malformed_line() {
        assert_eq!(CommandLine::tag_of("9 LIST (("), Some("9"));
        assert_eq!(CommandLine::tag_of(""), None);
    }
}
