//! The token stream over configuration text.
//!
//! The lexer recognizes the token set of the configuration grammar and
//! tracks 1-based line numbers. String tokens are handed to the parser in
//! raw form, delimiters included; unescaping happens in
//! [`unescape`]. Number lexing never consults the locale: only `.` is a
//! decimal separator.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{digit1, hex_digit1, one_of},
    combinator::{opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::error::{Error, ErrorKind};

/// A single token. String payloads borrow from the input text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Token<'t> {
    Ident(&'t str),
    Bool(bool),
    Int(i64),
    Number(f64),
    /// A string literal in raw form, delimiters included.
    Str(&'t str),
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Comma,
    Equals,
    Percent,
    Semi,
    Plus,
    Newline,
}

impl Token<'_> {
    /// A short description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("'{name}'"),
            Token::Bool(value) => format!("'{value}'"),
            Token::Int(value) => format!("'{value}'"),
            Token::Number(value) => format!("'{value}'"),
            Token::Str(_) => "string".to_owned(),
            Token::LeftBrace => "'{'".to_owned(),
            Token::RightBrace => "'}'".to_owned(),
            Token::LeftParen => "'('".to_owned(),
            Token::RightParen => "')'".to_owned(),
            Token::Comma => "','".to_owned(),
            Token::Equals => "'='".to_owned(),
            Token::Percent => "'%'".to_owned(),
            Token::Semi => "';'".to_owned(),
            Token::Plus => "'+'".to_owned(),
            Token::Newline => "end of line".to_owned(),
        }
    }
}

/// Recognizes a key-name shaped word.
pub(crate) fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    ))(input)
}

/// Recognizes a floating point literal: optional sign, optional integer
/// part, mandatory `.`, optional fraction, optional exponent.
pub(crate) fn raw_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        opt(digit1),
        nom::character::complete::char('.'),
        opt(digit1),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

/// Recognizes an integer literal: optional sign, then decimal digits or a
/// `0x` prefix with hex digits.
pub(crate) fn raw_int(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(preceded(alt((tag("0x"), tag("0X"))), hex_digit1)),
            digit1,
        )),
    ))(input)
}

/// Converts an integer literal to its value; overflow is `OutOfRange`.
pub(crate) fn int_value(literal: &str) -> Result<i64, ErrorKind> {
    let (negative, unsigned) = match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, literal),
    };
    let digits = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"));
    let signed = match digits {
        Some(digits) => format!("{}{}", if negative { "-" } else { "" }, digits),
        None => format!("{}{}", if negative { "-" } else { "" }, unsigned),
    };
    i64::from_str_radix(&signed, if digits.is_some() { 16 } else { 10 })
        .map_err(|_| ErrorKind::OutOfRange)
}

/// Classifies a word as a reserved literal, if it is one. The boolean
/// words are matched exactly; the number words are matched in any case.
fn reserved_word(word: &str) -> Option<Token<'static>> {
    match word {
        "yes" | "true" => return Some(Token::Bool(true)),
        "no" | "false" => return Some(Token::Bool(false)),
        _ => {}
    }
    if word.eq_ignore_ascii_case("nan") {
        Some(Token::Number(f64::NAN))
    } else if word.eq_ignore_ascii_case("inf") || word.eq_ignore_ascii_case("infinity") {
        Some(Token::Number(f64::INFINITY))
    } else {
        None
    }
}

/// How scanning a string literal can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringScan {
    NotAString,
    Newline,
    Unterminated,
}

/// Scans a string literal from the start of `input`, returning the raw
/// token (delimiters included) and the rest of the input. The delimiting
/// quote is escaped by doubling; newlines inside the delimiters are not
/// permitted.
pub(crate) fn scan_string(input: &str) -> Result<(&str, &str), StringScan> {
    let mut chars = input.char_indices();
    let delimiter = match chars.next() {
        Some((_, c @ ('"' | '\''))) => c,
        _ => return Err(StringScan::NotAString),
    };
    while let Some((index, c)) = chars.next() {
        if c == '\n' || c == '\r' {
            return Err(StringScan::Newline);
        }
        if c == delimiter {
            // A doubled delimiter stays inside the token.
            if input[index + 1..].starts_with(delimiter) {
                chars.next();
                continue;
            }
            return Ok((&input[..index + 1], &input[index + 1..]));
        }
    }
    Err(StringScan::Unterminated)
}

/// Produces the string payload from a raw token: the delimiters are
/// peeled off and doubled delimiters are halved.
pub(crate) fn unescape(raw: &str) -> String {
    let delimiter = raw.chars().next().unwrap_or('"');
    let inner = &raw[1..raw.len().saturating_sub(1)];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        result.push(c);
        if c == delimiter {
            chars.next();
        }
    }
    result
}

/// A pull lexer over a single source text.
pub(crate) struct Lexer<'t> {
    rest: &'t str,
    line: usize,
}

impl<'t> Lexer<'t> {
    pub(crate) fn new(text: &'t str) -> Self {
        Lexer { rest: text, line: 1 }
    }

    fn error(&self, kind: ErrorKind, extra: impl Into<String>) -> Error {
        Error::new(kind, self.line).with_extra(extra)
    }

    /// Yields the next token with the line it starts on, or `None` at end
    /// of input. Comments and horizontal whitespace are skipped here.
    pub(crate) fn next_token(&mut self) -> Result<Option<(Token<'t>, usize)>, Error> {
        loop {
            self.rest = self.rest.trim_start_matches(|c| c == ' ' || c == '\t');
            if let Some(stripped) = self.rest.strip_prefix('#') {
                self.rest = match stripped.find('\n') {
                    Some(pos) => &stripped[pos..],
                    None => "",
                };
                continue;
            }
            break;
        }
        let line = self.line;
        let mut chars = self.rest.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Ok(None),
        };
        let (token, consumed) = match first {
            '\n' => {
                self.line += 1;
                (Token::Newline, 1)
            }
            '\r' if self.rest[1..].starts_with('\n') => {
                self.line += 1;
                (Token::Newline, 2)
            }
            '{' => (Token::LeftBrace, 1),
            '}' => (Token::RightBrace, 1),
            '(' => (Token::LeftParen, 1),
            ')' => (Token::RightParen, 1),
            ',' => (Token::Comma, 1),
            '=' => (Token::Equals, 1),
            '%' => (Token::Percent, 1),
            ';' => (Token::Semi, 1),
            '"' | '\'' => match scan_string(self.rest) {
                Ok((raw, rest)) => {
                    let token = Token::Str(raw);
                    self.rest = rest;
                    return Ok(Some((token, line)));
                }
                Err(StringScan::Newline) => {
                    return Err(self.error(ErrorKind::Parse, "newline in string"))
                }
                Err(_) => return Err(self.error(ErrorKind::Parse, "unterminated string")),
            },
            '+' | '-' | '.' | '0'..='9' => return self.numeric_or_plus(line),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let (rest, name) = word(self.rest)
                    .map_err(|_| self.error(ErrorKind::Parse, "unexpected character"))?;
                self.rest = rest;
                let token = reserved_word(name).unwrap_or(Token::Ident(name));
                return Ok(Some((token, line)));
            }
            c => return Err(self.error(ErrorKind::Parse, format!("unexpected character '{c}'"))),
        };
        self.rest = &self.rest[consumed..];
        Ok(Some((token, line)))
    }

    /// Lexes input starting with a sign, digit or period: a number, an
    /// integer, a signed non-finite literal, or the `+` concatenation
    /// operator.
    fn numeric_or_plus(&mut self, line: usize) -> Result<Option<(Token<'t>, usize)>, Error> {
        if let Ok((rest, literal)) = raw_number(self.rest) {
            if literal.chars().any(|c| c.is_ascii_digit()) {
                let value: f64 = literal
                    .parse()
                    .map_err(|_| self.error(ErrorKind::Parse, "malformed number"))?;
                self.rest = rest;
                return Ok(Some((Token::Number(value), line)));
            }
        }
        if let Ok((rest, literal)) = raw_int(self.rest) {
            // Only when not glued to a word: "0x" already consumed any
            // trailing hex letters, and "1abc" is a parse error below.
            let value = int_value(literal).map_err(|kind| self.error(kind, literal))?;
            self.rest = rest;
            return Ok(Some((Token::Int(value), line)));
        }
        // A signed non-finite literal such as "-Infinity" or "+NaN".
        if let Some(sign) = self.rest.chars().next().filter(|c| *c == '+' || *c == '-') {
            if let Ok((rest, name)) = word(&self.rest[1..]) {
                if let Some(Token::Number(value)) = reserved_word(name) {
                    let value = if sign == '-' { -value } else { value };
                    self.rest = rest;
                    return Ok(Some((Token::Number(value), line)));
                }
            }
            if sign == '+' {
                self.rest = &self.rest[1..];
                return Ok(Some((Token::Plus, line)));
            }
        }
        Err(self.error(ErrorKind::Parse, "malformed number"))
    }
}
