//! The reader: recursive descent over the token stream, building the
//! configuration tree.
//!
//! The grammar is line oriented. Statements are terminated by a newline,
//! a `;`, the end of the enclosing section or the end of input:
//!
//! ```text
//! file        := item*
//! item        := NEWLINE
//!              | IDENT '=' value statement_end
//!              | IDENT '{' item* '}' statement_end?
//!              | '%' IDENT '=' value statement_end
//!              | '%' IDENT '{' item* '}' statement_end?
//!              | '%include' '=' string statement_end    (when enabled)
//! value       := scalar | string | list | section
//! string      := STRING ( '+' STRING )*
//! list        := '(' [ value ( ',' value )* ] ')'
//! section     := '{' item* '}'
//! ```
//!
//! Repeated `%key = value` lines coalesce into a single plist child at
//! the position of the first occurrence. `%include = "FILE"` splices the
//! named file into the currently open section; an include stack guards
//! against cycles.

use std::io::Read;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, ErrorKind};
use crate::lexer::{unescape, Lexer, Token};
use crate::pathsearch::{self, PathFlags};
use crate::tree::{is_valid_name, Kind, Node, Value};

/// How `%include` directives locate their files.
#[derive(Default)]
pub enum IncludeMode {
    /// Includes are disabled; `%include` is an ordinary plist key.
    #[default]
    None,
    /// Resolve include names against a search path (see
    /// [`pathsearch::open_from_path`]).
    Path {
        /// The directories to search, in order.
        search: Vec<Utf8PathBuf>,
        /// Splitting and cleansing behavior.
        flags: PathFlags,
    },
    /// Resolve include names through a caller-supplied callback.
    Callback(Box<dyn Fn(&str) -> std::io::Result<Box<dyn Read>>>),
}

/// Options for the reader.
#[derive(Default)]
pub struct ReadOptions {
    /// Populate [`Error::extra`] with contextual text.
    pub verbose_error: bool,
    /// Populate [`Error::file_name`] with the include file in which an
    /// error occurred.
    pub error_file_name: bool,
    /// Whether and how to process `%include` directives.
    pub include: IncludeMode,
}

/// Reads a configuration from a string.
pub fn read_str(text: &str, options: &ReadOptions) -> Result<Node, Error> {
    let mut context = ParseContext {
        options,
        include_stack: Vec::new(),
        file: None,
    };
    read_with_context(text, &mut context)
}

/// Reads a configuration from a stream. The stream is read to completion
/// before parsing.
pub fn read<R: Read>(mut reader: R, options: &ReadOptions) -> Result<Node, Error> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| io_error(e, options))?;
    read_str(&text, options)
}

/// Reads a configuration from a file. The file's name seeds the include
/// stack, so a chain of includes leading back to this file is detected as
/// a recursive include.
pub fn read_path(path: impl AsRef<Utf8Path>, options: &ReadOptions) -> Result<Node, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| io_error(e, options))?;
    let mut context = ParseContext {
        options,
        include_stack: path.file_name().map(str::to_owned).into_iter().collect(),
        file: None,
    };
    read_with_context(&text, &mut context)
}

fn io_error(error: std::io::Error, options: &ReadOptions) -> Error {
    let result = Error::new(ErrorKind::Io, 0);
    if options.verbose_error {
        result.with_extra(error.to_string())
    } else {
        result
    }
}

fn read_with_context(text: &str, context: &mut ParseContext<'_>) -> Result<Node, Error> {
    let mut root = Node::new_section();
    let result = parse_source(&mut root, text, context);
    match result {
        Ok(()) => Ok(root),
        Err(mut error) => {
            // The partially built tree is dropped here.
            if !context.options.verbose_error {
                error.clear_extra();
            }
            Err(error)
        }
    }
}

struct ParseContext<'o> {
    options: &'o ReadOptions,
    include_stack: Vec<String>,
    /// Back-reference shared by all nodes parsed from the current include
    /// file; `None` while parsing the top-level file or buffer.
    file: Option<Arc<str>>,
}

impl ParseContext<'_> {
    fn error(&self, kind: ErrorKind, line: usize, extra: impl Into<String>) -> Error {
        let mut error = Error::new(kind, line).with_extra(extra);
        if self.options.error_file_name {
            if let Some(file) = &self.file {
                error.set_file_name(file.as_ref());
            }
        }
        error
    }
}

/// Parses one source text (the top file or an include file) into the
/// currently open section.
fn parse_source(section: &mut Node, text: &str, context: &mut ParseContext<'_>) -> Result<(), Error> {
    let mut tokens = Tokens::new(text);
    let result = parse_items(section, &mut tokens, context, true);
    result.map_err(|mut error| {
        // Attach the innermost include file once; outer frames leave it.
        if context.options.error_file_name && error.file_name().is_none() {
            if let Some(file) = &context.file {
                error.set_file_name(file.as_ref());
            }
        }
        error
    })
}

/// A one-token lookahead over the lexer.
struct Tokens<'t> {
    lexer: Lexer<'t>,
    peeked: Option<Option<(Token<'t>, usize)>>,
}

impl<'t> Tokens<'t> {
    fn new(text: &'t str) -> Self {
        Tokens {
            lexer: Lexer::new(text),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<Option<(Token<'t>, usize)>, Error> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.unwrap_or(None))
    }

    fn next(&mut self) -> Result<Option<(Token<'t>, usize)>, Error> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn skip_newlines(&mut self) -> Result<(), Error> {
        while let Some((Token::Newline, _)) = self.peek()? {
            self.next()?;
        }
        Ok(())
    }
}

fn parse_items(
    section: &mut Node,
    tokens: &mut Tokens<'_>,
    context: &mut ParseContext<'_>,
    top_level: bool,
) -> Result<(), Error> {
    loop {
        let (token, line) = match tokens.peek()? {
            Some(entry) => entry,
            None => {
                if top_level {
                    return Ok(());
                }
                return Err(context.error(ErrorKind::Parse, 0, "unexpected end of input"));
            }
        };
        match token {
            Token::Newline => {
                tokens.next()?;
            }
            Token::RightBrace if !top_level => {
                tokens.next()?;
                return Ok(());
            }
            Token::Ident(name) => {
                tokens.next()?;
                parse_item(section, name, line, tokens, context)?;
            }
            Token::Percent => {
                tokens.next()?;
                parse_plist_item(section, line, tokens, context)?;
            }
            other => {
                return Err(context.error(
                    ErrorKind::Parse,
                    line,
                    format!("unexpected {}", other.describe()),
                ));
            }
        }
    }
}

fn parse_item(
    section: &mut Node,
    name: &str,
    line: usize,
    tokens: &mut Tokens<'_>,
    context: &mut ParseContext<'_>,
) -> Result<(), Error> {
    check_key(section, name, line, context)?;
    match tokens.next()? {
        Some((Token::Equals, _)) => {
            let mut node = parse_value(tokens, context)?;
            node.name = Some(name.to_owned());
            attach(section, node);
            expect_statement_end(tokens, context)
        }
        Some((Token::LeftBrace, _)) => {
            let mut child = Node::with_value(
                Some(name.to_owned()),
                line,
                context.file.clone(),
                Value::Section(Vec::new()),
            );
            parse_items(&mut child, tokens, context, false)?;
            attach(section, child);
            consume_optional_statement_end(tokens)
        }
        Some((other, other_line)) => Err(context.error(
            ErrorKind::Parse,
            other_line,
            format!("expected '=' or '{{', found {}", other.describe()),
        )),
        None => Err(context.error(ErrorKind::Parse, line, "unexpected end of input")),
    }
}

fn parse_plist_item(
    section: &mut Node,
    line: usize,
    tokens: &mut Tokens<'_>,
    context: &mut ParseContext<'_>,
) -> Result<(), Error> {
    let name = match tokens.next()? {
        Some((Token::Ident(name), _)) => name,
        Some((other, other_line)) => {
            return Err(context.error(
                ErrorKind::Parse,
                other_line,
                format!("expected key name after '%', found {}", other.describe()),
            ));
        }
        None => return Err(context.error(ErrorKind::Parse, line, "unexpected end of input")),
    };

    if name == "include" && !matches!(context.options.include, IncludeMode::None) {
        return parse_include(section, line, tokens, context);
    }

    // The plist accumulates under the name of its first occurrence; a
    // non-plist key of the same name is a duplicate.
    let existing = section
        .children()
        .position(|child| child.name() == Some(name));
    let plist_index = match existing {
        Some(index) => {
            let found = section.children().nth(index).map(Node::kind);
            if found != Some(Kind::Plist) {
                return Err(context.error(ErrorKind::DuplicateKey, line, name));
            }
            index
        }
        None => {
            if !is_valid_name(name) {
                return Err(context.error(
                    ErrorKind::Parse,
                    line,
                    format!("invalid key name '{name}'"),
                ));
            }
            let node = Node::with_value(
                Some(name.to_owned()),
                line,
                context.file.clone(),
                Value::Plist(Vec::new()),
            );
            attach(section, node);
            section.len() - 1
        }
    };

    let element = match tokens.peek()? {
        Some((Token::LeftBrace, brace_line)) => {
            tokens.next()?;
            let mut child = Node::with_value(
                None,
                brace_line,
                context.file.clone(),
                Value::Section(Vec::new()),
            );
            parse_items(&mut child, tokens, context, false)?;
            consume_optional_statement_end(tokens)?;
            child
        }
        Some((Token::Equals, _)) => {
            tokens.next()?;
            let element = parse_value(tokens, context)?;
            expect_statement_end(tokens, context)?;
            element
        }
        Some((other, other_line)) => {
            return Err(context.error(
                ErrorKind::Parse,
                other_line,
                format!("expected '=' or '{{', found {}", other.describe()),
            ));
        }
        None => return Err(context.error(ErrorKind::Parse, line, "unexpected end of input")),
    };
    match &mut section.children_mut_slice()[plist_index].value {
        Value::Plist(children) => children.push(element),
        _ => unreachable!("plist index points at a plist"),
    }
    Ok(())
}

fn parse_include(
    section: &mut Node,
    line: usize,
    tokens: &mut Tokens<'_>,
    context: &mut ParseContext<'_>,
) -> Result<(), Error> {
    match tokens.next()? {
        Some((Token::Equals, _)) => {}
        Some((other, other_line)) => {
            return Err(context.error(
                ErrorKind::Parse,
                other_line,
                format!("expected '=' after '%include', found {}", other.describe()),
            ));
        }
        None => return Err(context.error(ErrorKind::Parse, line, "unexpected end of input")),
    }
    let node = parse_value(tokens, context)?;
    let name = match node.as_str() {
        Some(name) => name.to_owned(),
        None => {
            return Err(context.error(
                ErrorKind::Parse,
                line,
                "'%include' requires a string value",
            ));
        }
    };
    expect_statement_end(tokens, context)?;

    if context.include_stack.iter().any(|entry| *entry == name) {
        return Err(context.error(ErrorKind::RecursiveInclude, line, name));
    }

    let mut reader: Box<dyn Read> = match &context.options.include {
        IncludeMode::Path { search, flags } => {
            match pathsearch::open_from_path(search, &name, *flags) {
                Ok(file) => Box::new(file),
                Err(e) => {
                    return Err(context.error(ErrorKind::Io, line, format!("{name}: {e}")));
                }
            }
        }
        IncludeMode::Callback(open) => match open(&name) {
            Ok(reader) => reader,
            Err(e) => {
                return Err(context.error(ErrorKind::Io, line, format!("{name}: {e}")));
            }
        },
        IncludeMode::None => unreachable!("include parsing is gated on the mode"),
    };
    let mut text = String::new();
    if let Err(e) = reader.read_to_string(&mut text) {
        return Err(context.error(ErrorKind::Io, line, format!("{name}: {e}")));
    }
    drop(reader);

    tracing::debug!(file = %name, "reading include file");
    let previous_file = context.file.replace(Arc::from(name.as_str()));
    context.include_stack.push(name);
    let result = parse_source(section, &text, context);
    context.include_stack.pop();
    context.file = previous_file;
    result
}

fn parse_value(tokens: &mut Tokens<'_>, context: &mut ParseContext<'_>) -> Result<Node, Error> {
    let (token, line) = match tokens.next()? {
        Some(entry) => entry,
        None => return Err(context.error(ErrorKind::Parse, 0, "expected a value")),
    };
    let node = |value| Node::with_value(None, line, context.file.clone(), value);
    match token {
        Token::Bool(value) => Ok(node(Value::Bool(value))),
        Token::Int(value) => Ok(node(Value::Int(value))),
        Token::Number(value) => Ok(node(Value::Number(value))),
        Token::Str(raw) => {
            let mut value = unescape(raw);
            // A '+' joins adjacent strings; at end of line it lets the
            // continuation start on the next line.
            while let Some((Token::Plus, _)) = tokens.peek()? {
                tokens.next()?;
                tokens.skip_newlines()?;
                match tokens.next()? {
                    Some((Token::Str(raw), _)) => value.push_str(&unescape(raw)),
                    Some((other, other_line)) => {
                        return Err(context.error(
                            ErrorKind::Parse,
                            other_line,
                            format!("expected string after '+', found {}", other.describe()),
                        ));
                    }
                    None => {
                        return Err(context.error(ErrorKind::Parse, line, "unexpected end of input"))
                    }
                }
            }
            Ok(node(Value::String(value)))
        }
        Token::LeftParen => {
            let mut list = node(Value::List(Vec::new()));
            tokens.skip_newlines()?;
            if let Some((Token::RightParen, _)) = tokens.peek()? {
                tokens.next()?;
                return Ok(list);
            }
            loop {
                let element = parse_value(tokens, context)?;
                match &mut list.value {
                    Value::List(children) => children.push(element),
                    _ => unreachable!("list node was just created"),
                }
                tokens.skip_newlines()?;
                match tokens.next()? {
                    Some((Token::Comma, _)) => tokens.skip_newlines()?,
                    Some((Token::RightParen, _)) => break,
                    Some((other, other_line)) => {
                        return Err(context.error(
                            ErrorKind::Parse,
                            other_line,
                            format!("expected ',' or ')', found {}", other.describe()),
                        ));
                    }
                    None => {
                        return Err(context.error(ErrorKind::Parse, line, "unexpected end of input"))
                    }
                }
            }
            Ok(list)
        }
        Token::LeftBrace => {
            let mut child = node(Value::Section(Vec::new()));
            parse_items(&mut child, tokens, context, false)?;
            Ok(child)
        }
        other => Err(context.error(
            ErrorKind::Parse,
            line,
            format!("expected a value, found {}", other.describe()),
        )),
    }
}

/// Key names from the lexer already match the identifier shape, but a
/// reserved word in unusual capitalization still lexes as IDENT and must
/// be rejected, and duplicates are parse-time errors.
fn check_key(
    section: &Node,
    name: &str,
    line: usize,
    context: &ParseContext<'_>,
) -> Result<(), Error> {
    if !is_valid_name(name) {
        return Err(context.error(
            ErrorKind::Parse,
            line,
            format!("invalid key name '{name}'"),
        ));
    }
    if section.get(name).is_some() {
        return Err(context.error(ErrorKind::DuplicateKey, line, name));
    }
    Ok(())
}

/// Appends a parser-built child; uniqueness was checked beforehand.
fn attach(section: &mut Node, node: Node) {
    match &mut section.value {
        Value::Section(children) => children.push(node),
        _ => unreachable!("parser only attaches to sections"),
    }
}

fn expect_statement_end(
    tokens: &mut Tokens<'_>,
    context: &mut ParseContext<'_>,
) -> Result<(), Error> {
    match tokens.peek()? {
        None => Ok(()),
        Some((Token::Newline, _)) | Some((Token::Semi, _)) => {
            tokens.next()?;
            Ok(())
        }
        // The enclosing section's brace also ends a statement; it stays
        // for the section parser to consume.
        Some((Token::RightBrace, _)) => Ok(()),
        Some((other, line)) => Err(context.error(
            ErrorKind::Parse,
            line,
            format!("expected end of statement, found {}", other.describe()),
        )),
    }
}

fn consume_optional_statement_end(tokens: &mut Tokens<'_>) -> Result<(), Error> {
    if let Some((Token::Newline | Token::Semi, _)) = tokens.peek()? {
        tokens.next()?;
    }
    Ok(())
}
