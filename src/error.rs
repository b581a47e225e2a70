//! The error record shared by the reader, writer and schema engine.

use std::fmt::{self, Display};

/// Classifies everything that can go wrong while reading, writing or
/// validating a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A value of the wrong kind, an invalid key name, or a string
    /// containing a newline was passed to the tree API.
    #[error("bad argument")]
    BadArg,
    /// The underlying stream failed.
    #[error("input/output error")]
    Io,
    /// An unexpected token or malformed construct in the input.
    #[error("parse error")]
    Parse,
    /// A second child with an existing name in a section.
    #[error("duplicate key")]
    DuplicateKey,
    /// An integer literal does not fit the integer payload.
    #[error("value out of range")]
    OutOfRange,
    /// The subject has a key the schema does not permit.
    #[error("key is not allowed here")]
    InvalidKey,
    /// A subject key's kind does not match the schema's declared type.
    #[error("key has invalid type")]
    InvalidKeyType,
    /// A schema constraint evaluated to false.
    #[error("schema constraint violated")]
    ConstraintViolation,
    /// A constraint failed to parse or type-check while loading a schema.
    #[error("invalid constraint")]
    InvalidConstraint,
    /// A `types` definition refers to itself, directly or indirectly.
    #[error("recursive type definition")]
    RecursiveType,
    /// An included file includes itself, directly or indirectly.
    #[error("recursive include")]
    RecursiveInclude,
}

/// An error with its position in the input.
///
/// `line` is 1-based and 0 when no position applies (for example a misuse
/// of the tree API). `extra` carries contextual text (a key name, a
/// constraint label, a type name) and is only populated when the caller
/// asked for verbose errors; `file_name` names the include file in which
/// the error occurred and is only populated on request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    line: usize,
    extra: Option<String>,
    file_name: Option<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, line: usize) -> Self {
        Error {
            kind,
            line,
            extra: None,
            file_name: None,
        }
    }

    pub(crate) fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub(crate) fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = Some(file_name.into());
    }

    pub(crate) fn clear_extra(&mut self) {
        self.extra = None;
    }

    /// What went wrong.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The 1-based line on which the error occurred, or 0 when no
    /// position applies.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Contextual detail, when verbose errors were requested.
    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    /// The include file in which the error occurred, when requested.
    /// Absent for errors in the top-level file or buffer.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file_name {
            write!(f, "{file}:")?;
        }
        if self.line != 0 {
            write!(f, "{}: ", self.line)?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(extra) = &self.extra {
            write!(f, ": {extra}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind, 0)
    }
}
