//! The schema engine: loading schemas, compiling their constraints, and
//! validating configurations against them.
//!
//! A schema is itself written in the configuration language. It declares
//! the permissible shape of a configuration through four keys, nested to
//! any depth:
//!
//! | Key            | Meaning
//! |----------------|------------------------------------------------------
//! | `allowed-keys` | A section naming each permitted child and its schema
//! | `item-type`    | The type required of children not matched by name
//! | `type`         | The declared type of a key (inside `allowed-keys`)
//! | `constraint`   | A list or plist of constraint expressions
//!
//! Types are the basic names `bool`, `int`, `number`, `string`,
//! `section`, `list` (which accepts lists and plists) and the pseudo-type
//! `any`, or user-defined names declared in a top-level `types` section.
//! A user-defined type resolves transitively until a basic type is named,
//! and the resolved declaration's own `allowed-keys`, `item-type` and
//! `constraint` entries govern nested validation.
//!
//! Loading a schema validates it against a compiled-in meta-schema,
//! rejects recursive type definitions, and compiles every constraint
//! string into an expression tree. Validation walks the subject and
//! schema together and reports the first violation, with the offending
//! subject node's line number.
//!
//! ```
//! use treeconf::{read_str, read_schema_str, ReadOptions, ValidateOptions};
//!
//! let schema = read_schema_str(
//!     "allowed-keys {\n\tport { type = \"int\"; %constraint = \"% > 0\" }\n}\n",
//!     &ReadOptions::default(),
//! )?;
//! let config = read_str("port = 443\n", &ReadOptions::default())?;
//! schema.validate(&config, &ValidateOptions::default())?;
//! # Ok::<(), treeconf::Error>(())
//! ```

use std::io::Read;

use crate::error::{Error, ErrorKind};
use crate::parser::{read_str, ReadOptions};
use crate::tree::{Kind, Node, Value};

mod expr;

pub(crate) use expr::Constraint;

/// The compiled-in schema describing the shape of schema files.
const META_SCHEMA: &str = include_str!("schema/meta.cfg");

/// Options for [`Schema::validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Populate [`Error::extra`] with the offending key name or the
    /// violated constraint's label.
    pub verbose_error: bool,
    /// Populate [`Error::file_name`] with the include file the offending
    /// subject node came from.
    pub error_file_name: bool,
}

/// A loaded schema: meta-validated, loop-checked, and with every
/// constraint compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    root: Node,
}

/// Reads and compiles a schema from a string.
pub fn read_schema_str(text: &str, options: &ReadOptions) -> Result<Schema, Error> {
    build_schema(read_str(text, options)?, options)
}

/// Reads and compiles a schema from a stream.
pub fn read_schema<R: Read>(reader: R, options: &ReadOptions) -> Result<Schema, Error> {
    build_schema(crate::parser::read(reader, options)?, options)
}

/// The basic types a declaration can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BasicType {
    Bool,
    Int,
    Number,
    Str,
    Section,
    List,
    Any,
}

pub(crate) fn basic_type(name: &str) -> Option<BasicType> {
    match name {
        "bool" => Some(BasicType::Bool),
        "int" => Some(BasicType::Int),
        "number" => Some(BasicType::Number),
        "string" => Some(BasicType::Str),
        "section" => Some(BasicType::Section),
        "list" => Some(BasicType::List),
        "any" => Some(BasicType::Any),
        _ => None,
    }
}

/// Resolves a type name to a basic type, walking user definitions in
/// `types`. For a user-defined type the declaration that finally names a
/// basic type is returned as well; its fields govern nested validation.
/// Definition chains are acyclic by the time this runs.
pub(crate) fn resolve_type<'a>(
    name: &str,
    types: Option<&'a Node>,
) -> Option<(BasicType, Option<&'a Node>)> {
    if let Some(basic) = basic_type(name) {
        return Some((basic, None));
    }
    let types = types?;
    let mut current = name;
    loop {
        let decl = types.get(current)?;
        let referred = decl.get("type").and_then(Node::as_str)?;
        if let Some(basic) = basic_type(referred) {
            return Some((basic, Some(decl)));
        }
        current = referred;
    }
}

fn retag_as_schema(config: Node) -> Schema {
    let Node {
        name,
        line,
        file,
        value,
    } = config;
    let children = match value {
        Value::Section(children) => children,
        _ => unreachable!("parsed roots are sections"),
    };
    Schema {
        root: Node::with_value(name, line, file, Value::Schema(children)),
    }
}

/// The meta-schema, parsed and compiled fresh for each schema load so
/// the library holds no global state.
fn meta_schema() -> Schema {
    let options = ReadOptions::default();
    let mut config = read_str(META_SCHEMA, &options).expect("meta-schema parses");
    let types = config.get("types").cloned();
    compile_constraints(&mut config, types.as_ref(), &options)
        .expect("meta-schema constraints compile");
    retag_as_schema(config)
}

fn build_schema(config: Node, options: &ReadOptions) -> Result<Schema, Error> {
    meta_schema().validate(
        &config,
        &ValidateOptions {
            verbose_error: options.verbose_error,
            error_file_name: options.error_file_name,
        },
    )?;
    check_recursive_types(&config, options)?;
    let types = config.get("types").cloned();
    let mut config = config;
    compile_constraints(&mut config, types.as_ref(), options)?;
    tracing::debug!("schema loaded");
    Ok(retag_as_schema(config))
}

/// Rejects `types` entries that transitively name themselves without an
/// intervening basic type.
fn check_recursive_types(config: &Node, options: &ReadOptions) -> Result<(), Error> {
    let Some(types) = config.get("types") else {
        return Ok(());
    };
    for decl in types.children() {
        let mut chain: Vec<&str> = decl.name().into_iter().collect();
        let mut current = decl;
        loop {
            let Some(referred) = current.get("type").and_then(Node::as_str) else {
                break;
            };
            if basic_type(referred).is_some() {
                break;
            }
            if chain.contains(&referred) {
                let mut error = Error::new(ErrorKind::RecursiveType, decl.line());
                if options.verbose_error {
                    if let Some(first) = decl.get("type").and_then(Node::as_str) {
                        error = error.with_extra(first);
                    }
                }
                if options.error_file_name {
                    if let Some(file) = decl.file_name() {
                        error.set_file_name(file);
                    }
                }
                return Err(error);
            }
            chain.push(referred);
            match types.get(referred) {
                Some(next) => current = next,
                None => break,
            }
        }
    }
    Ok(())
}

fn invalid_constraint(item: &Node, text: &str, options: &ReadOptions) -> Error {
    let mut error = Error::new(ErrorKind::InvalidConstraint, item.line());
    if options.verbose_error {
        error = error.with_extra(text);
    }
    if options.error_file_name {
        if let Some(file) = item.file_name() {
            error.set_file_name(file);
        }
    }
    error
}

/// Compiles every `constraint` string of `node` in place and recurses
/// through its section children, so constraints at every nesting level
/// become [`Kind::Expression`] nodes.
fn compile_constraints(
    node: &mut Node,
    types: Option<&Node>,
    options: &ReadOptions,
) -> Result<(), Error> {
    let mut compiled: Vec<(usize, Constraint)> = Vec::new();
    if let Some(list) = node.get("constraint") {
        for (index, item) in list.children().enumerate() {
            let Some(text) = item.as_str() else {
                continue;
            };
            let constraint = expr::parse(text)
                .map_err(|_| invalid_constraint(item, text, options))?;
            let context = expr::TypeContext { decl: node, types };
            if !expr::well_typed(&constraint.expr, &context) {
                return Err(invalid_constraint(item, text, options));
            }
            compiled.push((index, constraint));
        }
    }
    if !compiled.is_empty() {
        if let Some(list) = node.get_mut("constraint") {
            let elements = list.children_mut_slice();
            for (index, constraint) in compiled {
                elements[index].value = Value::Expression(constraint);
            }
        }
    }
    for child in node.children_mut_slice().iter_mut() {
        if child.kind() == Kind::Section {
            compile_constraints(child, types, options)?;
        }
    }
    Ok(())
}

struct Context<'a> {
    root: &'a Node,
    types: Option<&'a Node>,
    options: &'a ValidateOptions,
}

impl Context<'_> {
    fn error(&self, kind: ErrorKind, subject: &Node, extra: Option<&str>) -> Error {
        let mut error = Error::new(kind, subject.line());
        if self.options.verbose_error {
            if let Some(extra) = extra {
                error = error.with_extra(extra);
            }
        }
        if self.options.error_file_name {
            if let Some(file) = subject.file_name() {
                error.set_file_name(file);
            }
        }
        error
    }
}

impl Schema {
    /// Validates `config` against this schema, reporting the first
    /// violation.
    pub fn validate(&self, config: &Node, options: &ValidateOptions) -> Result<(), Error> {
        let context = Context {
            root: config,
            types: self.root.get("types"),
            options,
        };
        validate_aggregate(config, Some(&self.root), &context)
    }
}

fn kind_matches(subject: &Node, basic: BasicType) -> bool {
    match basic {
        BasicType::Any => true,
        BasicType::Bool => subject.kind() == Kind::Bool,
        BasicType::Int => subject.kind() == Kind::Int,
        BasicType::Number => subject.kind() == Kind::Number,
        BasicType::Str => subject.kind() == Kind::String,
        BasicType::Section => subject.kind() == Kind::Section,
        BasicType::List => subject.is_list(),
    }
}

fn validate_key(
    subject: &Node,
    resolved: Option<BasicType>,
    schema_part: Option<&Node>,
    context: &Context<'_>,
) -> Result<(), Error> {
    let matched = resolved.is_some_and(|basic| kind_matches(subject, basic));
    if !matched {
        return Err(context.error(ErrorKind::InvalidKeyType, subject, subject.name()));
    }
    match resolved {
        Some(BasicType::Section) => validate_aggregate(subject, schema_part, context),
        Some(BasicType::List)
            if schema_part.is_some_and(|part| part.get("item-type").is_some()) =>
        {
            validate_aggregate(subject, schema_part, context)
        }
        _ => validate_constraints(subject, schema_part, context),
    }
}

fn validate_aggregate(
    subject: &Node,
    schema_part: Option<&Node>,
    context: &Context<'_>,
) -> Result<(), Error> {
    let allowed = schema_part.and_then(|part| part.get("allowed-keys"));
    let item_type = schema_part
        .and_then(|part| part.get("item-type"))
        .and_then(Node::as_str);
    if allowed.is_some() || item_type.is_some() {
        for child in subject.children() {
            let declared = allowed.and_then(|keys| child.name().and_then(|name| keys.get(name)));
            if let Some(decl) = declared {
                let type_name = decl.get("type").and_then(Node::as_str).unwrap_or("");
                let (resolved, final_decl) = match resolve_type(type_name, context.types) {
                    Some((basic, resolved_decl)) => (Some(basic), resolved_decl),
                    None => (None, None),
                };
                validate_key(child, resolved, Some(final_decl.unwrap_or(decl)), context)?;
            } else if let Some(item) = item_type {
                let (resolved, final_decl) = match resolve_type(item, context.types) {
                    Some((basic, resolved_decl)) => (Some(basic), resolved_decl),
                    None => (None, None),
                };
                validate_key(child, resolved, final_decl, context)?;
            } else {
                return Err(context.error(ErrorKind::InvalidKey, child, child.name()));
            }
        }
    }
    validate_constraints(subject, schema_part, context)
}

fn validate_constraints(
    subject: &Node,
    schema_part: Option<&Node>,
    context: &Context<'_>,
) -> Result<(), Error> {
    let Some(part) = schema_part else {
        return Ok(());
    };
    let Some(list) = part.get("constraint") else {
        return Ok(());
    };
    for item in list.children() {
        if let Value::Expression(constraint) = &item.value {
            if !expr::evaluate(&constraint.expr, subject, context.root) {
                tracing::debug!(constraint = %constraint.display, line = subject.line(), "constraint violated");
                return Err(context.error(
                    ErrorKind::ConstraintViolation,
                    subject,
                    Some(&constraint.display),
                ));
            }
        }
    }
    Ok(())
}
