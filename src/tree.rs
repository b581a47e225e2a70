//! The in-memory configuration tree.
//!
//! A configuration is a [`Node`] whose kind is [`Kind::Section`]: an
//! insertion-ordered mapping from unique key names to values. Values are
//! booleans, integers, floating point numbers, strings, lists, plists or
//! nested sections. Every node remembers the 1-based source line it was
//! parsed from (0 for nodes built through this API) and, for nodes read
//! from an include file, the name of that file.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{Error, ErrorKind};
use crate::schema::Constraint;

/// Names that can never be used as key names, compared case-insensitively.
const RESERVED_NAMES: [&str; 7] = ["yes", "no", "true", "false", "nan", "inf", "infinity"];

static KEY_NAME: OnceLock<Regex> = OnceLock::new();

/// Returns true when `name` is usable as a key name: it matches
/// `[A-Za-z_][A-Za-z0-9_-]*` and is not a reserved word.
pub fn is_valid_name(name: &str) -> bool {
    let pattern = KEY_NAME.get_or_init(|| {
        Regex::new("^[A-Za-z_][A-Za-z0-9_-]*$").expect("key name pattern compiles")
    });
    pattern.is_match(name) && !RESERVED_NAMES.iter().any(|r| name.eq_ignore_ascii_case(r))
}

/// The kind of value a [`Node`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// An empty node, left behind by [`Node::take_string`].
    None,
    /// A boolean.
    Bool,
    /// A signed 64-bit integer.
    Int,
    /// A string. Strings never contain newline characters.
    String,
    /// An IEEE-754 double. Non-finite values are permitted.
    Number,
    /// A positional sequence of nameless values, written `( a, b )`.
    List,
    /// A mapping from unique key names to values, written `name { ... }`.
    Section,
    /// A positional sequence written as repeated `%name = value` lines.
    Plist,
    /// A section that has been loaded and verified as a schema.
    Schema,
    /// A compiled constraint expression inside a loaded schema.
    Expression,
}

/// A node payload. Kept crate-private so trees can only be built through
/// the validating API.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Number(f64),
    String(String),
    List(Vec<Node>),
    Section(Vec<Node>),
    Plist(Vec<Node>),
    Schema(Vec<Node>),
    Expression(Constraint),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bit equality: NaN payloads compare equal to themselves and
            // the sign of zero is significant.
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Section(a), Value::Section(b)) => a == b,
            (Value::Plist(a), Value::Plist(b)) => a == b,
            (Value::Schema(a), Value::Schema(b)) => a == b,
            (Value::Expression(a), Value::Expression(b)) => a == b,
            _ => false,
        }
    }
}

/// A configuration node: an optional key name, a payload, and the source
/// position it came from.
///
/// Equality compares names, kinds and payloads in insertion order; source
/// positions and file back-references are ignored, so a tree compares
/// equal to its written-and-reparsed self.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: Option<String>,
    pub(crate) line: usize,
    pub(crate) file: Option<Arc<str>>,
    pub(crate) value: Value,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Node {
    /// Creates an empty root section.
    pub fn new_section() -> Node {
        Node::with_value(None, 0, None, Value::Section(Vec::new()))
    }

    pub(crate) fn with_value(
        name: Option<String>,
        line: usize,
        file: Option<Arc<str>>,
        value: Value,
    ) -> Node {
        Node {
            name,
            line,
            file,
            value,
        }
    }

    /// The kind of value this node carries.
    pub fn kind(&self) -> Kind {
        match self.value {
            Value::None => Kind::None,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::List(_) => Kind::List,
            Value::Section(_) => Kind::Section,
            Value::Plist(_) => Kind::Plist,
            Value::Schema(_) => Kind::Schema,
            Value::Expression(_) => Kind::Expression,
        }
    }

    /// True for [`Kind::List`] and [`Kind::Plist`] nodes.
    pub fn is_list(&self) -> bool {
        matches!(self.value, Value::List(_) | Value::Plist(_))
    }

    /// The key name, when this node is the child of a section.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The 1-based line this node was parsed from, or 0 for nodes built
    /// through the API.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The include file this node was parsed from. Absent for nodes from
    /// the top-level file or buffer and for nodes built through the API.
    pub fn file_name(&self) -> Option<&str> {
        self.file.as_deref()
    }

    fn container(&self) -> Option<&Vec<Node>> {
        match &self.value {
            Value::List(children)
            | Value::Section(children)
            | Value::Plist(children)
            | Value::Schema(children) => Some(children),
            _ => None,
        }
    }

    fn container_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.value {
            Value::List(children)
            | Value::Section(children)
            | Value::Plist(children)
            | Value::Schema(children) => Some(children),
            _ => None,
        }
    }

    /// Looks up a child by name. Yields nothing for lists and plists,
    /// whose children are nameless.
    pub fn get(&self, name: &str) -> Option<&Node> {
        match self.value {
            Value::Section(_) | Value::Schema(_) => self
                .children()
                .find(|child| child.name.as_deref() == Some(name)),
            _ => None,
        }
    }

    /// Mutable variant of [`Node::get`].
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        if !matches!(self.value, Value::Section(_) | Value::Schema(_)) {
            return None;
        }
        self.children_mut_slice()
            .iter_mut()
            .find(|child| child.name.as_deref() == Some(name))
    }

    /// Iterates over the children of a section, list or plist in
    /// insertion order. Empty for scalar nodes.
    pub fn children(&self) -> std::slice::Iter<'_, Node> {
        match self.container() {
            Some(children) => children.iter(),
            None => [].iter(),
        }
    }

    pub(crate) fn children_mut_slice(&mut self) -> &mut [Node] {
        match self.container_mut() {
            Some(children) => children.as_mut_slice(),
            None => &mut [],
        }
    }

    /// The number of children, or 0 for scalar nodes.
    pub fn len(&self) -> usize {
        self.container().map(Vec::len).unwrap_or(0)
    }

    /// True when this node has no children. Scalars are "empty" too.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the first child matching the predicate. Resume a search
    /// after a known child with `children().skip(..)`.
    pub fn find<P>(&self, mut predicate: P) -> Option<&Node>
    where
        P: FnMut(&Node) -> bool,
    {
        self.children().find(|child| predicate(child))
    }

    /// The boolean payload, when this is a [`Kind::Bool`] node.
    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(value) => Some(value),
            _ => None,
        }
    }

    /// The integer payload, when this is a [`Kind::Int`] node.
    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    /// The floating point payload, when this is a [`Kind::Number`] node.
    pub fn as_number(&self) -> Option<f64> {
        match self.value {
            Value::Number(value) => Some(value),
            _ => None,
        }
    }

    /// The string payload, when this is a [`Kind::String`] node.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Moves the string payload out, leaving a [`Kind::None`] node.
    pub fn take_string(&mut self) -> Option<String> {
        match &self.value {
            Value::String(_) => match std::mem::replace(&mut self.value, Value::None) {
                Value::String(value) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Adds `value` under `name`, replacing an existing child of that
    /// name in place. Fails with [`ErrorKind::BadArg`] when this node is
    /// not a section or the name is invalid.
    fn set_value(&mut self, name: &str, value: Value) -> Result<&mut Node, Error> {
        if !is_valid_name(name) {
            return Err(ErrorKind::BadArg.into());
        }
        let children = match &mut self.value {
            Value::Section(children) => children,
            _ => return Err(ErrorKind::BadArg.into()),
        };
        let index = match children
            .iter()
            .position(|child| child.name.as_deref() == Some(name))
        {
            Some(index) => {
                children[index].value = value;
                index
            }
            None => {
                children.push(Node::with_value(Some(name.to_owned()), 0, None, value));
                children.len() - 1
            }
        };
        Ok(&mut children[index])
    }

    /// Appends `value` to a list or plist. Fails with
    /// [`ErrorKind::BadArg`] when this node is not a list or plist.
    fn push_value(&mut self, value: Value) -> Result<&mut Node, Error> {
        let children = match &mut self.value {
            Value::List(children) | Value::Plist(children) => children,
            _ => return Err(ErrorKind::BadArg.into()),
        };
        children.push(Node::with_value(None, 0, None, value));
        let index = children.len() - 1;
        Ok(&mut children[index])
    }

    /// Sets a boolean under `name`, replacing any existing child.
    pub fn set_bool(&mut self, name: &str, value: bool) -> Result<(), Error> {
        self.set_value(name, Value::Bool(value)).map(|_| ())
    }

    /// Sets an integer under `name`, replacing any existing child.
    pub fn set_int(&mut self, name: &str, value: i64) -> Result<(), Error> {
        self.set_value(name, Value::Int(value)).map(|_| ())
    }

    /// Sets a floating point number under `name`, replacing any existing
    /// child.
    pub fn set_number(&mut self, name: &str, value: f64) -> Result<(), Error> {
        self.set_value(name, Value::Number(value)).map(|_| ())
    }

    /// Sets a string under `name`, replacing any existing child. The
    /// string must not contain a newline.
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> Result<(), Error> {
        let value = value.into();
        if value.contains('\n') {
            return Err(ErrorKind::BadArg.into());
        }
        self.set_value(name, Value::String(value)).map(|_| ())
    }

    /// Adds an empty section under `name` and returns it for population.
    pub fn set_section(&mut self, name: &str) -> Result<&mut Node, Error> {
        self.set_value(name, Value::Section(Vec::new()))
    }

    /// Adds an empty list under `name` and returns it for population.
    pub fn set_list(&mut self, name: &str) -> Result<&mut Node, Error> {
        self.set_value(name, Value::List(Vec::new()))
    }

    /// Adds an empty plist under `name` and returns it for population.
    pub fn set_plist(&mut self, name: &str) -> Result<&mut Node, Error> {
        self.set_value(name, Value::Plist(Vec::new()))
    }

    /// Re-parents an existing node under `name`, replacing any existing
    /// child of that name. The primary use is re-inserting subtrees
    /// obtained from [`Node::remove`].
    pub fn set_node(&mut self, name: &str, mut node: Node) -> Result<(), Error> {
        if !is_valid_name(name) {
            return Err(ErrorKind::BadArg.into());
        }
        let children = match &mut self.value {
            Value::Section(children) => children,
            _ => return Err(ErrorKind::BadArg.into()),
        };
        node.name = Some(name.to_owned());
        match children
            .iter()
            .position(|child| child.name.as_deref() == Some(name))
        {
            Some(index) => children[index] = node,
            None => children.push(node),
        }
        Ok(())
    }

    /// Appends a boolean to a list or plist.
    pub fn push_bool(&mut self, value: bool) -> Result<(), Error> {
        self.push_value(Value::Bool(value)).map(|_| ())
    }

    /// Appends an integer to a list or plist.
    pub fn push_int(&mut self, value: i64) -> Result<(), Error> {
        self.push_value(Value::Int(value)).map(|_| ())
    }

    /// Appends a floating point number to a list or plist.
    pub fn push_number(&mut self, value: f64) -> Result<(), Error> {
        self.push_value(Value::Number(value)).map(|_| ())
    }

    /// Appends a string to a list or plist. The string must not contain a
    /// newline.
    pub fn push_string(&mut self, value: impl Into<String>) -> Result<(), Error> {
        let value = value.into();
        if value.contains('\n') {
            return Err(ErrorKind::BadArg.into());
        }
        self.push_value(Value::String(value)).map(|_| ())
    }

    /// Appends an empty section to a list or plist and returns it.
    pub fn push_section(&mut self) -> Result<&mut Node, Error> {
        self.push_value(Value::Section(Vec::new()))
    }

    /// Appends an empty list to a list or plist and returns it.
    pub fn push_list(&mut self) -> Result<&mut Node, Error> {
        self.push_value(Value::List(Vec::new()))
    }

    /// Appends an existing node to a list or plist, stripping its name.
    pub fn push_node(&mut self, mut node: Node) -> Result<(), Error> {
        let children = match &mut self.value {
            Value::List(children) | Value::Plist(children) => children,
            _ => return Err(ErrorKind::BadArg.into()),
        };
        node.name = None;
        children.push(node);
        Ok(())
    }

    /// Removes and returns the named child of a section.
    pub fn remove(&mut self, name: &str) -> Option<Node> {
        let children = match &mut self.value {
            Value::Section(children) => children,
            _ => return None,
        };
        let index = children
            .iter()
            .position(|child| child.name.as_deref() == Some(name))?;
        Some(children.remove(index))
    }

    /// Removes and returns the child at `index` of any container node.
    pub fn remove_at(&mut self, index: usize) -> Option<Node> {
        let children = self.container_mut()?;
        if index < children.len() {
            Some(children.remove(index))
        } else {
            None
        }
    }

    /// Switches a node between [`Kind::List`] and [`Kind::Plist`] without
    /// touching its children.
    pub fn set_list_kind(&mut self, kind: Kind) -> Result<(), Error> {
        let children = match &mut self.value {
            Value::List(children) | Value::Plist(children) => std::mem::take(children),
            _ => return Err(ErrorKind::BadArg.into()),
        };
        match kind {
            Kind::List => self.value = Value::List(children),
            Kind::Plist => self.value = Value::Plist(children),
            _ => {
                // Restore before reporting: the children were moved out.
                self.value = Value::List(children);
                return Err(ErrorKind::BadArg.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert!(is_valid_name("plain"));
        assert!(is_valid_name("_under"));
        assert!(is_valid_name("with-dash_and_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("2start"));
        assert!(!is_valid_name("-start"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("true"));
        assert!(!is_valid_name("Yes"));
        assert!(!is_valid_name("INFINITY"));
        assert!(!is_valid_name("NaN"));
    }

    #[test]
    fn set_and_get() {
        let mut root = Node::new_section();
        root.set_int("a", 1).unwrap();
        root.set_string("b", "x").unwrap();
        assert_eq!(root.get("a").and_then(Node::as_int), Some(1));
        assert_eq!(root.get("b").and_then(Node::as_str), Some("x"));
        assert_eq!(root.get("a").and_then(Node::as_str), None);
        assert!(root.get("missing").is_none());
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn replace_keeps_position() {
        let mut root = Node::new_section();
        root.set_int("a", 1).unwrap();
        root.set_int("b", 2).unwrap();
        root.set_int("c", 3).unwrap();
        root.set_string("b", "replaced").unwrap();
        let names: Vec<_> = root.children().filter_map(Node::name).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(root.get("b").and_then(Node::as_str), Some("replaced"));
    }

    #[test]
    fn invalid_names_rejected() {
        let mut root = Node::new_section();
        assert_eq!(
            root.set_int("yes", 1).unwrap_err().kind(),
            ErrorKind::BadArg
        );
        assert_eq!(
            root.set_int("1bad", 1).unwrap_err().kind(),
            ErrorKind::BadArg
        );
    }

    #[test]
    fn newline_in_string_rejected() {
        let mut root = Node::new_section();
        assert_eq!(
            root.set_string("a", "one\ntwo").unwrap_err().kind(),
            ErrorKind::BadArg
        );
    }

    #[test]
    fn named_values_only_in_sections() {
        let mut root = Node::new_section();
        let list = root.set_list("l").unwrap();
        assert_eq!(list.set_int("a", 1).unwrap_err().kind(), ErrorKind::BadArg);
        list.push_int(1).unwrap();
        list.push_int(2).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.get("a").is_none());
        assert_eq!(root.push_int(3).unwrap_err().kind(), ErrorKind::BadArg);
    }

    #[test]
    fn remove_and_reinsert() {
        let mut root = Node::new_section();
        root.set_int("a", 1).unwrap();
        root.set_section("s").unwrap().set_int("inner", 2).unwrap();
        let section = root.remove("s").unwrap();
        assert!(root.get("s").is_none());
        root.set_node("renamed", section).unwrap();
        assert_eq!(
            root.get("renamed")
                .and_then(|s| s.get("inner"))
                .and_then(Node::as_int),
            Some(2)
        );
    }

    #[test]
    fn remove_at_by_position() {
        let mut root = Node::new_section();
        let list = root.set_list("l").unwrap();
        list.push_int(1).unwrap();
        list.push_int(2).unwrap();
        list.push_int(3).unwrap();
        let removed = list.remove_at(1).unwrap();
        assert_eq!(removed.as_int(), Some(2));
        let remaining: Vec<_> = list.children().filter_map(Node::as_int).collect();
        assert_eq!(remaining, [1, 3]);
        assert!(list.remove_at(5).is_none());
    }

    #[test]
    fn take_string_retags() {
        let mut root = Node::new_section();
        root.set_string("s", "payload").unwrap();
        let node = root.get_mut("s").unwrap();
        assert_eq!(node.take_string().as_deref(), Some("payload"));
        assert_eq!(node.kind(), Kind::None);
        assert!(node.take_string().is_none());
    }

    #[test]
    fn list_kind_switch() {
        let mut root = Node::new_section();
        let list = root.set_list("l").unwrap();
        list.push_int(1).unwrap();
        list.set_list_kind(Kind::Plist).unwrap();
        assert_eq!(list.kind(), Kind::Plist);
        assert_eq!(list.len(), 1);
        assert_eq!(
            list.set_list_kind(Kind::Section).unwrap_err().kind(),
            ErrorKind::BadArg
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn find_matches_in_order() {
        let mut root = Node::new_section();
        root.set_int("a", 1).unwrap();
        root.set_int("b", 2).unwrap();
        root.set_int("c", 2).unwrap();
        let found = root.find(|n| n.as_int() == Some(2)).unwrap();
        assert_eq!(found.name(), Some("b"));
        // Resume after the first match.
        let after = root
            .children()
            .skip_while(|n| n.name() != Some("b"))
            .skip(1)
            .find(|n| n.as_int() == Some(2))
            .unwrap();
        assert_eq!(after.name(), Some("c"));
    }

    #[test]
    fn equality_ignores_lines_and_compares_bits() {
        let mut a = Node::new_section();
        a.set_number("n", f64::NAN).unwrap();
        let mut b = Node::new_section();
        b.set_number("n", f64::NAN).unwrap();
        assert_eq!(a, b);
        let mut c = Node::new_section();
        c.set_number("n", -0.0).unwrap();
        let mut d = Node::new_section();
        d.set_number("n", 0.0).unwrap();
        assert_ne!(c, d);
    }
}
