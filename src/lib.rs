//! Reading, writing and schema-validating structured configuration
//! files.
//!
//! A configuration is a tree of named keys. Leaves carry booleans,
//! integers, floating point numbers or strings; interior nodes are
//! *sections* (`name { ... }`, a mapping with unique keys), *lists*
//! (`( a, b, c )`, positional and nameless) or *plists* (repeated
//! `%name = value` lines that coalesce into one positional sequence):
//!
//! ```text
//! title = "example"
//! retries = 3
//! ratio = 0.75
//! verbose = yes            # yes/no/true/false are booleans
//! hosts = ( "a", "b" )
//! %route = "10.0.0.0/8"
//! %route = "192.168.0.0/16"
//! server {
//!     port = 443
//! }
//! ```
//!
//! # Reading and writing
//!
//! [`read_str`], [`read`] and [`read_path`] produce a [`Node`] tree;
//! [`write`] and [`write_string`] emit a canonical form that re-parses
//! to an equal tree:
//!
//! ```
//! use treeconf::{read_str, write_string, Node, ReadOptions};
//!
//! let config = read_str("a = 1\nb = \"x\"\n", &ReadOptions::default())?;
//! assert_eq!(config.get("a").and_then(Node::as_int), Some(1));
//! assert_eq!(config.get("b").and_then(Node::as_str), Some("x"));
//!
//! let written = write_string(&config)?;
//! assert_eq!(read_str(&written, &ReadOptions::default())?, config);
//! # Ok::<(), treeconf::Error>(())
//! ```
//!
//! Trees can also be built and reshaped through the API:
//!
//! ```
//! use treeconf::Node;
//!
//! let mut config = Node::new_section();
//! config.set_string("name", "example")?;
//! let server = config.set_section("server")?;
//! server.set_int("port", 443)?;
//! server.set_bool("tls", true)?;
//! assert_eq!(
//!     config.get("server").and_then(|s| s.get("port")).and_then(Node::as_int),
//!     Some(443),
//! );
//! # Ok::<(), treeconf::Error>(())
//! ```
//!
//! Every accessor tolerates absence: lookups return [`Option`], so a
//! chain of `get`/`as_*` calls needs a single check at the end.
//!
//! # Includes
//!
//! With an [`IncludeMode`] configured in [`ReadOptions`], a
//! `%include = "FILE"` line splices the named file into the currently
//! open section. Inclusion cycles are detected and reported as
//! [`ErrorKind::RecursiveInclude`] at the include site.
//!
//! # Schemas
//!
//! A schema, itself written in the configuration language, declares
//! which keys may appear, their types, and constraints over their
//! values. See the [`schema`] module for the full description.
//!
//! ```
//! use treeconf::{read_schema_str, read_str, ErrorKind, ReadOptions, ValidateOptions};
//!
//! let schema = read_schema_str(
//!     "allowed-keys {
//!         retries { type = \"int\"; %constraint = \"% >= 0\" }
//!         host { type = \"string\" }
//!     }",
//!     &ReadOptions::default(),
//! )?;
//!
//! let good = read_str("retries = 2\nhost = \"a\"\n", &ReadOptions::default())?;
//! assert!(schema.validate(&good, &ValidateOptions::default()).is_ok());
//!
//! let bad = read_str("retries = -1\n", &ReadOptions::default())?;
//! let error = schema.validate(&bad, &ValidateOptions::default()).unwrap_err();
//! assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
//! # Ok::<(), treeconf::Error>(())
//! ```
#![warn(missing_docs)]

mod error;
mod lexer;
mod parser;
mod tree;
mod writer;

pub mod pathsearch;
pub mod schema;
pub mod write_file;

pub use error::{Error, ErrorKind};
pub use parser::{read, read_path, read_str, IncludeMode, ReadOptions};
pub use schema::{read_schema, read_schema_str, Schema, ValidateOptions};
pub use tree::{is_valid_name, Kind, Node};
pub use write_file::WriteFile;
pub use writer::{write, write_string};
