//! The writer: emits the canonical textual form of a configuration tree.
//!
//! The output re-parses to a tree equal to the original. Sections indent
//! with one tab per nesting level, lists print inline, plists print one
//! `%name = value` line per element, and strings are quoted with
//! whichever quote character occurs less often in the value.

use std::io::Write;

use crate::error::{Error, ErrorKind};
use crate::tree::{Node, Value};

/// Writes the canonical form of `config` to `writer`. The root must be a
/// section.
pub fn write<W: Write>(config: &Node, writer: &mut W) -> Result<(), Error> {
    let children = match &config.value {
        Value::Section(children) => children,
        _ => return Err(ErrorKind::BadArg.into()),
    };
    write_section(children, writer, 0).map_err(|e| Error::new(ErrorKind::Io, 0).with_extra(e.to_string()))
}

/// Writes the canonical form of `config` to a new string.
pub fn write_string(config: &Node) -> Result<String, Error> {
    let mut buffer = Vec::new();
    write(config, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| ErrorKind::Io.into())
}

fn write_indent<W: Write>(writer: &mut W, indent: usize) -> std::io::Result<()> {
    for _ in 0..indent {
        writer.write_all(b"\t")?;
    }
    Ok(())
}

/// Formats a double the way the reader expects it back: 18 significant
/// digits, fixed tokens for non-finite values, and always a decimal
/// point. NaN is normalized because platform formatting of it varies.
fn format_number(value: f64) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() {
            "-NaN".to_owned()
        } else {
            "NaN".to_owned()
        };
    }
    if value.is_infinite() {
        return if value < 0.0 {
            "-Infinity".to_owned()
        } else {
            "Infinity".to_owned()
        };
    }
    let scientific = format!("{value:.17e}");
    let split = scientific.find('e').unwrap_or(scientific.len() - 1);
    let exponent: i32 = scientific[split + 1..].parse().unwrap_or(0);
    if !(-4..18).contains(&exponent) {
        let mut mantissa = scientific[..split].to_owned();
        strip_trailing_zeros(&mut mantissa);
        if !mantissa.contains('.') {
            mantissa.push_str(".0");
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        let decimals = (17 - exponent).max(0) as usize;
        let mut fixed = format!("{value:.decimals$}");
        strip_trailing_zeros(&mut fixed);
        if !fixed.contains('.') {
            fixed.push_str(".0");
        }
        fixed
    }
}

fn strip_trailing_zeros(text: &mut String) {
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
}

/// Writes a quoted string, choosing the quote character that occurs less
/// often in the value and doubling its occurrences.
fn write_quoted<W: Write>(writer: &mut W, value: &str) -> std::io::Result<()> {
    let mut quote = '"';
    let double_count = value.matches('"').count();
    if double_count != 0 && value.matches('\'').count() < double_count {
        quote = '\'';
    }
    let mut buffer = [0u8; 4];
    let quote_bytes = quote.encode_utf8(&mut buffer).as_bytes();
    writer.write_all(quote_bytes)?;
    let mut first = true;
    for piece in value.split(quote) {
        if !first {
            writer.write_all(quote_bytes)?;
            writer.write_all(quote_bytes)?;
        }
        writer.write_all(piece.as_bytes())?;
        first = false;
    }
    writer.write_all(quote_bytes)
}

fn write_value<W: Write>(node: &Node, writer: &mut W, indent: usize) -> std::io::Result<()> {
    match &node.value {
        Value::Bool(value) => writer.write_all(if *value { b"true" } else { b"false" }),
        Value::Int(value) => write!(writer, "{value}"),
        Value::Number(value) => writer.write_all(format_number(*value).as_bytes()),
        Value::String(value) => write_quoted(writer, value),
        Value::List(children) | Value::Plist(children) => {
            if children.is_empty() {
                return writer.write_all(b"( )");
            }
            writer.write_all(b"( ")?;
            for (index, child) in children.iter().enumerate() {
                if index != 0 {
                    writer.write_all(b", ")?;
                }
                write_value(child, writer, indent + 1)?;
            }
            writer.write_all(b" )")
        }
        Value::Section(children) => {
            writer.write_all(b"{\n")?;
            write_section(children, writer, indent + 1)?;
            write_indent(writer, indent)?;
            writer.write_all(b"}")
        }
        // None and Expression nodes only occur in trees the schema engine
        // owns; they have no textual form.
        Value::None | Value::Schema(_) | Value::Expression(_) => Ok(()),
    }
}

fn write_plist<W: Write>(plist: &Node, writer: &mut W, indent: usize) -> std::io::Result<()> {
    let name = plist.name.as_deref().unwrap_or_default();
    for child in plist.children() {
        write_indent(writer, indent)?;
        write!(writer, "%{name}")?;
        match child.value {
            Value::Section(_) => writer.write_all(b" ")?,
            _ => writer.write_all(b" = ")?,
        }
        write_value(child, writer, indent)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

fn write_section<W: Write>(
    children: &[Node],
    writer: &mut W,
    indent: usize,
) -> std::io::Result<()> {
    for child in children {
        if let Value::Plist(_) = child.value {
            write_plist(child, writer, indent)?;
            continue;
        }
        write_indent(writer, indent)?;
        writer.write_all(child.name.as_deref().unwrap_or_default().as_bytes())?;
        match child.value {
            Value::Section(_) => writer.write_all(b" ")?,
            _ => writer.write_all(b" = ")?,
        }
        write_value(child, writer, indent)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
