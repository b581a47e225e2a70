//! Opening files through a search path, with optional restrictions on
//! the names accepted.
//!
//! This is the resolver behind the default `%include` mechanism: include
//! directives name files relative to a list of search directories, and a
//! deployment can refuse names that would read outside those
//! directories.

use std::fs::File;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';

/// Behavior flags for [`open_from_path`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathFlags {
    /// Split each search path entry on the platform's path list
    /// separator before searching.
    pub split_path: bool,
    /// Only accept names that stay inside the search directories: no
    /// absolute names, and no `..` segment may escape the directory a
    /// name is resolved in.
    pub clean_name: bool,
}

/// Tracks whether a relative name stays inside the directory it is
/// resolved in. `..` may only unwind path components the name itself
/// introduced, and the final component must be an ordinary name.
fn name_is_clean(name: &str) -> bool {
    if name.starts_with('/') {
        return false;
    }
    let mut depth: i32 = 0;
    let mut final_is_name = false;
    for segment in name.split('/') {
        final_is_name = false;
        match segment {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {
                depth += 1;
                final_is_name = true;
            }
        }
    }
    final_is_name
}

fn try_open(directory: &Utf8Path, name: &str) -> io::Result<File> {
    File::open(directory.join(name))
}

/// Opens `name` for reading, searching the entries of `path` in order.
///
/// An absolute name bypasses the search path entirely, unless
/// [`PathFlags::clean_name`] is set, in which case it is rejected along
/// with any name whose `..` segments would escape a search directory.
/// Search continues past missing files but stops at any other error.
pub fn open_from_path(
    path: &[Utf8PathBuf],
    name: &str,
    flags: PathFlags,
) -> io::Result<File> {
    if flags.clean_name && !name_is_clean(name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unclean file name: {name}"),
        ));
    }
    if Utf8Path::new(name).is_absolute() {
        return File::open(name);
    }
    for entry in path {
        if flags.split_path {
            for directory in entry.as_str().split(PATH_LIST_SEPARATOR) {
                match try_open(Utf8Path::new(directory), name) {
                    Ok(file) => return Ok(file),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e),
                }
            }
        } else {
            match try_open(entry, name) {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{name} not found in search path"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_names() {
        for name in ["bar", "foo/../bar", "foo/../blah/../bar", "foo/./../bar", "foo/./../blah/../bar"] {
            assert!(name_is_clean(name), "{name} should be accepted");
        }
    }

    #[test]
    fn unclean_names() {
        for name in [
            ".",
            "./",
            "/.",
            "..",
            "../",
            "/..",
            "../foo",
            "/foo",
            "/foo/.",
            "/foo/..",
            "foo/.",
            "foo/..",
            "foo/../../bar",
            "foo/../blah/../../bar",
            "foo/../../blah/../bar",
            "foo/./../../bar",
            "foo/./../blah/../../bar",
            "foo/./../../blah/../bar",
        ] {
            assert!(!name_is_clean(name), "{name} should be rejected");
        }
    }

    #[test]
    fn clean_name_rejection_is_invalid_input() {
        let error = open_from_path(
            &[Utf8PathBuf::from(".")],
            "/etc/passwd",
            PathFlags {
                split_path: false,
                clean_name: true,
            },
        )
        .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_file_is_not_found() {
        let error = open_from_path(
            &[Utf8PathBuf::from(".")],
            "definitely-not-a-real-file.cfg",
            PathFlags::default(),
        )
        .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }
}
