//! The command line harness: exit codes, stderr diagnostic format and
//! canonical output.

use std::fs;
use std::process::{Command, Output};

use camino::Utf8PathBuf;

/// A scratch directory that cleans up after itself.
struct Scratch {
    directory: Utf8PathBuf,
}

impl Scratch {
    fn new(stem: &str) -> Scratch {
        let directory = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .expect("temp dir is UTF-8")
            .join(format!("treeconf-cli-{stem}-{}", std::process::id()));
        fs::create_dir_all(&directory).unwrap();
        Scratch { directory }
    }

    fn file(&self, name: &str, content: &str) -> Utf8PathBuf {
        let path = self.directory.join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.directory);
    }
}

fn treeconf(arguments: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_treeconf"))
        .args(arguments)
        .output()
        .unwrap()
}

#[test]
fn success_prints_canonical_form() {
    let scratch = Scratch::new("ok");
    let input = scratch.file("input.cfg", "b=2;a=1\nsub{x=1}\n");

    let output = treeconf(&[input.as_str()]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "b = 2\na = 1\nsub {\n\tx = 1\n}\n"
    );
}

#[test]
fn parse_failure_diagnostic_is_file_line_message() {
    let scratch = Scratch::new("parse");
    let input = scratch.file("input.cfg", "a = 1\na = 2\n");

    let output = treeconf(&[input.as_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let diagnostic = stderr.lines().next().unwrap_or_default();
    assert_eq!(diagnostic, format!("{input}:2: duplicate key: a"));
    assert!(!stderr.starts_with("Error:"));
}

#[test]
fn validation_failure_diagnostic_and_exit_code() {
    let scratch = Scratch::new("validate");
    let schema = scratch.file(
        "schema.cfg",
        "allowed-keys {\nversion { type = \"int\"; %constraint = \"% > 0\" }\n}\n",
    );
    let input = scratch.file("input.cfg", "version = 0\n");

    let output = treeconf(&["-s", schema.as_str(), input.as_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let diagnostic = stderr.lines().next().unwrap_or_default();
    assert_eq!(
        diagnostic,
        format!("{input}:1: schema constraint violated: % > 0")
    );

    let good = scratch.file("good.cfg", "version = 3\n");
    let output = treeconf(&["-s", schema.as_str(), good.as_str()]);
    assert!(output.status.success());
}

#[test]
fn include_error_names_the_include_file() {
    let scratch = Scratch::new("include");
    scratch.file("b.cfg", "%include = \"a.cfg\"\n");
    let a = scratch.file("a.cfg", "%include = \"b.cfg\"\n");

    let output = treeconf(&["-i", scratch.directory.as_str(), a.as_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let diagnostic = stderr.lines().next().unwrap_or_default();
    assert_eq!(diagnostic, "b.cfg:1: recursive include: a.cfg");
}
