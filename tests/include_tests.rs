//! Include resolution against real files through the default search-path
//! mechanism.

use std::fs;

use camino::Utf8PathBuf;
use treeconf::{read_path, ErrorKind, IncludeMode, Node, ReadOptions};

/// A scratch directory that cleans up after itself.
struct Scratch {
    directory: Utf8PathBuf,
}

impl Scratch {
    fn new(stem: &str) -> Scratch {
        let directory = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .expect("temp dir is UTF-8")
            .join(format!("treeconf-{stem}-{}", std::process::id()));
        fs::create_dir_all(&directory).unwrap();
        Scratch { directory }
    }

    fn file(&self, name: &str, content: &str) -> Utf8PathBuf {
        let path = self.directory.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn options(&self) -> ReadOptions {
        ReadOptions {
            verbose_error: true,
            error_file_name: true,
            include: IncludeMode::Path {
                search: vec![self.directory.clone()],
                flags: Default::default(),
            },
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.directory);
    }
}

#[test]
fn include_from_search_path() {
    let scratch = Scratch::new("basic");
    scratch.file("extra.cfg", "b = 2\n");
    let main = scratch.file("main.cfg", "a = 1\n%include = \"extra.cfg\"\nc = 3\n");

    let config = read_path(&main, &scratch.options()).unwrap();
    let names: Vec<_> = config.children().filter_map(Node::name).collect();
    assert_eq!(names, ["a", "b", "c"]);
    assert_eq!(
        config.get("b").and_then(Node::file_name),
        Some("extra.cfg")
    );
    assert_eq!(config.get("a").and_then(Node::file_name), None);
}

#[test]
fn include_cycle_reported_at_the_include_site() {
    let scratch = Scratch::new("cycle");
    let a = scratch.file("a.cfg", "%include = \"b.cfg\"\n");
    scratch.file("b.cfg", "%include = \"a.cfg\"\n");

    let error = read_path(&a, &scratch.options()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RecursiveInclude);
    assert_eq!(error.line(), 1);
    assert_eq!(error.file_name(), Some("b.cfg"));
}

#[test]
fn self_include_detected() {
    let scratch = Scratch::new("self");
    let main = scratch.file("main.cfg", "a = 1\n%include = \"main.cfg\"\n");

    let error = read_path(&main, &scratch.options()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RecursiveInclude);
    assert_eq!(error.line(), 2);
}

#[test]
fn missing_include_file() {
    let scratch = Scratch::new("missing");
    let main = scratch.file("main.cfg", "%include = \"nowhere.cfg\"\n");

    let error = read_path(&main, &scratch.options()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Io);
    assert_eq!(error.line(), 1);
}

#[test]
fn clean_name_refuses_escaping_includes() {
    let scratch = Scratch::new("clean");
    let main = scratch.file("main.cfg", "%include = \"../escape.cfg\"\n");
    let mut options = scratch.options();
    if let IncludeMode::Path { flags, .. } = &mut options.include {
        flags.clean_name = true;
    }

    let error = read_path(&main, &options).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Io);
}
