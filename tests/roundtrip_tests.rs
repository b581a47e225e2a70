//! End-to-end checks that writing and re-reading a tree preserves it.

use indoc::indoc;
use treeconf::{read_str, write_string, ErrorKind, Kind, Node, ReadOptions};

fn parse(text: &str) -> Node {
    read_str(text, &ReadOptions::default()).unwrap()
}

#[test]
fn minimal_round_trip() {
    let config = parse("a = 1\nb = \"x\"\n");
    assert_eq!(config.len(), 2);
    assert_eq!(config.get("a").and_then(Node::as_int), Some(1));
    assert_eq!(config.get("b").and_then(Node::as_str), Some("x"));
    let written = write_string(&config).unwrap();
    assert_eq!(parse(&written), config);
}

#[test]
fn plist_coalescing() {
    let config = parse("%l = 1\n%l = 2\n%l = 3\n");
    assert_eq!(config.len(), 1);
    let plist = config.get("l").unwrap();
    assert_eq!(plist.kind(), Kind::Plist);
    let values: Vec<_> = plist.children().filter_map(Node::as_int).collect();
    assert_eq!(values, [1, 2, 3]);
    let written = write_string(&config).unwrap();
    let reread = parse(&written);
    assert_eq!(reread.get("l").map(Node::kind), Some(Kind::Plist));
    assert_eq!(reread, config);
}

#[test]
fn non_finite_numbers_round_trip() {
    let mut config = Node::new_section();
    config.set_number("not_a_number", f64::NAN).unwrap();
    config.set_number("plus", f64::INFINITY).unwrap();
    config.set_number("minus", f64::NEG_INFINITY).unwrap();
    config.set_number("whole", 1.0).unwrap();
    let written = write_string(&config).unwrap();
    assert_eq!(
        written,
        indoc! {"
            not_a_number = NaN
            plus = Infinity
            minus = -Infinity
            whole = 1.0
        "}
    );
    assert_eq!(parse(&written), config);
}

#[test]
fn floats_reload_to_the_same_bits() {
    let mut config = Node::new_section();
    for (index, value) in [0.1, -0.0, 2.0_f64.powi(-40), 1e300, -9.875e-12]
        .into_iter()
        .enumerate()
    {
        config.set_number(&format!("v{index}"), value).unwrap();
    }
    let written = write_string(&config).unwrap();
    let reread = parse(&written);
    for (a, b) in config.children().zip(reread.children()) {
        assert_eq!(
            a.as_number().unwrap().to_bits(),
            b.as_number().unwrap().to_bits(),
        );
    }
}

#[test]
fn mixed_quotes_round_trip() {
    let mut config = Node::new_section();
    config.set_string("s", "both \" and ' in one").unwrap();
    let written = write_string(&config).unwrap();
    assert_eq!(parse(&written), config);
}

#[test]
fn hex_integers_reload_as_decimal() {
    let config = parse("mask = 0xff\n");
    assert_eq!(config.get("mask").and_then(Node::as_int), Some(255));
    let written = write_string(&config).unwrap();
    assert_eq!(written, "mask = 255\n");
    assert_eq!(parse(&written), config);
}

#[test]
fn structured_document_round_trip() {
    let text = indoc! {r#"
        # A representative document.
        daemon = yes
        workers = 4
        timeout = 2.5
        listen = ( "127.0.0.1:80", "::1:80" )
        %filter = "deny all"
        %filter = "allow local"
        log {
            file = "/var/log/app.log"
            rotate {
                keep = 7
                compress = true
            }
            levels = ( "info", "warn", ( "nested", 1 ) )
        }
        banner = "line one, " + "still line one"
    "#};
    let config = parse(text);
    let written = write_string(&config).unwrap();
    assert_eq!(parse(&written), config);
    // A second trip is byte-stable.
    assert_eq!(write_string(&parse(&written)).unwrap(), written);
}

#[test]
fn newline_in_string_is_a_parse_error() {
    let error = read_str("a = \"one\ntwo\"\n", &ReadOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
    assert_eq!(error.line(), 1);
}

#[test]
fn integer_overflow_is_out_of_range() {
    let error = read_str("a = 0x10000000000000000\n", &ReadOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::OutOfRange);
}

#[test]
fn duplicate_key_reports_second_occurrence() {
    let error = read_str("a = 1\na = 2\n", &ReadOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DuplicateKey);
    assert_eq!(error.line(), 2);
}

#[test]
fn api_built_tree_writes_and_reloads() {
    let mut config = Node::new_section();
    config.set_bool("enabled", true).unwrap();
    let server = config.set_section("server").unwrap();
    server.set_string("host", "localhost").unwrap();
    server.set_int("port", 8080).unwrap();
    let tags = config.set_plist("tag").unwrap();
    tags.push_string("alpha").unwrap();
    tags.push_string("beta").unwrap();
    let list = config.set_list("weights").unwrap();
    list.push_number(0.5).unwrap();
    list.push_number(0.25).unwrap();

    let written = write_string(&config).unwrap();
    assert_eq!(parse(&written), config);
}
