//! End-to-end schema loading and validation through the public API.

use indoc::indoc;
use treeconf::{
    read_schema_str, read_str, ErrorKind, Node, ReadOptions, Schema, ValidateOptions,
};

fn options() -> ReadOptions {
    ReadOptions {
        verbose_error: true,
        error_file_name: true,
        include: treeconf::IncludeMode::None,
    }
}

fn validate_options() -> ValidateOptions {
    ValidateOptions {
        verbose_error: true,
        error_file_name: true,
    }
}

fn schema(text: &str) -> Schema {
    read_schema_str(text, &options()).unwrap()
}

fn config(text: &str) -> Node {
    read_str(text, &options()).unwrap()
}

#[test]
fn version_constraint() {
    let loaded = schema(indoc! {r#"
        allowed-keys {
            version {
                type = "int"
                %constraint = "% > 0"
            }
        }
    "#});
    let error = loaded
        .validate(&config("version = 0\n"), &validate_options())
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(error.line(), 1);

    loaded
        .validate(&config("version = 1\n"), &validate_options())
        .unwrap();

    let error = loaded
        .validate(&config("version = \"x\"\n"), &validate_options())
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidKeyType);
}

#[test]
fn cross_reference_with_dereference() {
    let loaded = schema(indoc! {r#"
        types {
            record {
                type = "section"
                item-type = "any"
            }
        }
        allowed-keys {
            car {
                type = "section"
                allowed-keys {
                    owner { type = "string" }
                }
            }
            owners {
                type = "section"
                item-type = "record"
            }
        }
        constraint = ( "/owners/[car/owner]/name" )
    "#});
    loaded
        .validate(
            &config(indoc! {r#"
                car {
                    owner = "bob"
                }
                owners {
                    bob {
                        name = "Bob"
                    }
                }
            "#}),
            &validate_options(),
        )
        .unwrap();

    let error = loaded
        .validate(
            &config(indoc! {r#"
                car {
                    owner = "bob"
                }
                owners {
                    bob {
                        age = 4
                    }
                }
            "#}),
            &validate_options(),
        )
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
}

#[test]
fn recursive_type_definition() {
    let error = read_schema_str(
        indoc! {r#"
            types {
                A { type = "B" }
                B { type = "A" }
            }
        "#},
        &options(),
    )
    .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::RecursiveType);
    assert_eq!(error.line(), 2);
}

#[test]
fn verbose_flag_controls_extra() {
    let loaded = schema(indoc! {r#"
        allowed-keys {
            port { type = "int" }
        }
    "#});
    let subject = config("other = 1\n");
    let verbose = loaded
        .validate(&subject, &validate_options())
        .unwrap_err();
    assert_eq!(verbose.extra(), Some("other"));
    let terse = loaded
        .validate(&subject, &ValidateOptions::default())
        .unwrap_err();
    assert_eq!(terse.extra(), None);
}

#[test]
fn validated_config_survives_a_round_trip() {
    let loaded = schema(indoc! {r#"
        allowed-keys {
            name { type = "string" }
            limits {
                type = "section"
                allowed-keys {
                    soft { type = "int" }
                    hard { type = "int" }
                }
                %constraint = "{soft must not exceed hard} !(soft > hard)"
            }
        }
    "#});
    let subject = config(indoc! {r#"
        name = "svc"
        limits {
            soft = 10
            hard = 20
        }
    "#});
    loaded.validate(&subject, &validate_options()).unwrap();

    let written = treeconf::write_string(&subject).unwrap();
    let reread = read_str(&written, &options()).unwrap();
    assert_eq!(reread, subject);
    loaded.validate(&reread, &validate_options()).unwrap();

    let flipped = config(indoc! {r#"
        limits {
            soft = 30
            hard = 20
        }
    "#});
    let error = loaded
        .validate(&flipped, &validate_options())
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(error.extra(), Some("soft must not exceed hard"));
}

#[test]
fn plist_validates_against_list_type() {
    let loaded = schema(indoc! {r#"
        allowed-keys {
            route {
                type = "list"
                item-type = "string"
            }
        }
    "#});
    loaded
        .validate(
            &config("%route = \"10.0.0.0/8\"\n%route = \"192.168.0.0/16\"\n"),
            &validate_options(),
        )
        .unwrap();
}

#[test]
fn schema_with_includes() {
    use std::io::Cursor;

    let keys = "version { type = \"int\" }\n";
    let read_options = ReadOptions {
        verbose_error: true,
        error_file_name: true,
        include: treeconf::IncludeMode::Callback(Box::new(move |name| {
            if name == "keys.cfg" {
                Ok(Box::new(Cursor::new(keys.as_bytes().to_vec())) as Box<dyn std::io::Read>)
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            }
        })),
    };
    let loaded = read_schema_str(
        "allowed-keys {\n%include = \"keys.cfg\"\n}\n",
        &read_options,
    )
    .unwrap();
    loaded
        .validate(&config("version = 3\n"), &validate_options())
        .unwrap();
}
