use schemact::validate::{
    check_file_sizes, resolve_in_migrations_dir, validate_identifier, validate_migration_name,
};
use schemact::{Dialect, Error};
use tempfile::TempDir;

#[test]
fn identifiers_accept_the_usual_shapes() {
    for name in ["users", "_private", "User2", "created_at", "A"] {
        validate_identifier(name, Dialect::Postgres.identifier_cap()).unwrap();
    }
}

#[test]
fn identifiers_reject_dangerous_characters() {
    for name in ["us;ers", "it's", "say\"no", "back\\slash", "sla/sh", "st*ar", "ha#sh"] {
        let err = validate_identifier(name, 63).unwrap_err();
        assert!(
            matches!(&err, Error::Validation(m) if m.contains("forbidden character")),
            "expected forbidden-character error for {:?}, got {:?}",
            name,
            err
        );
    }
}

#[test]
fn identifiers_reject_bad_shapes() {
    for name in ["", "1abc", "has space", "dash-ed", "ünïcode"] {
        assert!(validate_identifier(name, 63).is_err(), "accepted {:?}", name);
    }
}

#[test]
fn identifier_length_caps_are_per_dialect() {
    let name = "a".repeat(64);
    assert!(validate_identifier(&name, Dialect::Postgres.identifier_cap()).is_err());
    assert!(validate_identifier(&name, Dialect::Mysql.identifier_cap()).is_ok());
    assert!(validate_identifier(&name, Dialect::Sqlite.identifier_cap()).is_ok());
}

#[test]
fn migration_names_accept_plain_names() {
    assert_eq!(validate_migration_name("add_users").unwrap(), "add_users");
    assert_eq!(validate_migration_name("2fa-tokens").unwrap(), "2fa-tokens");
}

#[test]
fn migration_names_reject_traversal_in_every_encoding() {
    for name in ["../etc", "..%2Fetc", "..%252Fetc", "..%25252Fetc", "a/b", "a%2Fb"] {
        let err = validate_migration_name(name).unwrap_err();
        assert!(
            matches!(err, Error::Validation(_)),
            "expected rejection for {:?}",
            name
        );
    }
}

#[test]
fn migration_names_reject_length_and_shape() {
    assert!(validate_migration_name(&"x".repeat(101)).is_err());
    assert!(validate_migration_name(&"x".repeat(100)).is_ok());
    assert!(validate_migration_name("").is_err());
    assert!(validate_migration_name("_leading_underscore").is_err());
    assert!(validate_migration_name("-leading-dash").is_err());
    assert!(validate_migration_name("émigré").is_err());
}

#[test]
fn migration_names_are_nfc_normalized_before_checking() {
    // 'e' followed by a combining acute accent normalizes to 'é', which the
    // character rules then reject; the decomposed form must not slip through.
    assert!(validate_migration_name("caf\u{0065}\u{0301}").is_err());
}

#[test]
fn resolve_stays_inside_the_migrations_directory() {
    let dir = TempDir::new().unwrap();
    let resolved = resolve_in_migrations_dir(dir.path(), "20240101000000_ok.sigl").unwrap();
    assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));

    for name in ["../escape.sigl", "a/../../b.sigl", ""] {
        assert!(
            resolve_in_migrations_dir(dir.path(), name).is_err(),
            "accepted {:?}",
            name
        );
    }
}

#[test]
fn missing_migrations_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    assert!(resolve_in_migrations_dir(&missing, "x.sigl").is_err());
}

#[cfg(unix)]
#[test]
fn symlinked_migrations_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let real = dir.path().join("real");
    std::fs::create_dir(&real).unwrap();
    let link = dir.path().join("link");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let err = resolve_in_migrations_dir(&link, "x.sigl").unwrap_err();
    assert!(matches!(&err, Error::Validation(m) if m.contains("symbolic link")));
}

#[test]
fn file_size_caps() {
    let sizes = vec![
        ("a.sigl".to_string(), 10u64),
        ("b.sigl".to_string(), 20u64),
    ];
    check_file_sizes(&sizes, 100, 100).unwrap();

    let err = check_file_sizes(&sizes, 15, 100).unwrap_err();
    assert!(matches!(&err, Error::Validation(m) if m.contains("b.sigl")));

    let err = check_file_sizes(&sizes, 100, 25).unwrap_err();
    assert!(matches!(&err, Error::Validation(m) if m.contains("limit for one run")));
}
