//! Input validation: SQL identifiers, user-supplied migration names, path
//! containment, and file-size caps. Everything here rejects loudly; nothing
//! is escaped or repaired silently.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// Characters that are never allowed inside an identifier, checked before the
/// shape regex so the error can name the exact offender.
const FORBIDDEN_IDENT_CHARS: &[char] = &[';', '\'', '"', '\\', '/', '*', '#'];

/// Longest migration name accepted from the command line.
const MAX_MIGRATION_NAME_LEN: usize = 100;

/// How many percent-decoding passes to run before giving up on reaching a
/// fixed point. Double- and triple-encoded traversal attempts unfold well
/// within this bound.
const MAX_DECODE_PASSES: usize = 5;

fn ident_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn migration_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap())
}

/// Validate a SQL identifier against the shape rules and the dialect's length
/// cap. Quoting does not sanitize hostile names; they are rejected outright.
pub fn validate_identifier(name: &str, max_len: usize) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("identifier is empty".into()));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_IDENT_CHARS.contains(c)) {
        return Err(Error::Validation(format!(
            "identifier '{}' contains forbidden character '{}'",
            name, ch
        )));
    }
    if !ident_regex().is_match(name) {
        return Err(Error::Validation(format!(
            "identifier '{}' must start with a letter or underscore and contain only letters, digits, and underscores",
            name
        )));
    }
    if name.len() > max_len {
        return Err(Error::Validation(format!(
            "identifier '{}' exceeds the {}-character limit for this database",
            name, max_len
        )));
    }
    Ok(())
}

/// Validate a user-supplied migration name. The name is percent-decoded to a
/// fixed point (bounded passes) and NFC-normalized before the character rules
/// apply, so `..%2Fetc` and `..%252Fetc` fail the same way `../etc` does.
/// Returns the normalized name to use from here on.
pub fn validate_migration_name(name: &str) -> Result<String> {
    let mut decoded = name.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let next = percent_decode_str(&decoded)
            .decode_utf8()
            .map_err(|_| {
                Error::Validation(format!("migration name '{}' is not valid UTF-8", name))
            })?
            .to_string();
        if next == decoded {
            break;
        }
        decoded = next;
    }
    let normalized: String = decoded.nfc().collect();

    if normalized.is_empty() {
        return Err(Error::Validation("migration name is empty".into()));
    }
    if normalized.len() > MAX_MIGRATION_NAME_LEN {
        return Err(Error::Validation(format!(
            "migration name '{}' exceeds {} characters",
            name, MAX_MIGRATION_NAME_LEN
        )));
    }
    if !migration_name_regex().is_match(&normalized) {
        return Err(Error::Validation(format!(
            "migration name '{}' may only contain letters, digits, '_' and '-', and must start with a letter or digit",
            name
        )));
    }
    Ok(normalized)
}

/// Resolve `filename` inside the migrations directory and verify the result
/// is a strict descendant. The directory itself must exist and must not be a
/// symbolic link.
pub fn resolve_in_migrations_dir(dir: &Path, filename: &str) -> Result<PathBuf> {
    let meta = std::fs::symlink_metadata(dir).map_err(|e| {
        Error::Validation(format!(
            "migrations directory {} is not accessible: {}",
            dir.display(),
            e
        ))
    })?;
    if meta.file_type().is_symlink() {
        return Err(Error::Validation(format!(
            "migrations directory {} must not be a symbolic link",
            dir.display()
        )));
    }
    let canonical = dir.canonicalize().map_err(|e| {
        Error::Validation(format!(
            "cannot resolve migrations directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let candidate = canonical.join(filename);
    let escapes = candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::CurDir));
    if escapes || !candidate.starts_with(&canonical) || candidate == canonical {
        return Err(Error::Validation(format!(
            "'{}' does not resolve inside the migrations directory",
            filename
        )));
    }
    Ok(candidate)
}

/// Enforce the per-file and aggregate size caps before any file is read.
/// `sizes` pairs each filename with its on-disk byte length.
pub fn check_file_sizes(sizes: &[(String, u64)], max_file: u64, max_total: u64) -> Result<()> {
    let mut total: u64 = 0;
    for (name, len) in sizes {
        if *len > max_file {
            return Err(Error::Validation(format!(
                "migration {} is {} bytes, above the {}-byte per-file limit",
                name, len, max_file
            )));
        }
        total = total.saturating_add(*len);
    }
    if total > max_total {
        return Err(Error::Validation(format!(
            "migrations total {} bytes, above the {}-byte limit for one run",
            total, max_total
        )));
    }
    Ok(())
}
