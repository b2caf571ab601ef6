// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment failures into miette diagnostics.
//!
//! Errors from a TOML file point at the offending line. Errors from a
//! `DESKLINE_*` variable name the variable, and a misspelled key is
//! suggested back in the same form the user wrote it.

#![allow(unused_assignments)]

use std::fmt;

use figment::error::{Error as FigmentError, Kind};
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader::ENV_SECTIONS;

const ENV_PREFIX: &str = "DESKLINE_";

/// Jaro-Winkler score a candidate must beat to be suggested.
const MIN_SIMILARITY: f64 = 0.75;

/// Where a rejected key was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOrigin {
    File(String),
    /// Full environment variable name.
    Env(String),
    Unknown,
}

impl fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "in {path}"),
            Self::Env(var) => write!(f, "from environment variable {var}"),
            Self::Unknown => f.write_str("in configuration"),
        }
    }
}

/// A configuration problem, ready for miette rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` {origin}")]
    #[diagnostic(
        code(deskline::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        origin: KeyOrigin,
        /// Closest valid spelling, written as a key or as a variable name
        /// to match `origin`.
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a deskline setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("bad value for `{key}` {origin}: {detail}")]
    #[diagnostic(code(deskline::config::invalid_value))]
    InvalidValue {
        key: String,
        origin: KeyOrigin,
        detail: String,
        #[label("here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(code(deskline::config::missing_key))]
    MissingKey { key: String },

    /// A semantic check failed after deserialization.
    #[error("validation error: {message}")]
    #[diagnostic(code(deskline::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(deskline::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Converts every error inside `err`. `sources` pairs a file name with its
/// contents and is used to place spans.
pub fn from_figment(err: FigmentError, sources: &[(String, String)]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, sources))
        .collect()
}

fn convert(error: &FigmentError, sources: &[(String, String)]) -> ConfigError {
    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let mut key_path = error.path.clone();
            key_path.push(field.clone());
            let origin = origin_of(error, &key_path, sources);
            let suggestion = suggest(field, expected, &error.path, &origin);
            let (span, src) = span_in(&origin, &error.path, field, sources);
            ConfigError::UnknownKey {
                key: field.clone(),
                origin,
                suggestion,
                valid_keys: expected.join(", "),
                span,
                src,
            }
        }
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: dotted(&error.path, field),
        },
        Kind::InvalidType(actual, expected) => invalid_value(
            error,
            format!("found {actual}, expected {expected}"),
            sources,
        ),
        Kind::InvalidValue(actual, expected) => invalid_value(
            error,
            format!("found {actual}, expected {expected}"),
            sources,
        ),
        _ => ConfigError::Other(error.to_string()),
    }
}

fn invalid_value(error: &FigmentError, detail: String, sources: &[(String, String)]) -> ConfigError {
    let origin = origin_of(error, &error.path, sources);
    let (section, field) = match error.path.split_last() {
        Some((field, section)) => (section, field.as_str()),
        None => (&[][..], ""),
    };
    let (span, src) = span_in(&origin, section, field, sources);
    ConfigError::InvalidValue {
        key: error.path.join("."),
        origin,
        detail,
        span,
        src,
    }
}

fn dotted(path: &[String], field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", path.join("."))
    }
}

fn origin_of(error: &FigmentError, key_path: &[String], sources: &[(String, String)]) -> KeyOrigin {
    let Some(meta) = error.metadata.as_ref() else {
        // The root table is untagged, so a stray top-level key is traced by
        // looking for its variable.
        let var = env_var_name(key_path);
        return match sources {
            _ if std::env::var_os(&var).is_some() => KeyOrigin::Env(var),
            [(name, _)] => KeyOrigin::File(name.clone()),
            _ => KeyOrigin::Unknown,
        };
    };
    if meta.name.contains("environment variable") {
        return KeyOrigin::Env(env_var_name(key_path));
    }
    match (&meta.source, sources) {
        (Some(figment::Source::File(path)), _) => KeyOrigin::File(path.display().to_string()),
        // `Toml::string` input carries no path, only a name.
        (None, [(name, _)]) if meta.name.ends_with("source string") => {
            KeyOrigin::File(name.clone())
        }
        _ => KeyOrigin::Unknown,
    }
}

/// `["relay", "read_timeout_secs"]` becomes `DESKLINE_RELAY_READ_TIMEOUT_SECS`.
pub fn env_var_name(key_path: &[String]) -> String {
    format!("{ENV_PREFIX}{}", key_path.join("_").to_ascii_uppercase())
}

fn suggest(field: &str, expected: &[&str], section: &[String], origin: &KeyOrigin) -> Option<String> {
    if !matches!(origin, KeyOrigin::Env(_)) {
        return closest(field, expected).map(str::to_string);
    }

    // A top-level env key is usually a section name with a typo in it.
    if section.is_empty() {
        if let Some((head, rest)) = field.split_once('_') {
            if let Some(fixed) = closest(head, ENV_SECTIONS) {
                return Some(env_var_name(&[fixed.to_string(), rest.to_string()]));
            }
        }
    }
    closest(field, expected).map(|fixed| {
        let mut path = section.to_vec();
        path.push(fixed.to_string());
        env_var_name(&path)
    })
}

fn closest<'a>(key: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (*candidate, strsim::jaro_winkler(key, candidate)))
        .filter(|(_, score)| *score > MIN_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

fn span_in(
    origin: &KeyOrigin,
    section: &[String],
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let KeyOrigin::File(path) = origin else {
        return (None, None);
    };
    // A lone source matches whatever path figment recorded.
    let source = match sources {
        [only] => Some(only),
        _ => sources.iter().find(|(name, _)| name == path),
    };
    let located = source.and_then(|(name, content)| {
        locate_key(content, section, field).map(|offset| (name, content, offset))
    });
    match located {
        Some((name, content, offset)) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `key = ...` inside the table named by `section`.
///
/// Array indices in `section` are ignored, so a key in any `[[desks]]`
/// entry is found under `["desks", "0"]`. An empty section is the
/// top-level table before the first header.
pub fn locate_key(content: &str, section: &[String], key: &str) -> Option<usize> {
    let wanted: Vec<&str> = section
        .iter()
        .map(String::as_str)
        .filter(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .collect();
    let wanted = wanted.join(".");

    let mut table = String::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let body = line.trim_start();
        if let Some(header) = body.strip_prefix('[') {
            table = header
                .trim_start_matches('[')
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if table == wanted {
            let assigns_key = body
                .strip_prefix(key)
                .is_some_and(|after| after.trim_start().starts_with('='));
            if assigns_key {
                return Some(offset + line.len() - body.len());
            }
        }
        offset += line.len();
    }
    None
}

/// Prints each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use figment::Figment;
    use figment::providers::{Format, Serialized, Toml};

    use super::*;
    use crate::loader::env_provider;
    use crate::model::DesklineConfig;

    fn env_errors(jail_env: &[(&str, &str)]) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        figment::Jail::expect_with(|jail| {
            for (name, value) in jail_env {
                jail.set_env(name, value);
            }
            let err = Figment::new()
                .merge(Serialized::defaults(DesklineConfig::default()))
                .merge(env_provider())
                .extract::<DesklineConfig>()
                .expect_err("env key should be rejected");
            errors = from_figment(err, &[]);
            Ok(())
        });
        errors
    }

    #[test]
    fn closest_picks_best_candidate() {
        assert_eq!(closest("prot", &["host", "port"]), Some("port"));
        assert_eq!(
            closest("jwt_secert", &["jwt_secret", "token_ttl_secs"]),
            Some("jwt_secret")
        );
        assert_eq!(closest("zzzzzz", &["level", "json"]), None);
    }

    #[test]
    fn locate_key_respects_tables() {
        let content = "[server]\nport = 1\n\n[relay]\n  port = 2\npign_interval_secs = 5\n";
        let relay = vec!["relay".to_string()];
        let at = locate_key(content, &relay, "pign_interval_secs").unwrap();
        assert_eq!(&content[at..at + 18], "pign_interval_secs");

        let at = locate_key(content, &relay, "port").unwrap();
        assert_eq!(&content[at - 2..at + 4], "  port");
        assert!(locate_key(content, &relay, "host").is_none());
    }

    #[test]
    fn locate_key_in_array_table() {
        let content = "[[desks]]\napp_id = \"a\"\nallowed_domain = []\n";
        let path = vec!["desks".to_string(), "0".to_string()];
        let at = locate_key(content, &path, "allowed_domain").unwrap();
        assert!(content[at..].starts_with("allowed_domain"));
    }

    #[test]
    fn file_errors_carry_a_span() {
        let content = "[relay]\npign_interval_secs = 5\n";
        let err = Figment::new()
            .merge(Serialized::defaults(DesklineConfig::default()))
            .merge(Toml::string(content))
            .extract::<DesklineConfig>()
            .unwrap_err();
        let errors = from_figment(err, &[("<inline>".to_string(), content.to_string())]);
        match &errors[0] {
            ConfigError::UnknownKey {
                origin,
                suggestion,
                span,
                ..
            } => {
                assert_eq!(origin, &KeyOrigin::File("<inline>".into()));
                assert_eq!(suggestion.as_deref(), Some("ping_interval_secs"));
                assert_eq!(span.map(|s| s.offset()), Some(8));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn env_errors_name_the_variable() {
        let errors = env_errors(&[("DESKLINE_RELAY_PIGN_INTERVAL_SECS", "5")]);
        match &errors[0] {
            ConfigError::UnknownKey {
                key,
                origin,
                suggestion,
                span,
                ..
            } => {
                assert_eq!(key, "pign_interval_secs");
                assert_eq!(
                    origin,
                    &KeyOrigin::Env("DESKLINE_RELAY_PIGN_INTERVAL_SECS".into())
                );
                assert_eq!(
                    suggestion.as_deref(),
                    Some("DESKLINE_RELAY_PING_INTERVAL_SECS")
                );
                assert!(span.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn misspelled_env_section_suggests_variable() {
        let errors = env_errors(&[("DESKLINE_AUHT_JWT_SECRET", "x")]);
        let suggestion = errors.iter().find_map(|e| match e {
            ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
            _ => None,
        });
        assert_eq!(suggestion.as_deref(), Some("DESKLINE_AUTH_JWT_SECRET"));
    }

    #[test]
    fn env_var_names_are_uppercased() {
        let path = vec!["storage".to_string(), "wal_mode".to_string()];
        assert_eq!(env_var_name(&path), "DESKLINE_STORAGE_WAL_MODE");
    }
}
