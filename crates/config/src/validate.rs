//! Configuration validation.
//!
//! Collects every problem in one pass: unknown or misspelled keys, type
//! errors, missing required settings and security warnings.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use secrecy::ExposeSecret;

use crate::{loader, schema::CourierConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "required", "invalid" or
    /// "security"
    pub category: &'static str,
    /// Dotted path, e.g. "server.port"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{}: {}: {}", self.severity, self.path, self.message)
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Error diagnostics joined into one line, for a startup failure.
    #[must_use]
    pub fn error_summary(&self) -> String {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// What the config is about to be used for; decides which settings are
/// required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Serving Mattermost: the outgoing URL and username are required.
    Run,
    /// The console connector: only the username is required.
    Shell,
}

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "common",
            Struct(HashMap::from([("log", Leaf), ("pid_file", Leaf)])),
        ),
        (
            "mattermost",
            Struct(HashMap::from([
                ("outgoing_url", Leaf),
                ("incoming_path", Leaf),
                ("tokens", Leaf),
                ("username", Leaf),
                ("override_username", Leaf),
                ("icon_url", Leaf),
                ("insecure_skip_verify", Leaf),
            ])),
        ),
        (
            "server",
            Struct(HashMap::from([
                ("enable", Leaf),
                ("bind_address", Leaf),
                ("port", Leaf),
            ])),
        ),
    ]))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, excluding exact matches.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

/// Validate the config file at `path`, or the discovered one.
#[must_use]
pub fn validate(path: Option<&Path>, purpose: Purpose) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(loader::find_config_file);

    let Some(actual_path) = config_path else {
        let mut result = validate_config(&CourierConfig::default(), purpose);
        result.diagnostics.insert(
            0,
            Diagnostic::new(
                Severity::Info,
                "syntax",
                "",
                "no config file found; using defaults",
            ),
        );
        return result;
    };

    let mut result = match loader::load_config_value(&actual_path) {
        Ok(value) => validate_value(&value, purpose),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate an untyped config tree (as parsed from any supported format).
#[must_use]
pub fn validate_value(value: &serde_json::Value, purpose: Purpose) -> ValidationResult {
    let mut diagnostics = Vec::new();

    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<CourierConfig>(value.clone()) {
        Ok(config) => diagnostics.extend(validate_config(&config, purpose).diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Semantic checks on an already-typed config (including CLI overrides).
#[must_use]
pub fn validate_config(config: &CourierConfig, purpose: Purpose) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let mm = &config.mattermost;

    if purpose == Purpose::Run && mm.outgoing_url.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "required",
            "mattermost.outgoing_url",
            "\"mattermost.outgoing_url\" is required",
        ));
    }
    if mm.username.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "required",
            "mattermost.username",
            "\"mattermost.username\" is required",
        ));
    }
    if !mm.outgoing_url.is_empty() {
        check_url(&mm.outgoing_url, "mattermost.outgoing_url", &mut diagnostics);
    }
    if !mm.icon_url.is_empty() {
        check_url(&mm.icon_url, "mattermost.icon_url", &mut diagnostics);
    }
    if !mm.incoming_path.is_empty() && !mm.incoming_path.starts_with('/') {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid",
            "mattermost.incoming_path",
            "must start with '/'",
        ));
    }

    if config.server.port == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid",
            "server.port",
            "port must be non-zero",
        ));
    }

    if mm.insecure_skip_verify {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "mattermost.insecure_skip_verify",
            "TLS certificate verification is disabled for outgoing posts",
        ));
    }
    let tokens_empty = mm.tokens.iter().all(|t| t.expose_secret().is_empty());
    if purpose == Purpose::Run && config.server.enable && tokens_empty {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "mattermost.tokens",
            "no tokens configured; the webhook accepts requests from anyone",
        ));
    }
    if purpose == Purpose::Run && !config.server.enable {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "invalid",
            "server.enable",
            "the HTTP server is disabled; Mattermost cannot deliver messages",
        ));
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_url(raw: &str, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match url::Url::parse(raw) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {},
        Ok(u) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid",
            path,
            format!("unsupported scheme \"{}\"; expected http or https", u.scheme()),
        )),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid",
            path,
            format!("invalid URL: {e}"),
        )),
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            " at top level"
        } else {
            ""
        };
        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field{level} (did you mean \"{s}\"?)"),
            None => format!("unknown field{level}"),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}
