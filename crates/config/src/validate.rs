//! Configuration validation.
//!
//! Checks a config file in stages: syntax, unknown keys, types, then
//! semantic rules on the parsed config. Later stages only run when the
//! earlier ones leave something to inspect.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {relaygram_bridge::UserId, secrecy::ExposeSecret, serde_json::Value};

use crate::{env_subst::substitute_env, loader, schema::RelaygramConfig};

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
    /// "syntax", "unknown-field", "type-error", "actors", "telegram"
    pub category: &'static str,
    /// Dotted path, e.g. `actors[1].admin`.
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

/// Result of validating a configuration file.
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
}

const TOP_LEVEL_KEYS: &[&str] = &["telegram", "actors"];
const TELEGRAM_KEYS: &[&str] = &[
    "api_url",
    "poll_limit",
    "poll_timeout_secs",
    "request_timeout_secs",
    "scratch_dir",
];
const ACTOR_KEYS: &[&str] = &["id", "token", "admin"];

/// Validate the config file at `path`, or the discovered one when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "syntax",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(raw) => validate_str(&substitute_env(&raw), &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate already-substituted config text. `path` only selects the format.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match loader::parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("parse error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &mut diagnostics);

    match serde_json::from_value::<RelaygramConfig>(value) {
        Ok(config) => {
            check_telegram(&config, &mut diagnostics);
            check_actors(&config, &mut diagnostics);
        },
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

fn check_unknown_fields(value: &Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        return;
    };
    flag_unknown(root, TOP_LEVEL_KEYS, "", diagnostics);

    if let Some(telegram) = root.get("telegram").and_then(Value::as_object) {
        flag_unknown(telegram, TELEGRAM_KEYS, "telegram", diagnostics);
    }
    if let Some(actors) = root.get("actors").and_then(Value::as_array) {
        for (i, actor) in actors.iter().enumerate() {
            if let Some(actor) = actor.as_object() {
                flag_unknown(actor, ACTOR_KEYS, &format!("actors[{i}]"), diagnostics);
            }
        }
    }
}

fn flag_unknown(
    table: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for key in table.keys() {
        if known.contains(&key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let message = match suggest(key, known, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

fn check_telegram(config: &RelaygramConfig, diagnostics: &mut Vec<Diagnostic>) {
    let tg = &config.telegram;

    if !(1..=100).contains(&tg.poll_limit) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.poll_limit",
            format!("poll_limit must be between 1 and 100, got {}", tg.poll_limit),
        ));
    }

    if tg.request_timeout_secs <= u64::from(tg.poll_timeout_secs) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "telegram",
            "telegram.request_timeout_secs",
            format!(
                "request_timeout_secs ({}) must exceed poll_timeout_secs ({})",
                tg.request_timeout_secs, tg.poll_timeout_secs
            ),
        ));
    }

    if let Some(dir) = tg.scratch_dir.as_deref().filter(|d| !d.is_dir()) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "telegram",
            "telegram.scratch_dir",
            format!("{} is not an existing directory", dir.display()),
        ));
    }
}

fn check_actors(config: &RelaygramConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.actors.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "actors",
            "actors",
            "no actors configured; sync-actors will leave the repository untouched",
        ));
        return;
    }

    let mut first_seen = HashMap::new();
    for (i, actor) in config.actors.iter().enumerate() {
        if let Some(first) = first_seen.insert(actor.id, i) {
            // Keep pointing later duplicates at the first occurrence.
            first_seen.insert(actor.id, first);
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "actors",
                format!("actors[{i}].id"),
                format!("duplicate actor id {} (first defined at actors[{first}])", actor.id),
            ));
        }

        let token = actor.token.expose_secret();
        if token.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "actors",
                format!("actors[{i}].token"),
                "token is empty",
            ));
        } else if token.contains("${") {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "actors",
                format!("actors[{i}].token"),
                "token contains an unresolved ${...} placeholder",
            ));
        }

        if let Err(e) = UserId::parse(actor.admin.as_str()) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "actors",
                format!("actors[{i}].admin"),
                e.to_string(),
            ));
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}
