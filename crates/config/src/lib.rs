//! Configuration loading and validation for the relaygram binary.
//!
//! Config files: `relaygram.toml`, `relaygram.yaml`/`.yml` or
//! `relaygram.json`, searched in `./` then the user config dir.
//! `${ENV_VAR}` placeholders are expanded before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, find_config_file, load_config, load_or_discover},
    schema::{ActorConfig, RelaygramConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_str},
};
