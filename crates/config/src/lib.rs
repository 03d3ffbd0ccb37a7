//! Configuration loading, validation, env substitution and the starter
//! template.
//!
//! Config files: `courier.toml`, `courier.yaml`/`courier.yml`, or
//! `courier.json`, searched in `./` then the user config directory
//! (`~/.config/courier/` on Linux).
//!
//! `${ENV_VAR}` and `${ENV_VAR:-fallback}` are substituted before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, load, load_config, write_template},
    schema::{CommonConfig, CourierConfig, DEFAULT_PORT, MattermostConfig, ServerConfig},
    validate::{Diagnostic, Purpose, Severity, ValidationResult},
};
