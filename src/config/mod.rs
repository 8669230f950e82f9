//! # Configuration Management
//!
//! Configuration is layered with the `config` crate: built-in defaults, then an
//! optional file (TOML, YAML or JSON by extension), then `KEELSON__`-prefixed
//! environment variables using `__` as the section separator, e.g.
//! `KEELSON__DATABASE__BACKEND=postgres`.

pub mod settings;

pub use settings::{
    AppConfig, BootstrapConfig, ConvergenceConfig, DatabaseConfig, ObservabilityConfig,
    ServerConfig, StoreBackend,
};

use std::path::Path;

use config::{Config, Environment, File};

use crate::errors::{KeelsonError, Result};

pub const ENV_PREFIX: &str = "KEELSON";

/// Load and validate the application configuration.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    build_config(path, None)
}

fn build_config(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<AppConfig> {
    let defaults = Config::try_from(&AppConfig::default())?;

    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = path {
        if !path.exists() {
            return Err(KeelsonError::config(format!(
                "Configuration file '{}' does not exist",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn defaults_load_without_file_or_env() {
        let config = build_config(None, env(&[])).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert!(config.bootstrap.admin_token.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9300

[convergence]
reconcile_delay_ms = 50
"#
        )
        .unwrap();

        let config = build_config(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.server.port, 9300);
        assert_eq!(config.convergence.reconcile_delay_ms, 50);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{"server": {{"port": 9300}}}}"#).unwrap();

        let config = build_config(
            Some(file.path()),
            env(&[
                ("KEELSON__SERVER__PORT", "9400"),
                ("KEELSON__BOOTSTRAP__ADMIN_TOKEN", "kls_0123456789abcdef0123456789abcdef"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 9400);
        assert_eq!(
            config.bootstrap.admin_token.as_deref(),
            Some("kls_0123456789abcdef0123456789abcdef")
        );
    }

    #[test]
    fn invalid_values_fail_validation() {
        let result = build_config(None, env(&[("KEELSON__BOOTSTRAP__ADMIN_TOKEN", "short")]));
        assert!(matches!(result, Err(KeelsonError::Validation { .. })));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = build_config(Some(Path::new("/nonexistent/keelson.toml")), env(&[]));
        assert!(matches!(result, Err(KeelsonError::Config { .. })));
    }
}
