//! Configuration loading helpers
//!
//! Layering (lowest to highest priority):
//! 1. `T::default()` values
//! 2. Config file, format chosen by extension (yaml/yml, toml, json)
//! 3. Environment variables with the given prefix, `__` separating nesting levels

use std::path::Path;

use errors::{ServiceError, ServiceResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// Build the layered figment without extracting it
///
/// A missing file is not an error: defaults and environment still apply.
pub fn build_figment<T>(path: &Path, env_prefix: &str) -> ServiceResult<Figment>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if path.exists() {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ServiceError::InvalidConfig {
                field: path.display().to_string(),
                reason: "config file must have an extension".to_string(),
            })?;

        figment = match extension {
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "toml" => figment.merge(Toml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(ServiceError::InvalidConfig {
                    field: path.display().to_string(),
                    reason: format!("unsupported config format: {}", extension),
                })
            },
        };
        info!("Config file: {}", path.display());
    } else {
        debug!("Config file {} not found, using defaults", path.display());
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load a typed configuration from defaults, file and environment
pub fn load_config<T>(path: impl AsRef<Path>, env_prefix: &str) -> ServiceResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    build_figment::<T>(path.as_ref(), env_prefix)?
        .extract()
        .map_err(|e| ServiceError::Configuration(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        interval_ms: u64,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                interval_ms: 1000,
            }
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Sample = load_config(dir.path().join("absent.yaml"), "CFGTEST_A_").unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "interval_ms: 250").unwrap();

        let cfg: Sample = load_config(&path, "CFGTEST_B_").unwrap();
        assert_eq!(cfg.interval_ms, 250);
        assert_eq!(cfg.name, "default");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.ini");
        std::fs::write(&path, "x=1").unwrap();

        let err = load_config::<Sample>(&path, "CFGTEST_C_").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidConfig { .. }));
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, "{ \"interval_ms\": \"soon\" }").unwrap();

        let err = load_config::<Sample>(&path, "CFGTEST_D_").unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }
}
