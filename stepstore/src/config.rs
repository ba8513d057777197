//! Engine configuration.
//!
//! An [`EngineConfig`] is parsed once from string parameters and is immutable afterwards.
//! Parameter keys are matched case-insensitively:
//!
//! | Key | Value | Default |
//! |-----|-------|---------|
//! | `verbose` | 0 to 5 | 0 |
//! | `jobId` | string | empty |
//! | `experimentName` (`UniqueExperimentName`) | string | empty |
//! | `targetObjectSize` (`TargetObjSize`) | bytes | 8388608 |
//! | `storageTier` | `fast`, `slow`, `archive` (`tape`) | `fast` |
//! | `backendConfigPath` | path to a JSON transport configuration | none |
//! | `collisionPolicy` | `abort`, `overwrite` | `abort` |
//! | `keySeparator` | `/`, `.`, `_` | `/` |
//! | `compression` | `none`, `gzip`, `gzip:<level>` | `none` |
//!
//! Unrecognised keys are ignored.
//!
//! A [`ConfigFile`] bundles parameters, a [`TransportConfig`] and the variable catalog in one JSON document:
//! ```json
//! {
//!     "parameters": { "jobId": "job1", "verbose": 2 },
//!     "transport": { "type": "filesystem", "path": "/tmp/stepstore" },
//!     "variables": [
//!         { "name": "Temperature", "type": "float64", "shape": [2, 4], "start": [0, 0], "count": [2, 2] }
//!     ]
//! }
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use stepstore_object_key::ObjectKeySeparator;
use stepstore_storage::StorageTier;
use thiserror::Error;

use crate::{
    transform::Compression,
    transport::TransportConfig,
    variable::{ElementType, Variable, VariableCatalog, VariableCreateError},
};

/// The default target object size in bytes.
pub const DEFAULT_TARGET_OBJECT_SIZE: u64 = 8 * 1024 * 1024;

/// The largest accepted verbosity.
pub const MAX_VERBOSE: u8 = 5;

/// A configuration error.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A parameter has an invalid value.
    #[error("invalid value {value:?} for parameter {key}: {reason}")]
    InvalidValue {
        /// The parameter key.
        key: String,
        /// The parameter value.
        value: String,
        /// Why the value is invalid.
        reason: String,
    },
    /// A configuration file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The IO error.
        source: std::io::Error,
    },
    /// A configuration file could not be parsed.
    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The JSON error.
        source: serde_json::Error,
    },
    /// A variable in a configuration file is invalid.
    #[error(transparent)]
    Variable(#[from] VariableCreateError),
}

impl ConfigurationError {
    fn invalid(key: &str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What to do when an object already exists at a key the engine is about to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum CollisionPolicy {
    /// Fail with an object collision error.
    #[default]
    #[display("abort")]
    Abort,
    /// Replace the object without checking.
    #[display("overwrite")]
    Overwrite,
}

impl std::str::FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err("expected abort or overwrite".to_string()),
        }
    }
}

/// The engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    verbose: u8,
    job_id: String,
    experiment_name: String,
    target_object_size: u64,
    storage_tier: StorageTier,
    backend_config_path: Option<PathBuf>,
    collision_policy: CollisionPolicy,
    key_separator: ObjectKeySeparator,
    compression: Compression,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            job_id: String::new(),
            experiment_name: String::new(),
            target_object_size: DEFAULT_TARGET_OBJECT_SIZE,
            storage_tier: StorageTier::default(),
            backend_config_path: None,
            collision_policy: CollisionPolicy::default(),
            key_separator: ObjectKeySeparator::default(),
            compression: Compression::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from string parameters.
    ///
    /// Keys are matched case-insensitively. Unrecognised keys are logged and ignored.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if a recognised parameter has an invalid value.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            config.set_param(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: &dyn std::fmt::Display| ConfigurationError::invalid(key, value, reason);
        match key.to_ascii_lowercase().as_str() {
            "verbose" => {
                let verbose = value.trim().parse::<u8>().map_err(|err| invalid(&err))?;
                if verbose > MAX_VERBOSE {
                    return Err(invalid(&format_args!("expected 0 to {MAX_VERBOSE}")));
                }
                self.verbose = verbose;
            }
            "jobid" => value.clone_into(&mut self.job_id),
            "experimentname" | "uniqueexperimentname" => value.clone_into(&mut self.experiment_name),
            "targetobjectsize" | "targetobjsize" => {
                let size = value.trim().parse::<u64>().map_err(|err| invalid(&err))?;
                if size == 0 {
                    return Err(invalid(&"expected a positive size"));
                }
                self.target_object_size = size;
            }
            "storagetier" => self.storage_tier = value.parse().map_err(|err| invalid(&err))?,
            "backendconfigpath" => {
                self.backend_config_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "collisionpolicy" => {
                self.collision_policy = value.parse().map_err(|err: String| invalid(&err))?;
            }
            "keyseparator" => self.key_separator = value.parse().map_err(|err| invalid(&err))?,
            "compression" => self.compression = value.parse().map_err(|err| invalid(&err))?,
            _ => log::debug!("ignoring unrecognised parameter {key}={value}"),
        }
        Ok(())
    }

    /// The verbosity, 0 to 5.
    #[must_use]
    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Set the verbosity.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if `verbose` is greater than 5.
    pub fn set_verbose(&mut self, verbose: u8) -> Result<&mut Self, ConfigurationError> {
        if verbose > MAX_VERBOSE {
            return Err(ConfigurationError::invalid(
                "verbose",
                &verbose.to_string(),
                format_args!("expected 0 to {MAX_VERBOSE}"),
            ));
        }
        self.verbose = verbose;
        Ok(self)
    }

    /// The job identifier.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Set the job identifier.
    pub fn set_job_id(&mut self, job_id: impl Into<String>) -> &mut Self {
        self.job_id = job_id.into();
        self
    }

    /// The experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Set the experiment name.
    pub fn set_experiment_name(&mut self, experiment_name: impl Into<String>) -> &mut Self {
        self.experiment_name = experiment_name.into();
        self
    }

    /// The target object size in bytes.
    #[must_use]
    pub fn target_object_size(&self) -> u64 {
        self.target_object_size
    }

    /// The storage tier.
    #[must_use]
    pub fn storage_tier(&self) -> StorageTier {
        self.storage_tier
    }

    /// Set the storage tier.
    pub fn set_storage_tier(&mut self, storage_tier: StorageTier) -> &mut Self {
        self.storage_tier = storage_tier;
        self
    }

    /// The path of a JSON transport configuration.
    #[must_use]
    pub fn backend_config_path(&self) -> Option<&Path> {
        self.backend_config_path.as_deref()
    }

    /// The collision policy.
    #[must_use]
    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision_policy
    }

    /// Set the collision policy.
    pub fn set_collision_policy(&mut self, collision_policy: CollisionPolicy) -> &mut Self {
        self.collision_policy = collision_policy;
        self
    }

    /// The object key separator.
    #[must_use]
    pub fn key_separator(&self) -> ObjectKeySeparator {
        self.key_separator
    }

    /// The compression.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Set the compression.
    pub fn set_compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }
}

/// A variable declaration in a [`ConfigFile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    /// The name.
    pub name: String,
    /// The element type.
    #[serde(rename = "type")]
    pub element_type: ElementType,
    /// The global shape.
    #[serde(default)]
    pub shape: Vec<u64>,
    /// The global start of the local block.
    #[serde(default)]
    pub start: Vec<u64>,
    /// The shape of the local block.
    #[serde(default)]
    pub count: Vec<u64>,
    /// The version.
    #[serde(default)]
    pub version: u64,
    /// The parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TryFrom<VariableConfig> for Variable {
    type Error = VariableCreateError;

    fn try_from(config: VariableConfig) -> Result<Self, Self::Error> {
        let variable = Variable::new(
            config.name,
            config.element_type,
            config.shape,
            config.start,
            config.count,
        )?
        .with_version(config.version);
        Ok(config
            .params
            .into_iter()
            .fold(variable, |variable, (key, value)| variable.with_param(key, value)))
    }
}

/// A JSON configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Engine parameters. Non-string values are converted to their JSON text.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// The transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,
    /// Variables to declare.
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
}

impl ConfigFile {
    /// Read a configuration file.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        read_json(path.as_ref())
    }

    /// The parameters as strings.
    #[must_use]
    pub fn parameters(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(value) => value.clone(),
                    value => value.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Parse the engine configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if a parameter is invalid.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigurationError> {
        EngineConfig::from_params(self.parameters())
    }

    /// Resolve the transport configuration.
    ///
    /// Uses the `transport` entry if present, then the file at `backendConfigPath`, then an in-memory transport.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if `backendConfigPath` cannot be read or parsed.
    pub fn transport_config(
        &self,
        engine_config: &EngineConfig,
    ) -> Result<TransportConfig, ConfigurationError> {
        if let Some(transport) = &self.transport {
            Ok(transport.clone())
        } else if let Some(path) = engine_config.backend_config_path() {
            TransportConfig::from_path(path)
        } else {
            Ok(TransportConfig::Memory)
        }
    }

    /// Build the catalog of the declared variables.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if a variable is invalid or declared twice.
    pub fn catalog(&self) -> Result<VariableCatalog, ConfigurationError> {
        let variables = self
            .variables
            .iter()
            .cloned()
            .map(Variable::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VariableCatalog::try_from(variables)?)
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigurationError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigurationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = EngineConfig::from_params(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.verbose(), 0);
        assert_eq!(config.target_object_size(), 8_388_608);
        assert_eq!(config.storage_tier(), StorageTier::Fast);
        assert_eq!(config.collision_policy(), CollisionPolicy::Abort);
        assert_eq!(config.key_separator(), ObjectKeySeparator::Slash);
        assert_eq!(config.compression(), Compression::None);
        assert!(config.backend_config_path().is_none());
    }

    #[test]
    fn config_case_insensitive() {
        let config = EngineConfig::from_params([
            ("VERBOSE", "3"),
            ("jobid", "job7"),
            ("UniqueExperimentName", "exp"),
            ("TargetObjSize", "1024"),
            ("StorageTier", "Tape"),
            ("backendConfigPath", "/etc/backend.json"),
            ("collisionPolicy", "Overwrite"),
            ("keySeparator", "."),
            ("compression", "gzip:2"),
        ])
        .unwrap();
        assert_eq!(config.verbose(), 3);
        assert_eq!(config.job_id(), "job7");
        assert_eq!(config.experiment_name(), "exp");
        assert_eq!(config.target_object_size(), 1024);
        assert_eq!(config.storage_tier(), StorageTier::Archive);
        assert_eq!(
            config.backend_config_path(),
            Some(Path::new("/etc/backend.json"))
        );
        assert_eq!(config.collision_policy(), CollisionPolicy::Overwrite);
        assert_eq!(config.key_separator(), ObjectKeySeparator::Dot);
        assert_eq!(config.compression(), Compression::Gzip { level: 2 });
    }

    #[test]
    fn config_invalid_values() {
        for (key, value) in [
            ("verbose", "6"),
            ("verbose", "-1"),
            ("verbose", "loud"),
            ("targetObjectSize", "0"),
            ("targetObjectSize", "big"),
            ("storageTier", "cold"),
            ("collisionPolicy", "retry"),
            ("keySeparator", "-"),
            ("compression", "lz4"),
        ] {
            let err = EngineConfig::from_params([(key, value)]).unwrap_err();
            assert!(
                matches!(&err, ConfigurationError::InvalidValue { key: k, .. } if k == key),
                "{key}={value}: {err}"
            );
        }
    }

    #[test]
    fn config_unrecognised_logged() {
        testing_logger::setup();
        let config = EngineConfig::from_params([("bufferGrowthFactor", "1.5")]).unwrap();
        assert_eq!(config, EngineConfig::default());
        testing_logger::validate(|captured_logs| {
            assert_eq!(captured_logs.len(), 1);
            assert!(captured_logs[0].body.contains("bufferGrowthFactor"));
            assert_eq!(captured_logs[0].level, log::Level::Debug);
        });
    }

    #[test]
    fn config_setters() {
        let mut config = EngineConfig::default();
        config
            .set_job_id("j")
            .set_experiment_name("e")
            .set_storage_tier(StorageTier::Slow)
            .set_collision_policy(CollisionPolicy::Overwrite)
            .set_compression(Compression::None);
        assert!(config.set_verbose(6).is_err());
        assert_eq!(config.set_verbose(5).unwrap().verbose(), 5);
        assert_eq!(config.job_id(), "j");
        assert_eq!(config.storage_tier(), StorageTier::Slow);
    }

    #[test]
    fn config_file() {
        let file: ConfigFile = serde_json::from_str(
            r#"{
                "parameters": { "jobId": "j1", "verbose": 2, "targetObjectSize": 64 },
                "variables": [
                    { "name": "T", "type": "double", "shape": [2, 4], "start": [0, 2], "count": [2, 2] },
                    { "name": "label", "type": "string", "params": { "units": "none" } }
                ]
            }"#,
        )
        .unwrap();
        let config = file.engine_config().unwrap();
        assert_eq!(config.job_id(), "j1");
        assert_eq!(config.verbose(), 2);
        assert_eq!(config.target_object_size(), 64);
        assert_eq!(
            file.transport_config(&config).unwrap(),
            TransportConfig::Memory
        );
        let catalog = file.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("T").unwrap().count(), &[2, 2]);
        assert_eq!(
            catalog.get("label").unwrap().params().get("units").unwrap(),
            "none"
        );
    }

    #[test]
    fn config_file_backend_config_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = dir.path().join("backend.json");
        std::fs::write(&backend, r#"{"type": "filesystem", "path": "/data"}"#).unwrap();
        let mut file = ConfigFile::default();
        file.parameters.insert(
            "backendConfigPath".to_string(),
            serde_json::Value::String(backend.to_string_lossy().into_owned()),
        );
        let config = file.engine_config().unwrap();
        assert_eq!(
            file.transport_config(&config).unwrap(),
            TransportConfig::Filesystem {
                path: PathBuf::from("/data")
            }
        );

        let missing = ConfigFile::from_path(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigurationError::Read { .. })));
        std::fs::write(dir.path().join("bad.json"), "{").unwrap();
        let bad = ConfigFile::from_path(dir.path().join("bad.json"));
        assert!(matches!(bad, Err(ConfigurationError::Parse { .. })));
    }

    #[test]
    fn config_file_duplicate_variable() {
        let file: ConfigFile = serde_json::from_str(
            r#"{"variables": [{"name": "a", "type": "int32"}, {"name": "a", "type": "int32"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            file.catalog(),
            Err(ConfigurationError::Variable(VariableCreateError::Duplicate(_)))
        ));
    }
}
