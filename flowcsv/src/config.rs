//! Emitter configuration.

use flowcsv_schema::{GroupSet, Schema};
use flowcsv_time::{FixedZone, LocalZone, Zone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text written in place of a value that could not be rendered.
pub const DEFAULT_SENTINEL: &str = "invalid";

/// Errors from config validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("sentinel must not be empty")]
    EmptySentinel,

    #[error("sentinel {0:?} contains a column separator or line break")]
    SentinelSeparator(String),

    #[error("UTC offset {0} s out of range, must be within +/-86399 s")]
    OffsetOutOfRange(i32),
}

/// Emitter configuration.
#[derive(Debug)]
pub struct EmitterConfig {
    pub schema: Schema,
    /// Optional groups rendered under [`Schema::Extended`].
    pub groups: GroupSet,
    pub zone: Box<dyn Zone>,
    pub sentinel: String,
}

impl EmitterConfig {
    /// Minimal schema in host local time.
    pub fn new() -> Self {
        Self {
            schema: Schema::Minimal,
            groups: GroupSet::all(),
            zone: Box::new(LocalZone),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }

    /// Extended schema with every optional group enabled.
    pub fn extended() -> Self {
        Self::new().with_schema(Schema::Extended)
    }

    /// Builder: set schema.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Builder: set enabled optional groups.
    pub fn with_groups(mut self, groups: GroupSet) -> Self {
        self.groups = groups;
        self
    }

    /// Builder: set the zone timestamps are rendered in.
    pub fn with_zone(mut self, zone: impl Zone + 'static) -> Self {
        self.zone = Box::new(zone);
        self
    }

    /// Builder: set sentinel text.
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sentinel.is_empty() {
            return Err(ConfigError::EmptySentinel);
        }
        if self.sentinel.contains([',', '\n', '\r']) {
            return Err(ConfigError::SentinelSeparator(self.sentinel.clone()));
        }
        Ok(())
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable form of [`EmitterConfig`], for settings files.
///
/// Missing fields take their defaults. Without `utc_offset_secs` timestamps
/// follow host local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmitterSettings {
    pub schema: Schema,
    pub groups: GroupSet,
    pub sentinel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset_secs: Option<i32>,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            schema: Schema::Minimal,
            groups: GroupSet::all(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            utc_offset_secs: None,
        }
    }
}

impl EmitterSettings {
    /// Build and validate the runtime config.
    pub fn into_config(self) -> Result<EmitterConfig, ConfigError> {
        let config = EmitterConfig::new()
            .with_schema(self.schema)
            .with_groups(self.groups)
            .with_sentinel(self.sentinel);
        let config = match self.utc_offset_secs {
            Some(secs) => {
                let zone =
                    FixedZone::try_new(secs).map_err(|_| ConfigError::OffsetOutOfRange(secs))?;
                config.with_zone(zone)
            }
            None => config,
        };
        config.validate()?;
        Ok(config)
    }
}
