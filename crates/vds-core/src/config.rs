use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VdsError;

/// Producer slot capacity shared by both sources. Must stay a power of two.
pub const NUM_BUFFER_SLOTS: usize = 32;

/// What happens when a protocol method is called out of phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolChecks {
    /// Log a warning and continue with best-effort state.
    #[default]
    Warn,
    /// Panic. Meant for test suites that want strict ordering.
    Abort,
}

/// Per-display configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdsConfig {
    /// Display label used in logs and in the scratch consumer name.
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Route GLES-only frames through the compositor (GLES is upgraded to MIXED).
    #[serde(default)]
    pub force_hwc_copy: bool,

    #[serde(default)]
    pub protocol_checks: ProtocolChecks,

    /// Buffer count requested from the sink at construction (left to the sink when absent).
    #[serde(default)]
    pub sink_buffer_count: Option<usize>,

    /// Max buffers the scratch pool may hand out.
    #[serde(default = "default_scratch_max_buffer_count")]
    pub scratch_max_buffer_count: usize,
}

fn default_display_name() -> String {
    "virtual".to_string()
}
fn default_scratch_max_buffer_count() -> usize {
    2
}

impl Default for VdsConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            force_hwc_copy: false,
            protocol_checks: ProtocolChecks::default(),
            sink_buffer_count: None,
            scratch_max_buffer_count: default_scratch_max_buffer_count(),
        }
    }
}

impl VdsConfig {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, VdsError> {
        let cfg: VdsConfig = serde_json::from_str(json).map_err(|source| VdsError::Json {
            path: "<inline>".into(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, VdsError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| VdsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: VdsConfig = serde_json::from_slice(&bytes).map_err(|source| VdsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), VdsError> {
        if self.scratch_max_buffer_count == 0 || self.scratch_max_buffer_count > NUM_BUFFER_SLOTS {
            return Err(VdsError::invalid_config(format!(
                "scratch_max_buffer_count must be in 1..={NUM_BUFFER_SLOTS}, got {}",
                self.scratch_max_buffer_count
            )));
        }
        if let Some(n) = self.sink_buffer_count {
            if n == 0 || n > NUM_BUFFER_SLOTS {
                return Err(VdsError::invalid_config(format!(
                    "sink_buffer_count must be in 1..={NUM_BUFFER_SLOTS}, got {n}"
                )));
            }
            // Sink slots count up from 0, scratch slots down from the top.
            if n + self.scratch_max_buffer_count > NUM_BUFFER_SLOTS {
                return Err(VdsError::invalid_config(format!(
                    "sink ({n}) and scratch ({}) buffer counts exceed {NUM_BUFFER_SLOTS} slots",
                    self.scratch_max_buffer_count
                )));
            }
        }
        Ok(())
    }
}
