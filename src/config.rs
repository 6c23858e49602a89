use std::str::FromStr;

use tracing::warn;

use crate::reader::ReadLimits;

/// Interpreter limits and GC tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    /// Maximum number of live cells.
    pub heap_capacity: usize,
    /// Allocations between automatic collections.
    pub gc_threshold: usize,
    /// Deepest nesting of `evaluate` calls before `DepthExceeded`.
    pub max_eval_depth: usize,
    /// Deepest list nesting accepted by the reader.
    pub max_read_depth: usize,
    /// Longest symbol or string accepted by the reader, in bytes.
    pub max_token_len: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            heap_capacity: 1_000_000,
            gc_threshold: 4096,
            max_eval_depth: 256,
            max_read_depth: 256,
            max_token_len: 4096,
        }
    }
}

impl MachineConfig {
    /// Defaults, overridden by `CELLISP_HEAP_CAPACITY`, `CELLISP_GC_THRESHOLD`,
    /// `CELLISP_MAX_DEPTH` and `CELLISP_MAX_TOKEN` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = MachineConfig::default();
        override_from(&lookup, "CELLISP_HEAP_CAPACITY", &mut config.heap_capacity);
        override_from(&lookup, "CELLISP_GC_THRESHOLD", &mut config.gc_threshold);
        override_from(&lookup, "CELLISP_MAX_DEPTH", &mut config.max_eval_depth);
        override_from(&lookup, "CELLISP_MAX_TOKEN", &mut config.max_token_len);
        config
    }

    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_token_len: self.max_token_len,
            max_depth: self.max_read_depth,
        }
    }
}

fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_keep_defaults() {
        let config = MachineConfig::from_lookup(|_| None);
        assert_eq!(config, MachineConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = MachineConfig::from_lookup(|key| match key {
            "CELLISP_HEAP_CAPACITY" => Some("5000".into()),
            "CELLISP_MAX_DEPTH" => Some(" 64 ".into()),
            "CELLISP_GC_THRESHOLD" => Some("lots".into()),
            _ => None,
        });
        assert_eq!(config.heap_capacity, 5000);
        assert_eq!(config.max_eval_depth, 64);
        assert_eq!(config.gc_threshold, MachineConfig::default().gc_threshold);
    }

    #[test]
    fn read_limits_follow_config() {
        let config = MachineConfig {
            max_token_len: 10,
            max_read_depth: 3,
            ..MachineConfig::default()
        };
        let limits = config.read_limits();
        assert_eq!(limits.max_token_len, 10);
        assert_eq!(limits.max_depth, 3);
    }
}
