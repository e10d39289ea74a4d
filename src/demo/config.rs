//! Knobs of the starvation check. Defaults replay the classic demo: 10 readers half a second apart,
//! each holding for a second, a writer showing up after 1.8s and a 1s starvation threshold.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::DemoError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub readers: usize,
    pub reader_spawn_interval_ms: u64,
    pub reader_hold_ms: u64,
    pub writer_delay_ms: u64,
    pub writer_hold_ms: u64,
    pub threshold_ms: u64,
    /// skip the optimistic attempt, every reader goes for `read_lock`
    pub pessimistic: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            readers: 10,
            reader_spawn_interval_ms: 500,
            reader_hold_ms: 1_000,
            writer_delay_ms: 1_800,
            writer_hold_ms: 1_000,
            threshold_ms: 1_000,
            pessimistic: false,
        }
    }
}

impl DemoConfig {
    pub fn from_toml(text: &str) -> Result<Self, DemoError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DemoError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn reader_spawn_interval(&self) -> Duration {
        Duration::from_millis(self.reader_spawn_interval_ms)
    }

    pub fn reader_hold(&self) -> Duration {
        Duration::from_millis(self.reader_hold_ms)
    }

    pub fn writer_delay(&self) -> Duration {
        Duration::from_millis(self.writer_delay_ms)
    }

    pub fn writer_hold(&self) -> Duration {
        Duration::from_millis(self.writer_hold_ms)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config = DemoConfig::from_toml("readers = 3\npessimistic = true\n").unwrap();
        assert_eq!(config.readers, 3);
        assert!(config.pessimistic);
        assert_eq!(config.threshold(), Duration::from_secs(1));
        assert_eq!(config.writer_delay(), Duration::from_millis(1_800));
    }

    #[test]
    fn test_empty_file_is_the_default() {
        assert_eq!(DemoConfig::from_toml("").unwrap(), DemoConfig::default());
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(matches!(
            DemoConfig::from_toml("readers = \"many\""),
            Err(DemoError::Config(_))
        ));
        assert!(matches!(
            DemoConfig::from_toml("reader = 1"),
            Err(DemoError::Config(_))
        ));
        assert!(matches!(
            DemoConfig::load("/definitely/not/here.toml"),
            Err(DemoError::Io(_))
        ));
    }
}
