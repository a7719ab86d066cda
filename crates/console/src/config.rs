//! Layered configuration: built-in defaults, an optional TOML file,
//! `AVRMON_*` environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use avrmon_core::sim::DEFAULT_STEP_LIMIT;
use avrmon_core::{Chip, MemoryMap};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub chip: Chip,
    /// Bound on every wait for operator input, in milliseconds
    pub timeout_ms: u64,
    /// Instructions the simulated part may run per jump or call
    pub step_limit: u64,
    /// Intel HEX image to load at start
    pub hex: Option<PathBuf>,
    /// Replaces the chip's region bounds
    pub memory_map: Option<MemoryMap>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chip: Chip::default(),
            timeout_ms: 30_000,
            step_limit: DEFAULT_STEP_LIMIT,
            hex: None,
            memory_map: None,
        }
    }
}

/// Values given on the command line; unset ones leave lower layers alone.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip: Option<Chip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex: Option<PathBuf>,
}

impl Config {
    pub fn figment(file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment
            .merge(Env::prefixed("AVRMON_").ignore(&["config"]))
            .merge(Serialized::defaults(overrides))
    }

    pub fn load(file: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Config> {
        if let Some(file) = file {
            anyhow::ensure!(file.exists(), "config file {} not found", file.display());
        }
        let config: Config = Self::figment(file, overrides).extract()?;
        config.memory_map()?;
        Ok(config)
    }

    /// The effective memory map, checked.
    pub fn memory_map(&self) -> anyhow::Result<MemoryMap> {
        let map = self.memory_map.unwrap_or_else(|| self.chip.memory_map());
        map.validate()?;
        Ok(map)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_| {
            let config: Config = Config::figment(None, &Overrides::default()).extract()?;
            assert_eq!(config, Config::default());
            assert_eq!(config.memory_map().unwrap(), MemoryMap::ATMEGA328P);
            Ok(())
        });
    }

    #[test]
    fn test_layering() {
        Jail::expect_with(|jail| {
            jail.create_file("avrmon.toml", "chip = \"atmega32u4\"\ntimeout_ms = 250\nstep_limit = 10")?;
            jail.set_env("AVRMON_TIMEOUT_MS", "900");
            let overrides = Overrides { step_limit: Some(42), ..Overrides::default() };
            let config: Config = Config::figment(Some(Path::new("avrmon.toml")), &overrides).extract()?;
            assert_eq!(config.chip, Chip::Atmega32u4);
            assert_eq!(config.timeout_ms, 900);
            assert_eq!(config.step_limit, 42);
            assert_eq!(config.memory_map().unwrap(), MemoryMap::ATMEGA32U4);
            Ok(())
        });
    }

    #[test]
    fn test_custom_memory_map_is_validated() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bad.toml",
                r#"
                [memory_map]
                registers = { start = 0, end = 31 }
                io = { start = 32, end = 300 }
                data = { start = 256, end = 2303 }
                code = { start = 0, end = 32767 }
                "#,
            )?;
            assert!(Config::load(Some(Path::new("bad.toml")), &Overrides::default()).is_err());

            jail.create_file(
                "small.toml",
                r#"
                [memory_map]
                registers = { start = 0, end = 31 }
                io = { start = 32, end = 255 }
                data = { start = 256, end = 1279 }
                code = { start = 0, end = 16383 }
                "#,
            )?;
            let config = Config::load(Some(Path::new("small.toml")), &Overrides::default()).unwrap();
            assert_eq!(config.memory_map().unwrap().data.end, 1279);

            // 32 bytes of SRAM cannot hold the snapshot buffer and a stack
            jail.create_file(
                "tiny.toml",
                r#"
                [memory_map]
                registers = { start = 0, end = 31 }
                io = { start = 32, end = 255 }
                data = { start = 256, end = 287 }
                code = { start = 0, end = 32767 }
                "#,
            )?;
            let err = Config::load(Some(Path::new("tiny.toml")), &Overrides::default()).unwrap_err();
            assert!(err.to_string().contains("too small"), "{err}");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        Jail::expect_with(|_| {
            assert!(Config::load(Some(Path::new("nope.toml")), &Overrides::default()).is_err());
            Ok(())
        });
    }
}
