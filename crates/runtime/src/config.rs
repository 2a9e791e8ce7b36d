//! VM tuning knobs, loadable from a TOML file.
//!
//! Mirrors the teacher's `compiler/src/config.rs` TOML-based lint
//! configuration, scaled down to the two numbers a VM actually needs to
//! tune: how deep the call-frame stack goes before `"Stack overflow."`, and
//! how much value-stack capacity to reserve up front.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Config {
    pub frames_max: usize,
    pub stack_reserve: usize,
}

impl Config {
    /// Read `path` as TOML, falling back to `Config::default()` if the file
    /// is absent; a present-but-malformed file is still an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| format!("reading {path:?}: {e}"))?;
        toml::from_str(&text).map_err(|e| format!("parsing {path:?}: {e}"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            frames_max: 64,
            stack_reserve: 64 * 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/wisp-config-test.toml").unwrap();
        assert_eq!(config.frames_max, 64);
        assert_eq!(config.stack_reserve, 64 * 256);
    }

    #[test]
    fn parses_a_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wisp.toml");
        std::fs::write(&path, "frames_max = 128\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.frames_max, 128);
        assert_eq!(config.stack_reserve, 64 * 256);
    }
}
