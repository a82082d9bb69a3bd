//! Runtime configuration and fixed compiler limits.
//!
//! Values come from, in increasing priority: the defaults below, a `.cjenv`
//! file next to the script, the process environment, and finally CLI flags
//! (applied by the binary on the loaded struct).

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};

use crate::object::heap::DEFAULT_BLOCK_SIZE;

/// Name of the optional KEY=VALUE file read from the script directory.
pub const ENV_FILE: &str = ".cjenv";

pub const DEFAULT_STACK_LIMIT: usize = 65536;
pub const DEFAULT_FRAME_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of values on the VM stack.
    pub stack_limit: usize,
    /// Maximum depth of nested calls.
    pub frame_limit: usize,
    /// Number of object slots added each time the heap grows.
    pub heap_block_size: usize,
    /// Collect before every runtime allocation.
    pub gc_stress: bool,
    /// Log every dispatched instruction at trace level.
    pub trace_execution: bool,
    /// Colored diagnostics.
    pub color: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_limit: DEFAULT_STACK_LIMIT,
            frame_limit: DEFAULT_FRAME_LIMIT,
            heap_block_size: DEFAULT_BLOCK_SIZE,
            gc_stress: cfg!(feature = "gc-stress"),
            trace_execution: false,
            color: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, then `dir/.cjenv`, then the process environment.
    pub fn load(dir: &Path) -> Self {
        let mut vars = read_env_file(&dir.join(ENV_FILE));
        vars.extend(std::env::vars().filter(|(k, _)| k.starts_with("CJ_") || k == "NO_COLOR"));
        let mut config = Self::default();
        config.apply(&vars);
        config
    }

    /// Apply recognised `CJ_*` keys from `vars`.
    pub fn apply(&mut self, vars: &HashMap<String, String>) {
        if let Some(v) = parse_var(vars, "CJ_STACK_LIMIT") {
            self.stack_limit = v;
        }
        if let Some(v) = parse_var(vars, "CJ_FRAME_LIMIT") {
            self.frame_limit = v;
        }
        if let Some(v) = parse_var::<usize>(vars, "CJ_HEAP_BLOCK_SIZE") {
            if v == 0 {
                warn!("ignoring CJ_HEAP_BLOCK_SIZE=0");
            } else {
                self.heap_block_size = v;
            }
        }
        if let Some(v) = parse_flag(vars, "CJ_GC_STRESS") {
            self.gc_stress = v;
        }
        if let Some(v) = parse_flag(vars, "CJ_TRACE") {
            self.trace_execution = v;
        }
        if vars.contains_key("NO_COLOR") {
            self.color = false;
        }
        if let Some(v) = parse_flag(vars, "CJ_COLOR") {
            self.color = v;
        }
    }
}

/// Fixed compile-time contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerLimits {
    /// Constants per chunk (8-bit constant index).
    pub max_constants: usize,
    /// Entries per reference table.
    pub max_ref_slots: usize,
    /// Pending `break` or `continue` jumps per loop.
    pub max_loop_jumps: usize,
    /// Arguments per call.
    pub max_arguments: usize,
}

impl Default for CompilerLimits {
    fn default() -> Self {
        Self {
            max_constants: 256,
            max_ref_slots: crate::reftable::MAX_REF_SLOTS,
            max_loop_jumps: 64,
            max_arguments: u8::MAX as usize,
        }
    }
}

/// Parse a `.cjenv` file. A missing or unreadable file yields no entries.
pub fn read_env_file(path: &Path) -> HashMap<String, String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    debug!("loading {}", path.display());
    parse_env(&content)
}

pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

fn parse_var<T: FromStr>(vars: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = vars.get(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}

fn parse_flag(vars: &HashMap<String, String>, key: &str) -> Option<bool> {
    let raw = vars.get(key)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_env_file_format() {
        let parsed = parse_env("# comment\nCJ_TRACE=1\n\nCJ_STACK_LIMIT = \"128\"\nnot a pair\n");
        assert_eq!(parsed.get("CJ_TRACE").map(String::as_str), Some("1"));
        assert_eq!(parsed.get("CJ_STACK_LIMIT").map(String::as_str), Some("128"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = RuntimeConfig::default();
        config.apply(&vars(&[
            ("CJ_STACK_LIMIT", "512"),
            ("CJ_GC_STRESS", "true"),
            ("NO_COLOR", ""),
        ]));
        assert_eq!(config.stack_limit, 512);
        assert!(config.gc_stress);
        assert!(!config.color);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let mut config = RuntimeConfig::default();
        config.apply(&vars(&[("CJ_FRAME_LIMIT", "lots"), ("CJ_HEAP_BLOCK_SIZE", "0")]));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_env_file_is_read_from_script_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ENV_FILE), "CJ_HEAP_BLOCK_SIZE=16\n").unwrap();
        let vars = read_env_file(&dir.path().join(ENV_FILE));
        let mut config = RuntimeConfig::default();
        config.apply(&vars);
        assert_eq!(config.heap_block_size, 16);
    }
}
