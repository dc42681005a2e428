use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use super::stack_config::{CfgCell, CfgHarq, CfgMac, CfgSps, SchedulerPolicy, SharedConfig, StackConfig};
use crate::ConfigError;

const EXPECTED_CONFIG_VERSION: &str = "0.1";

/// Build `SharedConfig` from a TOML configuration string
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, ConfigError> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    if root.config_version != EXPECTED_CONFIG_VERSION {
        return Err(ConfigError::VersionMismatch {
            found: root.config_version,
            expected: EXPECTED_CONFIG_VERSION,
        });
    }
    reject_extra("top-level", &root.extra)?;
    if let Some(ref cell) = root.cell {
        reject_extra("cell", &cell.extra)?;
    }
    if let Some(ref mac) = root.mac {
        reject_extra("mac", &mac.extra)?;
    }
    if let Some(ref harq) = root.harq {
        reject_extra("harq", &harq.extra)?;
    }
    if let Some(ref sps) = root.sps {
        reject_extra("sps", &sps.extra)?;
    }

    // Start from defaults and patch in whatever the file provides
    let mut cfg = StackConfig {
        debug_log: root.debug_log,
        ..Default::default()
    };
    if let Some(cell) = root.cell {
        apply_cell_patch(&mut cfg.cell, cell);
    }
    if let Some(mac) = root.mac {
        apply_mac_patch(&mut cfg.mac, mac);
    }
    if let Some(harq) = root.harq {
        apply_harq_patch(&mut cfg.harq, harq);
    }
    if let Some(sps) = root.sps {
        apply_sps_patch(&mut cfg.sps, sps);
    }

    SharedConfig::from_config(cfg)
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, ConfigError> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, ConfigError> {
    let f = File::open(path)?;
    from_reader(f)
}

fn apply_cell_patch(dst: &mut CfgCell, src: CellDto) {
    if let Some(v) = src.cell_id {
        dst.cell_id = v;
    }
    if let Some(v) = src.max_ues {
        dst.max_ues = v;
    }
}

fn apply_mac_patch(dst: &mut CfgMac, src: MacDto) {
    if let Some(v) = src.scheduler {
        dst.scheduler = v;
    }
    if let Some(v) = src.rar_delay_subframes {
        dst.rar_delay_subframes = v;
    }
}

fn apply_harq_patch(dst: &mut CfgHarq, src: HarqDto) {
    if let Some(v) = src.num_processes {
        dst.num_processes = v;
    }
    if let Some(v) = src.max_transmissions {
        dst.max_transmissions = v;
    }
    if let Some(v) = src.retx_delay_subframes {
        dst.retx_delay_subframes = v;
    }
}

fn apply_sps_patch(dst: &mut CfgSps, src: SpsDto) {
    if let Some(v) = src.default_interval_ms {
        dst.default_interval_ms = v;
    }
    if let Some(v) = src.default_subcarriers {
        dst.default_subcarriers = v;
    }
    if let Some(v) = src.auto_activate {
        dst.auto_activate = v;
    }
}

fn reject_extra(section: &str, extra: &HashMap<String, Value>) -> Result<(), ConfigError> {
    if extra.is_empty() {
        return Ok(());
    }
    Err(ConfigError::UnknownKeys {
        section: section.to_string(),
        keys: sorted_keys(extra),
    })
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<String> {
    let mut v: Vec<String> = map.keys().cloned().collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,

    #[serde(default)]
    cell: Option<CellDto>,

    #[serde(default)]
    mac: Option<MacDto>,

    #[serde(default)]
    harq: Option<HarqDto>,

    #[serde(default)]
    sps: Option<SpsDto>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct CellDto {
    cell_id: Option<u16>,
    max_ues: Option<usize>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct MacDto {
    scheduler: Option<SchedulerPolicy>,
    rar_delay_subframes: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct HarqDto {
    num_processes: Option<usize>,
    max_transmissions: Option<u8>,
    retx_delay_subframes: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct SpsDto {
    default_interval_ms: Option<u32>,
    default_subcarriers: Option<u8>,
    auto_activate: Option<bool>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
config_version = "0.1"
debug_log = "/tmp/nbiot-enb.log"

[cell]
cell_id = 7
max_ues = 16

[mac]
scheduler = "sps"
rar_delay_subframes = 5

[harq]
num_processes = 1
max_transmissions = 4

[sps]
default_interval_ms = 40
default_subcarriers = 3
auto_activate = true
"#;

    #[test]
    fn test_full_config() {
        let shared = from_toml_str(FULL_CONFIG).unwrap();
        let cfg = shared.config();
        assert_eq!(cfg.debug_log.as_deref(), Some("/tmp/nbiot-enb.log"));
        assert_eq!(cfg.cell.cell_id, 7);
        assert_eq!(cfg.cell.max_ues, 16);
        assert_eq!(cfg.mac.scheduler, SchedulerPolicy::Sps);
        assert_eq!(cfg.mac.rar_delay_subframes, 5);
        assert_eq!(cfg.harq.num_processes, 1);
        assert_eq!(cfg.harq.max_transmissions, 4);
        // Not in file, default applies
        assert_eq!(cfg.harq.retx_delay_subframes, 4);
        assert_eq!(cfg.sps.default_interval_ms, 40);
        assert_eq!(cfg.sps.default_subcarriers, 3);
        assert!(cfg.sps.auto_activate);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let shared = from_toml_str("config_version = \"0.1\"\n").unwrap();
        let cfg = shared.config();
        assert_eq!(cfg.mac.scheduler, SchedulerPolicy::RoundRobin);
        assert_eq!(cfg.harq.num_processes, 2);
        assert_eq!(cfg.sps.default_interval_ms, 20);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let toml = "config_version = \"0.1\"\n[harq]\nnum_procs = 2\n";
        match from_toml_str(toml) {
            Err(ConfigError::UnknownKeys { section, keys }) => {
                assert_eq!(section, "harq");
                assert_eq!(keys, vec!["num_procs".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_version_mismatch() {
        let res = from_toml_str("config_version = \"0.5\"\n");
        assert!(matches!(res, Err(ConfigError::VersionMismatch { .. })));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let toml = "config_version = \"0.1\"\n[harq]\nmax_transmissions = 20\n";
        assert!(matches!(from_toml_str(toml), Err(ConfigError::OutOfRange { field: "harq.max_transmissions", .. })));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let toml = "config_version = \"0.1\"\n[mac]\nscheduler = \"proportional_fair\"\n";
        assert!(matches!(from_toml_str(toml), Err(ConfigError::Parse(_))));
    }
}
