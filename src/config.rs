//! Configuration types for the simulator.
//!
//! Every struct deserializes from JSON with per-field defaults so scenario
//! files only need to spell out what they change.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agents::ExchangeConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Simulated advance per wall-clock tick, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    200
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl KernelConfig {
    pub fn tick_ns(&self) -> u64 {
        self.tick_ms * 1_000_000
    }
}

/// Two-stage RPC latency model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLatencyConfig {
    /// Agent-to-exchange network delay, milliseconds.
    #[serde(default = "default_rpc_up_ms")]
    pub rpc_up_ms: u64,
    /// Exchange-to-agent network delay, milliseconds.
    #[serde(default = "default_rpc_down_ms")]
    pub rpc_down_ms: u64,
    /// In-exchange processing delay, milliseconds.
    #[serde(default = "default_compute_ms")]
    pub compute_ms: u64,
    /// Symmetric uniform jitter on the downlink, milliseconds.
    #[serde(default)]
    pub down_jitter_ms: u64,
    /// Seed for the jitter PRNG.
    #[serde(default = "default_latency_seed")]
    pub seed: u64,
}

fn default_rpc_up_ms() -> u64 {
    200
}

fn default_rpc_down_ms() -> u64 {
    200
}

fn default_compute_ms() -> u64 {
    300
}

fn default_latency_seed() -> u64 {
    1
}

impl Default for RpcLatencyConfig {
    fn default() -> Self {
        Self {
            rpc_up_ms: default_rpc_up_ms(),
            rpc_down_ms: default_rpc_down_ms(),
            compute_ms: default_compute_ms(),
            down_jitter_ms: 0,
            seed: default_latency_seed(),
        }
    }
}

/// Top-level scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub kernel: KernelConfig,
    /// Absent means zero latency everywhere.
    #[serde(default)]
    pub latency: Option<RpcLatencyConfig>,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Seed from which per-agent PRNG seeds are derived.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_noise_traders")]
    pub noise_traders: u32,
    /// Directory for CSV sinks; absent disables them.
    #[serde(default)]
    pub logs_dir: Option<String>,
    /// HTTP gateway port; absent disables the gateway.
    #[serde(default)]
    pub api_port: Option<u16>,
    /// WebSocket event feed port; absent disables it.
    #[serde(default)]
    pub ws_port: Option<u16>,
    /// Run wall-paced instead of as fast as possible.
    #[serde(default)]
    pub realtime: bool,
    #[serde(default = "default_max_ticks")]
    pub max_ticks: usize,
}

fn default_noise_traders() -> u32 {
    4
}

fn default_max_ticks() -> usize {
    600
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            kernel: KernelConfig::default(),
            latency: None,
            exchange: ExchangeConfig::default(),
            seed: 0,
            noise_traders: default_noise_traders(),
            logs_dir: None,
            api_port: None,
            ws_port: None,
            realtime: false,
            max_ticks: default_max_ticks(),
        }
    }
}

impl ScenarioConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_defaults() {
        let cfg: KernelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.tick_ms, 200);
        assert_eq!(cfg.tick_ns(), 200_000_000);
    }

    #[test]
    fn rpc_latency_defaults() {
        let cfg: RpcLatencyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.rpc_up_ms, 200);
        assert_eq!(cfg.rpc_down_ms, 200);
        assert_eq!(cfg.compute_ms, 300);
        assert_eq!(cfg.down_jitter_ms, 0);
    }

    #[test]
    fn scenario_overrides_merge_with_defaults() {
        let cfg: ScenarioConfig = serde_json::from_str(
            r#"{"kernel": {"tick_ms": 50}, "exchange": {"symbol": "XYZ"}, "noise_traders": 2}"#,
        )
        .unwrap();
        assert_eq!(cfg.kernel.tick_ms, 50);
        assert_eq!(cfg.exchange.symbol, "XYZ");
        assert_eq!(cfg.exchange.md_depth, 10);
        assert_eq!(cfg.noise_traders, 2);
        assert!(cfg.latency.is_none());
    }
}
