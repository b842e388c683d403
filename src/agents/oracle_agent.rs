//! Oracle: periodically broadcasts a fundamental-value tick.
//!
//! The fundamental follows a seeded random walk around its base price, so a
//! run is reproducible from the configuration alone.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agents::Agent;
use crate::messages::{AgentId, MessagePayload, MessageType, OracleTickPayload, SimulatorApi};

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub name: String,
    pub symbol: String,
    /// Starting fundamental in cents.
    pub base_price: u64,
    /// Maximum absolute step per tick, cents.
    pub max_step: u64,
    pub wake_interval_ms: u64,
    pub seed: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            name: "Oracle".to_string(),
            symbol: "ACME".to_string(),
            base_price: 10_000,
            max_step: 25,
            wake_interval_ms: 1_000,
            seed: 11,
        }
    }
}

pub struct OracleAgent {
    id: AgentId,
    name: String,
    symbol: String,
    fundamental: u64,
    max_step: u64,
    wake_interval_ns: u64,
    rng: StdRng,
    ticks: u64,
}

impl OracleAgent {
    pub fn new(id: AgentId, config: OracleConfig) -> Self {
        Self {
            id,
            name: config.name,
            symbol: config.symbol,
            fundamental: config.base_price,
            max_step: config.max_step,
            wake_interval_ns: config.wake_interval_ms * 1_000_000,
            rng: StdRng::seed_from_u64(config.seed),
            ticks: 0,
        }
    }

    fn step(&mut self) -> u64 {
        let step = self.rng.gen_range(-(self.max_step as i64)..=self.max_step as i64);
        // The walk floors at 1 cent.
        self.fundamental = (self.fundamental as i64 + step).max(1) as u64;
        self.fundamental
    }
}

impl Agent for OracleAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        info!(
            "[Oracle {}] starting for symbol {} at base {}",
            self.name, self.symbol, self.fundamental
        );
        let now = sim.now_ns();
        sim.wakeup(self.id, now);
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        self.ticks += 1;
        let fundamental = self.step();
        debug!(
            "[Oracle {}] tick {} at t={} ns -> fundamental={}",
            self.name, self.ticks, now_ns, fundamental
        );

        sim.broadcast(
            self.id,
            MessageType::OracleTick,
            MessagePayload::OracleTick(OracleTickPayload {
                symbol: self.symbol.clone(),
                fundamental,
            }),
        );

        sim.wakeup(self.id, now_ns.saturating_add(self.wake_interval_ns));
    }

    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
        info!(
            "[Oracle {}] stopping after {} ticks, fundamental={}",
            self.name, self.ticks, self.fundamental
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_deterministic_for_a_seed() {
        let cfg = OracleConfig {
            seed: 5,
            ..OracleConfig::default()
        };
        let mut a = OracleAgent::new(1, cfg.clone());
        let mut b = OracleAgent::new(1, cfg);
        for _ in 0..50 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn walk_never_reaches_zero() {
        let cfg = OracleConfig {
            base_price: 2,
            max_step: 100,
            seed: 3,
            ..OracleConfig::default()
        };
        let mut oracle = OracleAgent::new(1, cfg);
        for _ in 0..500 {
            assert!(oracle.step() >= 1);
        }
    }
}
