//! Latency models: per-message transit and processing delays.
//!
//! A model is a pure function of the (from, to) pair and its own PRNG state.
//! The kernel treats an absent model as zero latency everywhere.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RpcLatencyConfig;
use crate::messages::AgentId;

pub trait LatencyModel {
    /// Network transit delay in nanoseconds for a message from `from` to
    /// `to`.
    fn delay_ns(&mut self, from: AgentId, to: AgentId) -> u64;

    /// Processing delay at the recipient. The kernel adds this only when
    /// the recipient is the exchange and the sender is not.
    fn compute_ns(&mut self, _to: AgentId) -> u64 {
        0
    }
}

/// Constant network and compute delays, independent of the pair.
pub struct FixedLatency {
    network_delay_ns: u64,
    compute_delay_ns: u64,
}

impl FixedLatency {
    pub fn new(network_delay_ns: u64, compute_delay_ns: u64) -> Self {
        Self {
            network_delay_ns,
            compute_delay_ns,
        }
    }
}

impl LatencyModel for FixedLatency {
    fn delay_ns(&mut self, _from: AgentId, _to: AgentId) -> u64 {
        self.network_delay_ns
    }

    fn compute_ns(&mut self, _to: AgentId) -> u64 {
        self.compute_delay_ns
    }
}

/// Two-stage RPC latency: uplink toward the exchange, compute at the
/// exchange, downlink back out, with optional symmetric uniform jitter on
/// the downlink. Traffic between two non-exchange agents transits at zero.
pub struct RpcLatency {
    exchange_id: AgentId,
    up_ns: u64,
    down_ns: u64,
    compute_delay_ns: u64,
    jitter_ns: u64,
    rng: StdRng,
}

impl RpcLatency {
    pub fn new(
        exchange_id: AgentId,
        up_ns: u64,
        down_ns: u64,
        compute_delay_ns: u64,
        jitter_ns: u64,
        seed: u64,
    ) -> Self {
        Self {
            exchange_id,
            up_ns,
            down_ns,
            compute_delay_ns,
            jitter_ns,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(exchange_id: AgentId, cfg: &RpcLatencyConfig) -> Self {
        Self::new(
            exchange_id,
            cfg.rpc_up_ms * 1_000_000,
            cfg.rpc_down_ms * 1_000_000,
            cfg.compute_ms * 1_000_000,
            cfg.down_jitter_ms * 1_000_000,
            cfg.seed,
        )
    }

    fn jitter(&mut self) -> i64 {
        if self.jitter_ns == 0 {
            return 0;
        }
        let j = self.jitter_ns as i64;
        self.rng.gen_range(-j..=j)
    }
}

impl LatencyModel for RpcLatency {
    fn delay_ns(&mut self, from: AgentId, to: AgentId) -> u64 {
        if to == self.exchange_id && from != self.exchange_id {
            self.up_ns
        } else if from == self.exchange_id && to != self.exchange_id {
            let jittered = self.down_ns as i64 + self.jitter();
            jittered.max(0) as u64
        } else {
            0
        }
    }

    fn compute_ns(&mut self, to: AgentId) -> u64 {
        if to == self.exchange_id {
            self.compute_delay_ns
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXCHANGE: AgentId = 1;

    #[test]
    fn fixed_latency_is_uniform() {
        let mut lat = FixedLatency::new(1_000_000, 500_000);
        assert_eq!(lat.delay_ns(2, 3), 1_000_000);
        assert_eq!(lat.compute_ns(1), 500_000);
    }

    #[test]
    fn rpc_uplink_and_downlink() {
        let mut lat = RpcLatency::new(EXCHANGE, 200, 300, 400, 0, 1);
        assert_eq!(lat.delay_ns(5, EXCHANGE), 200);
        assert_eq!(lat.delay_ns(EXCHANGE, 5), 300);
        // Agent-to-agent transit is free.
        assert_eq!(lat.delay_ns(5, 6), 0);
        assert_eq!(lat.compute_ns(EXCHANGE), 400);
        assert_eq!(lat.compute_ns(5), 0);
    }

    #[test]
    fn downlink_jitter_stays_in_bounds() {
        let mut lat = RpcLatency::new(EXCHANGE, 0, 1_000, 0, 100, 42);
        for _ in 0..1_000 {
            let d = lat.delay_ns(EXCHANGE, 7);
            assert!((900..=1_100).contains(&d), "jittered delay {d} out of bounds");
        }
    }

    #[test]
    fn same_seed_same_jitter_sequence() {
        let mut a = RpcLatency::new(EXCHANGE, 0, 1_000, 0, 250, 99);
        let mut b = RpcLatency::new(EXCHANGE, 0, 1_000, 0, 250, 99);
        for _ in 0..100 {
            assert_eq!(a.delay_ns(EXCHANGE, 3), b.delay_ns(EXCHANGE, 3));
        }
    }

    #[test]
    fn jitter_never_underflows() {
        // Jitter wider than the base delay clamps at zero.
        let mut lat = RpcLatency::new(EXCHANGE, 0, 50, 0, 500, 7);
        for _ in 0..1_000 {
            let _ = lat.delay_ns(EXCHANGE, 2);
        }
    }
}
