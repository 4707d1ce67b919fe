//! # Summary
//!
//! This module simulates intermittent node failures. A background task
//! periodically flips a coin for the local acceptor: on failure the acceptor
//! starts rejecting everything, on success a failed acceptor recovers. From
//! the outside this is indistinguishable from a crashed or partitioned peer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio::time;

/// Whether the local acceptor is currently answering. Cheap to clone; all
/// clones share one flag.
#[derive(Clone, Debug)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Liveness(Arc::new(AtomicBool::new(true)))
    }
}

impl Liveness {
    pub fn new() -> Self {
        Liveness::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns the previous state.
    pub fn set_active(&self, active: bool) -> bool {
        self.0.swap(active, Ordering::SeqCst)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FailureConfig {
    /// Whether the simulator runs at all
    pub enabled: bool,

    /// Wait before the first draw
    pub delay: Duration,

    /// Time between draws
    pub interval: Duration,

    /// Chance that a draw takes the acceptor down
    pub probability: f64,

    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for FailureConfig {
    fn default() -> Self {
        FailureConfig {
            enabled: true,
            delay: Duration::from_secs(15),
            interval: Duration::from_secs(15),
            probability: 0.2,
            seed: None,
        }
    }
}

impl FailureConfig {
    pub fn disabled() -> Self {
        FailureConfig {
            enabled: false,
            ..FailureConfig::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Clamped to `[0, 1]`.
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Handle to the running simulator. Dropping it stops the task.
#[derive(Debug)]
pub struct Simulator {
    handle: JoinHandle<()>,
}

impl Simulator {
    /// Spawns the simulator on the current tokio runtime.
    pub fn spawn(name: String, liveness: Liveness, config: FailureConfig) -> Self {
        let mut rng = match config.seed {
        | Some(seed) => StdRng::seed_from_u64(seed),
        | None => StdRng::from_entropy(),
        };
        let probability = config.with_probability(config.probability).probability;
        let interval = std::cmp::max(config.interval, Duration::from_millis(1));
        debug!("starting failure simulator for {} with p = {}", name, probability);
        let handle = tokio::spawn(async move {
            let mut ticks = time::interval_at(time::Instant::now() + config.delay, interval);
            loop {
                ticks.tick().await;
                step(&name, &liveness, rng.gen_bool(probability));
            }
        });
        Simulator { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn step(name: &str, liveness: &Liveness, failed: bool) {
    if failed {
        if liveness.set_active(false) {
            warn!("{} simulating failure", name);
        }
    } else if !liveness.set_active(true) {
        info!("{} recovered from simulated failure", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(probability: f64) -> FailureConfig {
        FailureConfig::default()
            .with_delay(Duration::from_secs(1))
            .with_interval(Duration::from_secs(1))
            .with_probability(probability)
            .with_seed(7)
    }

    #[test]
    fn step_fails_and_recovers() {
        let liveness = Liveness::new();
        step("n", &liveness, true);
        assert!(!liveness.is_active());
        step("n", &liveness, true);
        assert!(!liveness.is_active());
        step("n", &liveness, false);
        assert!(liveness.is_active());
    }

    #[test]
    fn probability_is_clamped() {
        assert_eq!(FailureConfig::default().with_probability(3.0).probability, 1.0);
        assert_eq!(FailureConfig::default().with_probability(-1.0).probability, 0.0);
        assert_eq!(FailureConfig::default().with_probability(f64::NAN).probability, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_initial_delay() {
        let liveness = Liveness::new();
        let _simulator = Simulator::spawn("n".into(), liveness.clone(), quick(1.0));
        time::sleep(Duration::from_millis(500)).await;
        assert!(liveness.is_active());
        time::sleep(Duration::from_millis(600)).await;
        assert!(!liveness.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_draws_succeed() {
        let liveness = Liveness::new();
        liveness.set_active(false);
        let _simulator = Simulator::spawn("n".into(), liveness.clone(), quick(0.0));
        time::sleep(Duration::from_millis(1500)).await;
        assert!(liveness.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_toggling() {
        let liveness = Liveness::new();
        let simulator = Simulator::spawn("n".into(), liveness.clone(), quick(1.0));
        simulator.stop();
        time::sleep(Duration::from_secs(5)).await;
        assert!(liveness.is_active());
    }
}
