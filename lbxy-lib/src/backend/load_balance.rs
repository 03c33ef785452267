use super::upstream::Upstream;
use crate::error::LbxyError;
use rand::Rng;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

/// Constants to specify a load balance option
pub mod load_balance_options {
  pub const RANDOM: &str = "random";
  pub const ROUND_ROBIN: &str = "robin";
}

/// Trait for LB: pick one upstream destination out of the given candidates.
/// Must never panic; an empty candidate list yields `None`.
pub(super) trait LoadBalanceSelect {
  fn select<'a>(&self, upstreams: &'a [Upstream]) -> Option<&'a Upstream>;
}

#[derive(Debug, Clone, Default)]
/// Round Robin LB object carrying the shared position of the last served upstream destination
pub struct LoadBalanceRoundRobin {
  /// Monotonic counter shared among all concurrent selections, reduced modulo the
  /// current number of candidates at each call
  ptr: Arc<AtomicUsize>,
}

impl LoadBalanceSelect for LoadBalanceRoundRobin {
  /// Read-and-increment in a single atomic op so that concurrent callers never
  /// observe the same pre-increment value
  fn select<'a>(&self, upstreams: &'a [Upstream]) -> Option<&'a Upstream> {
    if upstreams.is_empty() {
      return None;
    }
    let current_ptr = self.ptr.fetch_add(1, Ordering::Relaxed);
    upstreams.get(current_ptr % upstreams.len())
  }
}

#[derive(Debug, Clone, Default)]
/// Random LB object choosing an upstream uniformly at random
pub struct LoadBalanceRandom;

impl LoadBalanceSelect for LoadBalanceRandom {
  /// Reservoir sampling over a single forward pass: the i-th candidate replaces the
  /// held one with probability 1/(i+1), which is uniform without knowing the length
  /// in advance. `thread_rng` is per-thread, so concurrent calls are independent.
  fn select<'a>(&self, upstreams: &'a [Upstream]) -> Option<&'a Upstream> {
    let mut rng = rand::thread_rng();
    let mut chosen = None;
    for (count, upstream) in upstreams.iter().enumerate() {
      if rng.gen_range(0..=count) == 0 {
        chosen = Some(upstream);
      }
    }
    chosen
  }
}

#[derive(Debug, Clone)]
/// Load balancing option
pub enum LoadBalance {
  /// Randomly chose one upstream server
  Random(LoadBalanceRandom),
  /// Simple round robin without session persistence
  RoundRobin(LoadBalanceRoundRobin),
}

impl Default for LoadBalance {
  fn default() -> Self {
    Self::Random(LoadBalanceRandom)
  }
}

impl TryFrom<&str> for LoadBalance {
  type Error = LbxyError;

  /// Unknown policy identifiers are rejected here, i.e., at startup, so that a
  /// misconfigured proxy never reaches its first request without a selector.
  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value {
      load_balance_options::RANDOM => Ok(Self::Random(LoadBalanceRandom)),
      load_balance_options::ROUND_ROBIN => Ok(Self::RoundRobin(LoadBalanceRoundRobin::default())),
      _ => Err(LbxyError::UnknownLoadBalancePolicy(value.to_string())),
    }
  }
}

impl LoadBalance {
  /// Get the upstream destination serving the incoming request
  pub fn select<'a>(&self, upstreams: &'a [Upstream]) -> Option<&'a Upstream> {
    match self {
      LoadBalance::Random(inner) => inner.select(upstreams),
      LoadBalance::RoundRobin(inner) => inner.select(upstreams),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn upstreams(n: usize) -> Vec<Upstream> {
    (0..n)
      .map(|i| Upstream::try_from(format!("upstream-{i}.local:{}", 8000 + i).as_str()).unwrap())
      .collect()
  }

  #[test]
  fn round_robin_rotates_in_insertion_order_and_wraps() {
    let candidates = upstreams(3);
    let lb = LoadBalance::try_from("robin").unwrap();

    for round in 0..2 {
      for expected in candidates.iter() {
        let chosen = lb.select(&candidates).unwrap();
        assert_eq!(chosen, expected, "round {round}");
      }
    }
  }

  #[test]
  fn round_robin_counter_has_no_lost_updates_under_contention() {
    let candidates = Arc::new(upstreams(3));
    let lb = LoadBalanceRoundRobin::default();

    let callers = 8;
    let selections_per_caller = 1000;
    let handles: Vec<_> = (0..callers)
      .map(|_| {
        let lb = lb.clone();
        let candidates = candidates.clone();
        std::thread::spawn(move || {
          for _ in 0..selections_per_caller {
            assert!(lb.select(&candidates).is_some());
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    // one atomic increment per selection, exactly
    assert_eq!(lb.ptr.load(Ordering::Relaxed), callers * selections_per_caller);
  }

  #[test]
  fn random_is_roughly_uniform() {
    let candidates = upstreams(4);
    let lb = LoadBalance::try_from("random").unwrap();

    let trials = 100_000usize;
    let mut counts = [0usize; 4];
    for _ in 0..trials {
      let chosen = lb.select(&candidates).unwrap();
      let idx = candidates.iter().position(|u| u == chosen).unwrap();
      counts[idx] += 1;
    }

    // 25% +/- 2% per candidate
    for (idx, count) in counts.iter().enumerate() {
      let freq = *count as f64 / trials as f64;
      assert!((freq - 0.25).abs() < 0.02, "candidate {idx} frequency {freq}");
    }
  }

  #[test]
  fn empty_candidates_yield_none() {
    let empty: Vec<Upstream> = vec![];
    assert!(LoadBalance::try_from("robin").unwrap().select(&empty).is_none());
    assert!(LoadBalance::try_from("random").unwrap().select(&empty).is_none());
  }

  #[test]
  fn unknown_policy_is_rejected() {
    assert!(LoadBalance::try_from("round_robin").is_err());
    assert!(LoadBalance::try_from("").is_err());
  }
}
