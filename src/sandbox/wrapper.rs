//! Environment adapter that swaps in a scripted reward.

use tracing::{debug, warn};

use crate::error::TrainError;
use crate::training::env::{Environment, Info, StepResult};

use super::{invoke_reporting, RewardFunction};

/// Wraps an environment and replaces each step's reward with the value of a
/// reward script.
///
/// A script fault keeps the environment's reward for that step. Faults are
/// counted; the first one is logged at `warn`, later ones at `debug`.
pub struct RewardWrapper<E> {
    inner: E,
    reward: RewardFunction,
    faults: usize,
}

impl<E: Environment> RewardWrapper<E> {
    pub fn new(inner: E, reward: RewardFunction) -> Self {
        Self {
            inner,
            reward,
            faults: 0,
        }
    }

    /// Steps on which the script failed and the environment reward was kept.
    pub fn faults(&self) -> usize {
        self.faults
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: Environment> Environment for RewardWrapper<E> {
    fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
        self.inner.reset()
    }

    fn step(&mut self, action: usize) -> Result<StepResult, TrainError> {
        let mut result = self.inner.step(action)?;

        let (reward, fault) = invoke_reporting(
            &self.reward,
            &result.observation,
            result.terminated,
            result.truncated,
            &result.info,
            result.reward,
        );
        if let Some(e) = fault {
            self.faults += 1;
            if self.faults == 1 {
                warn!(
                    error = %e,
                    fallback = result.reward,
                    "Reward function error, keeping environment reward"
                );
            } else {
                debug!(error = %e, faults = self.faults, "Reward function error");
            }
        }
        result.reward = reward;

        Ok(result)
    }

    fn action_count(&self) -> usize {
        self.inner.action_count()
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::compile;
    use crate::training::env::InfoValue;

    /// Counts steps; reward is always -1, `x` in info is the step number.
    struct Counter {
        steps: usize,
        closed: bool,
    }

    impl Environment for Counter {
        fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
            self.steps = 0;
            Ok((vec![0.0], Info::new()))
        }

        fn step(&mut self, _action: usize) -> Result<StepResult, TrainError> {
            self.steps += 1;
            let mut info = Info::new();
            info.insert("x".to_string(), InfoValue::Number(self.steps as f64));
            Ok(StepResult {
                observation: vec![self.steps as f64],
                reward: -1.0,
                terminated: false,
                truncated: self.steps >= 3,
                info,
            })
        }

        fn action_count(&self) -> usize {
            2
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn counter() -> Counter {
        Counter {
            steps: 0,
            closed: false,
        }
    }

    #[test]
    fn test_reward_is_replaced() {
        let reward = compile(
            "def compute_reward(obs, terminated, truncated, info):\n    return info['x'] * 10\n",
        )
        .unwrap();
        let mut env = RewardWrapper::new(counter(), reward);
        env.reset().unwrap();

        assert_eq!(env.step(0).unwrap().reward, 10.0);
        assert_eq!(env.step(1).unwrap().reward, 20.0);
        assert_eq!(env.faults(), 0);
        assert_eq!(env.action_count(), 2);
    }

    #[test]
    fn test_faulting_step_keeps_environment_reward() {
        // Divides by zero on the second step only.
        let reward = compile(
            "def compute_reward(obs, terminated, truncated, info):\n    return 5 / (info['x'] - 2)\n",
        )
        .unwrap();
        let mut env = RewardWrapper::new(counter(), reward);
        env.reset().unwrap();

        assert_eq!(env.step(0).unwrap().reward, -5.0);
        assert_eq!(env.step(0).unwrap().reward, -1.0);
        assert_eq!(env.step(0).unwrap().reward, 5.0);
        assert_eq!(env.faults(), 1);
    }

    #[test]
    fn test_non_numeric_result_counts_as_fault() {
        let reward = compile(
            "def compute_reward(obs, terminated, truncated, info):\n    return 'high'\n",
        )
        .unwrap();
        let mut env = RewardWrapper::new(counter(), reward);
        env.reset().unwrap();

        for _ in 0..3 {
            assert_eq!(env.step(0).unwrap().reward, -1.0);
        }
        assert_eq!(env.faults(), 3);
    }

    #[test]
    fn test_close_reaches_inner_environment() {
        let reward = compile(
            "def compute_reward(obs, terminated, truncated, info):\n    return 0\n",
        )
        .unwrap();
        let mut env = RewardWrapper::new(counter(), reward);
        env.close();
        assert!(env.inner().closed);
        assert!(env.into_inner().closed);
    }
}
