//! End-to-end experiment runs against small in-process environments.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reward_forge::experiment::{ExperimentRunner, GenerationPlan};
use reward_forge::registry::RewardRegistry;
use reward_forge::training::{
    Environment, Info, InfoValue, StepResult, TrainingConfig, UniformBinDiscretizer,
};
use reward_forge::TrainError;

/// A 4x4 grid. Actions: 0 up, 1 down, 2 left, 3 right. The goal is (3, 3).
struct Grid {
    position: (i64, i64),
    steps: usize,
    closes: Arc<AtomicUsize>,
}

impl Grid {
    fn observation(&self) -> Vec<f64> {
        vec![self.position.0 as f64, self.position.1 as f64]
    }
}

impl Environment for Grid {
    fn reset(&mut self) -> Result<(Vec<f64>, Info), TrainError> {
        self.position = (0, 0);
        self.steps = 0;
        Ok((self.observation(), Info::new()))
    }

    fn step(&mut self, action: usize) -> Result<StepResult, TrainError> {
        let (dx, dy) = match action {
            0 => (0, -1),
            1 => (0, 1),
            2 => (-1, 0),
            3 => (1, 0),
            _ => return Err(TrainError::Environment(format!("bad action {}", action))),
        };
        self.position = (
            (self.position.0 + dx).clamp(0, 3),
            (self.position.1 + dy).clamp(0, 3),
        );
        self.steps += 1;

        let terminated = self.position == (3, 3);
        let mut info = Info::new();
        info.insert(
            "position".to_string(),
            InfoValue::from(vec![self.position.0 as f64, self.position.1 as f64]),
        );
        info.insert("steps".to_string(), InfoValue::from(self.steps as i64));
        Ok(StepResult {
            observation: self.observation(),
            reward: if terminated { 1.0 } else { 0.0 },
            terminated,
            truncated: self.steps >= 50,
            info,
        })
    }

    fn action_count(&self) -> usize {
        4
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn grid_runner(closes: Arc<AtomicUsize>) -> ExperimentRunner {
    ExperimentRunner::new(
        "grid",
        move || {
            Box::new(Grid {
                position: (0, 0),
                steps: 0,
                closes: Arc::clone(&closes),
            }) as Box<dyn Environment>
        },
        UniformBinDiscretizer::uniform(&[(0.0, 3.0), (0.0, 3.0)], 4),
        RewardRegistry::in_memory(),
    )
    .with_training_config(TrainingConfig::default().with_seed(2024).with_log_every(0))
}

const GOAL_REWARD: &str = r#"
def compute_reward(obs, terminated, truncated, info):
    s1, s2 = obs
    if terminated and info.get('position') == (3, 3):
        return 10.0
    return -0.1
"#;

#[test]
fn test_constant_reward_twenty_episodes() {
    let closes = Arc::new(AtomicUsize::new(0));
    let mut runner = grid_runner(Arc::clone(&closes));
    runner.add_manual_reward(
        "Constant",
        Some("def compute_reward(obs, terminated, truncated, info):\n    return 1.0\n".to_string()),
    );

    let results = runner.run(20);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].raw.len(), 20);
    assert_eq!(results[0].window, 5);
    assert_eq!(results[0].smoothed.len(), 16);
    assert_eq!(results[0].reward_faults, 0);
    // Constant 1.0 per step makes each episode's total its length.
    assert!(results[0].raw.iter().all(|&total| (6.0..=50.0).contains(&total)));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_candidates_compared_with_shared_metric() {
    let mut runner = grid_runner(Arc::default()).with_metric(|infos: &[Info]| {
        infos
            .last()
            .and_then(|info| info.get("steps"))
            .and_then(InfoValue::as_f64)
            .unwrap_or(0.0)
    });
    runner.add_manual_reward("Default", None);
    runner.add_manual_reward("Goal", Some(GOAL_REWARD.to_string()));
    runner.add_manual_reward("Prose", Some("Here is your reward function.".to_string()));

    runner.run(300);
    let report = runner.report();

    assert_eq!(report.episodes, 300);
    assert_eq!(report.candidates.len(), 2);
    let goal = report.candidate("Goal").expect("goal candidate trained");
    assert_eq!(goal.window, 15);
    assert_eq!(goal.smoothed.len(), 286);
    assert_eq!(goal.reward_faults, 0);

    // Learning shortens episodes towards the 6-step optimum.
    let early = goal.smoothed[0];
    let late = goal.final_mean.expect("non-empty history");
    assert!(late < early, "late {} early {}", late, early);
    assert!(report.candidate("Prose").is_none());
}

#[test]
fn test_plan_example_parses() {
    let plan = GenerationPlan::from_yaml_str(
        "prompt: |\n  Write compute_reward for a 4x4 grid.\nmodels:\n  - openai/gpt-4o-mini\n  - google/gemini-2.0-flash-001\n",
    )
    .unwrap();
    plan.validate().unwrap();
    assert_eq!(plan.models.len(), 2);
}
