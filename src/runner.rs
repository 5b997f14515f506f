use anyhow::Result;
use owo_colors::OwoColorize;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actions::{CALL, CHECK, FOLD};
use crate::engine::Engine;
use crate::env::PokerEnv;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Uniform over the legal actions.
    #[default]
    Random,
    /// Check when possible, otherwise call.
    Passive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub episodes: u32,
    pub seed: Option<u64>,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub no_color: bool,
    pub max_steps_per_episode: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            episodes: 1,
            seed: None,
            policy: Policy::Random,
            no_color: false,
            max_steps_per_episode: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunSummary {
    pub episodes: u32,
    pub steps: u64,
    pub total_reward: f32,
    pub connection_failures: u32,
    /// Console lines the engine printed over the run.
    pub engine_output_lines: u64,
}

impl RunSummary {
    pub fn mean_reward(&self) -> f32 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_reward / self.episodes as f32
        }
    }
}

/// Plays whole episodes against the engine with a fixed policy.
pub struct Runner<E: Engine> {
    config: RunnerConfig,
    env: PokerEnv<E>,
    rng: StdRng,
}

impl<E: Engine> Runner<E> {
    pub fn new(env: PokerEnv<E>, config: RunnerConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            config,
            env,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn env(&self) -> &PokerEnv<E> {
        &self.env
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for episode in 0..self.config.episodes {
            if let Err(err) = self.env.reset() {
                self.log_engine_output(episode);
                return Err(err.into());
            }
            let mut steps = 0u32;
            loop {
                if steps >= self.config.max_steps_per_episode {
                    warn!(episode, steps, "step limit reached, abandoning episode");
                    break;
                }
                let action = self.choose();
                let outcome = self.env.step(action)?;
                steps += 1;
                summary.total_reward += outcome.reward;
                if outcome.done {
                    if self.env.link_failed() {
                        summary.connection_failures += 1;
                    }
                    break;
                }
            }
            summary.episodes += 1;
            summary.steps += u64::from(steps);
            summary.engine_output_lines += self.log_engine_output(episode);
        }

        self.env.close();
        Ok(summary)
    }

    fn log_engine_output(&mut self, episode: u32) -> u64 {
        let lines = self.env.drain_engine_output();
        for line in &lines {
            debug!(episode, engine = %line, "engine output");
        }
        lines.len() as u64
    }

    fn choose(&mut self) -> usize {
        let legal = self.env.legal_actions();
        match self.config.policy {
            Policy::Random => legal.choose(&mut self.rng).copied().unwrap_or(CHECK),
            Policy::Passive => [CHECK, CALL, FOLD]
                .into_iter()
                .find(|action| legal.contains(action))
                .unwrap_or(CHECK),
        }
    }

    pub fn print_summary(&self, summary: &RunSummary) {
        if self.config.no_color {
            println!(
                "Summary: episodes={}, steps={}, total reward={:.4}, mean reward={:.4}, connection failures={}",
                summary.episodes,
                summary.steps,
                summary.total_reward,
                summary.mean_reward(),
                summary.connection_failures
            );
        } else {
            println!(
                "{} {} {} {} {} {:.4} {} {:.4} {} {}",
                "Summary".bold().magenta(),
                summary.episodes,
                "Steps".bold().white(),
                summary.steps,
                "Total reward".bold().white(),
                summary.total_reward,
                "Mean".bold().white(),
                summary.mean_reward(),
                "Link failures".bold().yellow(),
                summary.connection_failures
            );
        }
    }
}
