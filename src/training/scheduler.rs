//! Learning Rate Scheduler Module
//!
//! The rate is a pure function of the global step, so a resumed run picks
//! up exactly where the schedule left off.

use serde::{Deserialize, Serialize};

/// Learning rate as a function of the global step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LRScheduler {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Multiply by `decay_factor` once the step count reaches each of `steps`
    StepDecay {
        initial_lr: f64,
        decay_factor: f64,
        steps: Vec<usize>,
    },
}

impl LRScheduler {
    /// Create a constant learning rate scheduler
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// Create a step decay scheduler
    pub fn step_decay(initial_lr: f64, decay_factor: f64, steps: Vec<usize>) -> Self {
        Self::StepDecay {
            initial_lr,
            decay_factor,
            steps,
        }
    }

    /// Rate for the update performed after `global_step` completed updates
    pub fn get_lr(&self, global_step: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::StepDecay {
                initial_lr,
                decay_factor,
                steps,
            } => steps
                .iter()
                .filter(|&&boundary| global_step >= boundary)
                .fold(*initial_lr, |lr, _| lr * decay_factor),
        }
    }

    /// Whether completing update `global_step` lands on a decay boundary
    pub fn is_boundary(&self, global_step: usize) -> bool {
        match self {
            Self::Constant { .. } => false,
            Self::StepDecay { steps, .. } => steps.contains(&global_step),
        }
    }
}
