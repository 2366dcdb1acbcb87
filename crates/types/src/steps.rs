//! Four-step progress tracker with the cascade rule.
//!
//! Activating, completing or failing step *n* completes every step before it,
//! and a completed step never goes back to an earlier status. Both the
//! registry and observers apply updates through [`Steps::apply`], so
//! out-of-order delivery converges on the same result everywhere.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Error,
}

/// Status of all steps of a job; index 0 is step 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(transparent)]
pub struct Steps([StepStatus; Steps::COUNT as usize]);

impl Default for Steps {
    fn default() -> Self {
        Self([StepStatus::Pending; Self::COUNT as usize])
    }
}

impl Steps {
    /// Number of steps every job goes through.
    pub const COUNT: u8 = 4;

    /// `true` if `step` is a valid 1-based step number.
    pub fn is_valid(step: u8) -> bool {
        (1..=Self::COUNT).contains(&step)
    }

    /// Status of the 1-based `step`, or `None` when out of range.
    pub fn get(&self, step: u8) -> Option<StepStatus> {
        Self::is_valid(step).then(|| self.0[usize::from(step - 1)])
    }

    pub fn as_slice(&self) -> &[StepStatus] {
        &self.0
    }

    /// Apply a reported status for `step`. Returns `true` if anything changed.
    ///
    /// Out-of-range steps are ignored. Reporting `pending` never moves a step
    /// backwards and does not cascade.
    pub fn apply(&mut self, step: u8, status: StepStatus) -> bool {
        if !Self::is_valid(step) {
            return false;
        }
        let idx = usize::from(step - 1);
        let mut changed = false;

        if status != StepStatus::Pending {
            for earlier in &mut self.0[..idx] {
                if *earlier != StepStatus::Completed {
                    *earlier = StepStatus::Completed;
                    changed = true;
                }
            }
        }

        let slot = &mut self.0[idx];
        let next = match (*slot, status) {
            (StepStatus::Completed, _) => StepStatus::Completed,
            (current, StepStatus::Pending) => current,
            (_, reported) => reported,
        };
        if next != *slot {
            *slot = next;
            changed = true;
        }
        changed
    }

    /// 1-based index of the furthest step that has left `pending` (1 if none has).
    pub fn current_index(&self) -> u8 {
        self.0
            .iter()
            .rposition(|s| *s != StepStatus::Pending)
            .map(|i| i as u8 + 1)
            .unwrap_or(1)
    }

    /// Mark every step completed (job finished successfully).
    pub fn complete_all(&mut self) {
        self.0 = [StepStatus::Completed; Self::COUNT as usize];
    }

    /// Mark the current step as failed, unless it already completed.
    pub fn fail_current(&mut self) {
        let idx = usize::from(self.current_index() - 1);
        if self.0[idx] != StepStatus::Completed {
            self.0[idx] = StepStatus::Error;
        }
    }
}
