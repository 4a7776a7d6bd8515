//! Dose progression across a titration schedule.
//!
//! A schedule is a list of [`DoseStep`]s ordered by `refill_number`. The
//! number of refills already consumed is `max(refill_number) -
//! refills_remaining`; the current step is the one whose `refill_number`
//! equals that count and the next step is the one after it. Everything here
//! is pure.

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};
use crate::models::DoseStep;

fn refills_used(schedule: &[DoseStep], refills_remaining: i32) -> Option<i64> {
    let max_refill = schedule.iter().map(|step| step.refill_number).max()?;
    Some(i64::from(max_refill) - i64::from(refills_remaining))
}

fn step_with_refill_number(schedule: &[DoseStep], refill_number: i64) -> Option<usize> {
    schedule
        .iter()
        .position(|step| i64::from(step.refill_number) == refill_number)
}

/// Index of the dose in effect with `refills_remaining` refills left.
pub fn current_step(schedule: &[DoseStep], refills_remaining: i32) -> Option<usize> {
    let used = refills_used(schedule, refills_remaining)?;
    step_with_refill_number(schedule, used)
}

/// Index of the dose that follows the current one, if the schedule has one.
///
/// The next step must come after a step already reached; with more refills
/// left than the schedule accounts for, nothing has been reached and
/// nothing follows.
pub fn next_step(schedule: &[DoseStep], refills_remaining: i32) -> Option<usize> {
    let used = refills_used(schedule, refills_remaining)?;
    let reached = schedule
        .iter()
        .rposition(|step| i64::from(step.refill_number) <= used)?;
    step_with_refill_number(schedule, used + 1).filter(|next| *next > reached)
}

/// Step whose product is dispensed with `refills_remaining` refills left.
///
/// Same as [`current_step`] when the count lines up with a step; otherwise
/// the latest step already reached, or the first step when none is.
pub fn dispensing_step(schedule: &[DoseStep], refills_remaining: i32) -> Option<usize> {
    if let Some(index) = current_step(schedule, refills_remaining) {
        return Some(index);
    }
    let used = refills_used(schedule, refills_remaining)?;
    schedule
        .iter()
        .rposition(|step| i64::from(step.refill_number) <= used)
        .or(Some(0))
}

/// A billing change is needed only when the step is priced differently from
/// what the subscription is charged today.
pub fn requires_billing_update(step: &DoseStep, current_price_id: &str) -> bool {
    step.billing_price_id != current_price_id
}

/// Reject schedules the calculator cannot reason about.
pub fn validate_schedule(schedule: &[DoseStep]) -> Result<()> {
    if schedule.is_empty() {
        return Err(LifecycleError::InvalidDoseSchedule(
            "schedule has no steps".to_string(),
        ));
    }
    for pair in schedule.windows(2) {
        if let [earlier, later] = pair {
            if later.refill_number <= earlier.refill_number {
                return Err(LifecycleError::InvalidDoseSchedule(format!(
                    "refill numbers must be strictly ascending ({} then {})",
                    earlier.refill_number, later.refill_number
                )));
            }
        }
    }
    Ok(())
}

/// Current and next dose for a prescription, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseProgress {
    pub refills_remaining: i32,
    pub current_index: Option<usize>,
    pub current: Option<DoseStep>,
    pub next_index: Option<usize>,
    pub next: Option<DoseStep>,
}

impl DoseProgress {
    pub fn resolve(schedule: &[DoseStep], refills_remaining: i32) -> Self {
        let current_index = current_step(schedule, refills_remaining);
        let next_index = next_step(schedule, refills_remaining);
        Self {
            refills_remaining,
            current_index,
            current: current_index.and_then(|i| schedule.get(i)).cloned(),
            next_index,
            next: next_index.and_then(|i| schedule.get(i)).cloned(),
        }
    }
}
