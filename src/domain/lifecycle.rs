use crate::domain::models::{AbilityEntry, Habit, MotivationEntry, TaskEntry, TaskStatus};
use crate::domain::schedule::WindowResolution;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProofPhase {
    Idle,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInStep {
    Motivation,
    Ability,
}

/// The per-(habit, user-date) records the machine reads. Absence of a
/// record is a valid value, never an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyEntries {
    pub motivation: Option<MotivationEntry>,
    pub ability: Option<AbilityEntry>,
    pub task: Option<TaskEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleState {
    Empty,
    NotToday {
        next: Option<NaiveDate>,
    },
    WaitingForValidationTime {
        until_open_secs: i64,
        motivation_set: bool,
        ability_set: bool,
    },
    ValidationTime {
        until_close_secs: i64,
        motivation_set: bool,
        ability_set: bool,
    },
    SetMotivation,
    SetAbility,
    ReadyToGenerateTask,
    GeneratingTask,
    ShowTask {
        task: TaskEntry,
        proof: ProofPhase,
    },
    Missed {
        next: Option<NaiveDate>,
    },
    DismissableMissed {
        next: Option<NaiveDate>,
    },
    Failed {
        attempts_left: u32,
    },
    FailedNoAttempts {
        next: Option<NaiveDate>,
    },
    DismissableFailedNoAttempts {
        next: Option<NaiveDate>,
    },
    SuccessShare {
        task: Option<TaskEntry>,
    },
    SuccessDone,
    Error {
        message: String,
    },
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Empty
    }
}

/// Terminal outcome pinned for the rest of the local calendar day. The
/// pinned payload is self-contained so the state re-emits unchanged even
/// if the backing task entry disappears.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PinnedOutcome {
    Missed { next: Option<NaiveDate> },
    Failed { attempts_left: u32 },
    FailedNoAttempts { next: Option<NaiveDate> },
    SuccessShare { task: Option<TaskEntry> },
    SuccessDone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StickyPin {
    pub habit_id: String,
    pub pinned_on: NaiveDate,
    pub outcome: PinnedOutcome,
    pub dismissed: bool,
    pub post_created: bool,
}

impl StickyPin {
    pub fn new(habit_id: impl Into<String>, pinned_on: NaiveDate, outcome: PinnedOutcome) -> Self {
        Self {
            habit_id: habit_id.into(),
            pinned_on,
            outcome,
            dismissed: false,
            post_created: false,
        }
    }

    pub fn can_dismiss(&self) -> bool {
        matches!(
            self.outcome,
            PinnedOutcome::Missed { .. } | PinnedOutcome::FailedNoAttempts { .. }
        )
    }

    pub fn state(&self) -> LifecycleState {
        match (&self.outcome, self.dismissed) {
            (PinnedOutcome::Missed { next }, false) => LifecycleState::Missed { next: *next },
            (PinnedOutcome::Missed { next }, true) => {
                LifecycleState::DismissableMissed { next: *next }
            }
            (PinnedOutcome::Failed { attempts_left }, _) => LifecycleState::Failed {
                attempts_left: *attempts_left,
            },
            (PinnedOutcome::FailedNoAttempts { next }, false) => {
                LifecycleState::FailedNoAttempts { next: *next }
            }
            (PinnedOutcome::FailedNoAttempts { next }, true) => {
                LifecycleState::DismissableFailedNoAttempts { next: *next }
            }
            (PinnedOutcome::SuccessShare { task }, _) => {
                LifecycleState::SuccessShare { task: task.clone() }
            }
            (PinnedOutcome::SuccessDone, _) => LifecycleState::SuccessDone,
        }
    }
}

#[derive(Debug)]
pub struct DeriveInput<'a> {
    pub habit: Option<&'a Habit>,
    pub window: Option<&'a WindowResolution>,
    pub entries: &'a DailyEntries,
    pub generation_in_flight: bool,
    pub proof_in_flight: bool,
    pub check_in: Option<CheckInStep>,
}

/// Pure candidate derivation, evaluated top to bottom, first match wins.
/// Sticky pins are layered on afterwards by `apply_pin`.
pub fn derive(input: &DeriveInput) -> LifecycleState {
    let Some(habit) = input.habit else {
        return LifecycleState::Empty;
    };
    let Some(resolution) = input.window else {
        return LifecycleState::Empty;
    };

    let window = match resolution {
        WindowResolution::NotScheduled { next, .. } => {
            return LifecycleState::NotToday { next: *next };
        }
        WindowResolution::Scheduled(window) => window,
    };
    let next = habit.frequency.next_occurrence(window.user_date);

    if input.generation_in_flight {
        return LifecycleState::GeneratingTask;
    }
    if input.proof_in_flight {
        if let Some(task) = &input.entries.task {
            return LifecycleState::ShowTask {
                task: task.clone(),
                proof: ProofPhase::Submitting,
            };
        }
    }

    if let Some(task) = &input.entries.task {
        return match task.status {
            TaskStatus::Missed => LifecycleState::Missed { next },
            TaskStatus::Failed => {
                if task.remaining_attempts > 0 {
                    LifecycleState::Failed {
                        attempts_left: task.remaining_attempts,
                    }
                } else {
                    LifecycleState::FailedNoAttempts { next }
                }
            }
            TaskStatus::Completed => LifecycleState::SuccessShare {
                task: Some(task.clone()),
            },
            TaskStatus::Pending => LifecycleState::ShowTask {
                task: task.clone(),
                proof: ProofPhase::Idle,
            },
        };
    }

    let motivation_set = input.entries.motivation.is_some();
    let ability_set = input.entries.ability.is_some();

    if window.until_open_secs > 0 {
        return LifecycleState::WaitingForValidationTime {
            until_open_secs: window.until_open_secs,
            motivation_set,
            ability_set,
        };
    }
    if window.until_close_secs > 0 {
        if !(motivation_set && ability_set) {
            if let Some(step) = input.check_in {
                return match step {
                    CheckInStep::Motivation => LifecycleState::SetMotivation,
                    CheckInStep::Ability => LifecycleState::SetAbility,
                };
            }
        }
        if motivation_set && ability_set {
            return LifecycleState::ReadyToGenerateTask;
        }
        return LifecycleState::ValidationTime {
            until_close_secs: window.until_close_secs,
            motivation_set,
            ability_set,
        };
    }
    LifecycleState::Missed { next }
}

/// Sticky-pin layer, consulted before the candidate wins. A same-day pin
/// re-emits unchanged; a dismissed pin yields to the candidate unless the
/// candidate would re-enter the same outcome for the same day, in which
/// case the dismissable form keeps dominating.
pub fn apply_pin(
    pin: Option<&StickyPin>,
    user_date: NaiveDate,
    candidate: LifecycleState,
) -> LifecycleState {
    let Some(pin) = pin else {
        return candidate;
    };
    if pin.pinned_on != user_date {
        return candidate;
    }
    if !pin.dismissed {
        return pin.state();
    }
    match (&pin.outcome, &candidate) {
        (PinnedOutcome::Missed { .. }, LifecycleState::Missed { .. }) => pin.state(),
        (
            PinnedOutcome::FailedNoAttempts { .. },
            LifecycleState::Missed { .. } | LifecycleState::FailedNoAttempts { .. },
        ) => pin.state(),
        _ => candidate,
    }
}

/// The candidate outcomes that become sticky once observed.
pub fn pin_for(candidate: &LifecycleState) -> Option<PinnedOutcome> {
    match candidate {
        LifecycleState::Missed { next } => Some(PinnedOutcome::Missed { next: *next }),
        LifecycleState::Failed { attempts_left } => Some(PinnedOutcome::Failed {
            attempts_left: *attempts_left,
        }),
        LifecycleState::FailedNoAttempts { next } => {
            Some(PinnedOutcome::FailedNoAttempts { next: *next })
        }
        LifecycleState::SuccessShare { task } => Some(PinnedOutcome::SuccessShare {
            task: task.clone(),
        }),
        _ => None,
    }
}
