use crate::domain::models::{Habit, ProofPayload, ProofType, TaskEntry, TaskStatus, ValidationVerdict};
use crate::infrastructure::entry_cache::DailyEntryCache;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::habit_api_client::{HabitApiClient, ProofSubmission};
use chrono::NaiveDate;
use std::sync::Arc;

/// Verdict-mapped result of a single proof submission. The branch between
/// `Rejected` and `RejectedFinal` is decided by the attempts remaining
/// before this submission; the server's updated count becomes the
/// displayed `attempts_left`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProofOutcome {
    Validated {
        task: TaskEntry,
        verdict: ValidationVerdict,
        auto_post_id: Option<String>,
    },
    Rejected {
        task: TaskEntry,
        verdict: ValidationVerdict,
        attempts_left: u32,
    },
    RejectedFinal {
        task: TaskEntry,
        verdict: ValidationVerdict,
        next: Option<NaiveDate>,
    },
}

pub struct ProofCoordinator<A, E>
where
    A: HabitApiClient + ?Sized,
    E: DailyEntryCache + ?Sized,
{
    api: Arc<A>,
    entries: Arc<E>,
}

impl<A, E> ProofCoordinator<A, E>
where
    A: HabitApiClient + ?Sized,
    E: DailyEntryCache + ?Sized,
{
    pub fn new(api: Arc<A>, entries: Arc<E>) -> Self {
        Self { api, entries }
    }

    /// Exactly one submission call per invocation. The updated task entry
    /// is written to the entry store before the outcome is returned, so
    /// the next derivation reads the fresh data. A transport failure
    /// propagates without touching the store.
    pub async fn submit(
        &self,
        habit: &Habit,
        task: &TaskEntry,
        payload: &ProofPayload,
        user_date: NaiveDate,
    ) -> Result<ProofOutcome, InfraError> {
        payload.validate().map_err(InfraError::InvalidConfig)?;
        let declared = task.proof_type.unwrap_or(habit.proof_style);
        if payload.proof_type() != declared {
            return Err(InfraError::InvalidConfig(
                "proof payload kind does not match the task's declared proof type".to_string(),
            ));
        }
        if task.status != TaskStatus::Pending {
            return Err(InfraError::InvalidConfig(
                "task is no longer accepting proof".to_string(),
            ));
        }

        let had_attempts = task.remaining_attempts > 0;
        let submission = match payload {
            ProofPayload::Text { content } => ProofSubmission {
                proof_type: ProofType::Text,
                text_content: Some(content.clone()),
                media_reference: None,
            },
            ProofPayload::Media {
                media_type,
                reference,
            } => ProofSubmission {
                proof_type: *media_type,
                text_content: None,
                media_reference: Some(reference.clone()),
            },
        };

        let response = self.api.submit_proof(&task.id, &submission).await?;
        self.entries
            .set_task(&habit.id, user_date, Some(response.task.clone()))?;

        if response.verdict.is_valid {
            return Ok(ProofOutcome::Validated {
                task: response.task,
                verdict: response.verdict,
                auto_post_id: response.auto_post_id,
            });
        }
        if had_attempts {
            let attempts_left = response.task.remaining_attempts;
            return Ok(ProofOutcome::Rejected {
                task: response.task,
                verdict: response.verdict,
                attempts_left,
            });
        }
        Ok(ProofOutcome::RejectedFinal {
            task: response.task,
            verdict: response.verdict,
            next: habit.frequency.next_occurrence(user_date),
        })
    }
}
