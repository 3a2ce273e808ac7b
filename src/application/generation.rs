use crate::domain::models::TaskEntry;
use crate::infrastructure::entry_cache::DailyEntryCache;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::habit_api_client::{GenerateTaskRequest, HabitApiClient};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

/// Bounded fixed-interval poll budget. Both the short budget used right
/// after a generation request and the longer one used when re-entering a
/// habit are instances of this policy; neither is ever unbounded.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_attempts: u8,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Ready(TaskEntry),
    TimedOut,
}

pub struct GenerationCoordinator<A, E>
where
    A: HabitApiClient + ?Sized,
    E: DailyEntryCache + ?Sized,
{
    api: Arc<A>,
    entries: Arc<E>,
    poll_policy: PollPolicy,
}

impl<A, E> GenerationCoordinator<A, E>
where
    A: HabitApiClient + ?Sized,
    E: DailyEntryCache + ?Sized,
{
    pub fn new(api: Arc<A>, entries: Arc<E>) -> Self {
        Self {
            api,
            entries,
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    /// Submits a generation request and polls until the task entry shows
    /// up or the budget runs out. A transport failure on the submission
    /// itself gets one fallback read: the entry may have been created
    /// server-side regardless.
    pub async fn generate(
        &self,
        request: &GenerateTaskRequest,
    ) -> Result<GenerationOutcome, InfraError> {
        if let Err(error) = self.api.generate_task(request).await {
            match self
                .api
                .get_today_task(&request.habit_id, request.user_date)
                .await?
            {
                Some(task) => {
                    self.entries
                        .set_task(&request.habit_id, request.user_date, Some(task.clone()))?;
                    return Ok(GenerationOutcome::Ready(task));
                }
                None => return Err(error),
            }
        }

        let policy = self.poll_policy.clone();
        self.await_task(&request.habit_id, request.user_date, &policy)
            .await
    }

    /// Polls for the task entry at the policy's fixed interval. Each
    /// iteration is a read-only fetch; the found entry is written to the
    /// entry store before this returns.
    pub async fn await_task(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
        policy: &PollPolicy,
    ) -> Result<GenerationOutcome, InfraError> {
        let max_attempts = policy.max_attempts.max(1);
        for _ in 0..max_attempts {
            sleep(TokioDuration::from_millis(policy.interval_ms)).await;
            if let Some(task) = self.api.get_today_task(habit_id, user_date).await? {
                self.entries
                    .set_task(habit_id, user_date, Some(task.clone()))?;
                return Ok(GenerationOutcome::Ready(task));
            }
        }
        Ok(GenerationOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AbilityLevel, DifficultyTier, MotivationLevel, ProofType, TaskStatus,
    };
    use crate::infrastructure::entry_cache::InMemoryDailyEntryCache;
    use crate::infrastructure::habit_api_client::testing::ScriptedHabitApiClient;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::Ordering;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn user_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date")
    }

    fn sample_request() -> GenerateTaskRequest {
        GenerateTaskRequest {
            habit_id: "hab-1".to_string(),
            difficulty: DifficultyTier::Medium,
            motivation: MotivationLevel::High,
            ability: AbilityLevel::Medium,
            proof_style: ProofType::Photo,
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            user_date: user_date(),
        }
    }

    fn sample_task() -> TaskEntry {
        TaskEntry {
            id: "tsk-1".to_string(),
            habit_id: "hab-1".to_string(),
            description: "Run 3 km".to_string(),
            easier_alternative: None,
            harder_alternative: None,
            due_at: fixed_time("2026-02-17T01:00:00Z"),
            status: TaskStatus::Pending,
            remaining_attempts: 3,
            proof_type: Some(ProofType::Photo),
            proof_content: None,
            verdict: None,
        }
    }

    fn fast_policy(max_attempts: u8) -> PollPolicy {
        PollPolicy {
            interval_ms: 1,
            max_attempts,
        }
    }

    fn coordinator(
        api: &Arc<ScriptedHabitApiClient>,
        cache: &Arc<InMemoryDailyEntryCache>,
        policy: PollPolicy,
    ) -> GenerationCoordinator<ScriptedHabitApiClient, InMemoryDailyEntryCache> {
        GenerationCoordinator::new(Arc::clone(api), Arc::clone(cache)).with_poll_policy(policy)
    }

    #[tokio::test]
    async fn polls_until_the_task_appears() {
        let api = Arc::new(ScriptedHabitApiClient::default());
        api.push_task_response(Ok(None));
        api.push_task_response(Ok(None));
        api.push_task_response(Ok(Some(sample_task())));
        let cache = Arc::new(InMemoryDailyEntryCache::default());

        let outcome = coordinator(&api, &cache, fast_policy(10))
            .generate(&sample_request())
            .await
            .expect("generation succeeds");

        assert_eq!(outcome, GenerationOutcome::Ready(sample_task()));
        assert_eq!(api.generate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.task_calls.load(Ordering::SeqCst), 3);

        // The entry store sees the task before the caller does.
        let entries = cache.get("hab-1", user_date()).expect("cache read");
        assert_eq!(entries.task, Some(sample_task()));
    }

    #[tokio::test]
    async fn exhausted_budget_times_out_without_a_task() {
        let api = Arc::new(ScriptedHabitApiClient::default());
        let cache = Arc::new(InMemoryDailyEntryCache::default());

        let outcome = coordinator(&api, &cache, fast_policy(4))
            .generate(&sample_request())
            .await
            .expect("poll exhaustion is not a transport error");

        assert_eq!(outcome, GenerationOutcome::TimedOut);
        assert_eq!(api.task_calls.load(Ordering::SeqCst), 4);
        assert!(cache.get("hab-1", user_date()).expect("cache read").task.is_none());
    }

    #[tokio::test]
    async fn failed_submission_recovers_via_fallback_fetch() {
        let api = Arc::new(ScriptedHabitApiClient::default());
        api.push_generate_result(Err(InfraError::Api("connection reset".to_string())));
        api.push_task_response(Ok(Some(sample_task())));
        let cache = Arc::new(InMemoryDailyEntryCache::default());

        let outcome = coordinator(&api, &cache, fast_policy(10))
            .generate(&sample_request())
            .await
            .expect("fallback fetch recovers");

        assert_eq!(outcome, GenerationOutcome::Ready(sample_task()));
        assert_eq!(api.task_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_submission_without_server_task_surfaces_the_error() {
        let api = Arc::new(ScriptedHabitApiClient::default());
        api.push_generate_result(Err(InfraError::Api("connection reset".to_string())));
        api.push_task_response(Ok(None));
        let cache = Arc::new(InMemoryDailyEntryCache::default());

        let result = coordinator(&api, &cache, fast_policy(10))
            .generate(&sample_request())
            .await;

        assert!(matches!(result, Err(InfraError::Api(_))));
        assert_eq!(api.task_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extended_budget_keeps_polling_longer() {
        let api = Arc::new(ScriptedHabitApiClient::default());
        for _ in 0..15 {
            api.push_task_response(Ok(None));
        }
        api.push_task_response(Ok(Some(sample_task())));
        let cache = Arc::new(InMemoryDailyEntryCache::default());

        let outcome = coordinator(&api, &cache, fast_policy(10))
            .await_task("hab-1", user_date(), &fast_policy(20))
            .await
            .expect("extended poll succeeds");

        assert_eq!(outcome, GenerationOutcome::Ready(sample_task()));
        assert_eq!(api.task_calls.load(Ordering::SeqCst), 16);
    }
}
