use crate::domain::models::{
    AbilityEntry, AbilityLevel, DifficultyTier, Habit, MotivationEntry, MotivationLevel,
    PostVisibility, ProofType, TaskEntry, ValidationVerdict,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateTaskRequest {
    pub habit_id: String,
    pub difficulty: DifficultyTier,
    pub motivation: MotivationLevel,
    pub ability: AbilityLevel,
    pub proof_style: ProofType,
    pub locale: String,
    pub timezone: String,
    pub user_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofSubmission {
    pub proof_type: ProofType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofResponse {
    pub task: TaskEntry,
    pub verdict: ValidationVerdict,
    pub auto_post_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePostRequest {
    pub visibility: PostVisibility,
    pub proof_reference: Option<String>,
    pub description: String,
    pub habit_id: String,
    pub linked_task_id: String,
}

/// The backend contract the engine consumes. Absence of a record is a
/// `None`, never an error; duplicate creates surface as `AlreadyExists`
/// so callers can fall back to an update.
#[async_trait]
pub trait HabitApiClient: Send + Sync {
    async fn list_habits(&self) -> Result<Vec<Habit>, InfraError>;
    async fn create_habit(&self, habit: &Habit) -> Result<Habit, InfraError>;
    async fn update_habit(&self, habit: &Habit) -> Result<Habit, InfraError>;
    async fn delete_habit(&self, habit_id: &str) -> Result<(), InfraError>;

    async fn get_motivation(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
    ) -> Result<Option<MotivationEntry>, InfraError>;
    async fn create_motivation(&self, entry: &MotivationEntry) -> Result<MotivationEntry, InfraError>;
    async fn update_motivation(&self, entry: &MotivationEntry) -> Result<MotivationEntry, InfraError>;

    async fn get_ability(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
    ) -> Result<Option<AbilityEntry>, InfraError>;
    async fn create_ability(&self, entry: &AbilityEntry) -> Result<AbilityEntry, InfraError>;
    async fn update_ability(&self, entry: &AbilityEntry) -> Result<AbilityEntry, InfraError>;

    async fn generate_task(&self, request: &GenerateTaskRequest) -> Result<(), InfraError>;
    async fn get_today_task(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
    ) -> Result<Option<TaskEntry>, InfraError>;
    async fn submit_proof(
        &self,
        task_id: &str,
        submission: &ProofSubmission,
    ) -> Result<ProofResponse, InfraError>;
    async fn sweep_expired_tasks(&self) -> Result<(), InfraError>;

    async fn streak_freezer_balance(&self) -> Result<u32, InfraError>;
    async fn consume_streak_freezer(&self) -> Result<u32, InfraError>;
    async fn award_streak_freezer(&self) -> Result<u32, InfraError>;

    async fn create_post(&self, request: &CreatePostRequest) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestHabitApiClient {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: u32,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    post_id: String,
}

impl ReqwestHabitApiClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Api(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn api_http_error(status: StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("habit api error: http {}", status.as_u16())
        } else {
            format!("habit api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Api(message)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| InfraError::Api("habit api base URL cannot be a base".to_string()))?;
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let request = match self.bearer_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error while {what}: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Api(format!("failed reading {what} response: {error}")))?;
        Ok((status, body))
    }

    fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, InfraError> {
        serde_json::from_str(body)
            .map_err(|error| InfraError::Api(format!("invalid {what} payload: {error}; body={body}")))
    }
}

#[async_trait]
impl HabitApiClient for ReqwestHabitApiClient {
    async fn list_habits(&self) -> Result<Vec<Habit>, InfraError> {
        let url = self.endpoint(&["habits"])?;
        let (status, body) = self.execute(self.client.get(url), "listing habits").await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "habit list")
    }

    async fn create_habit(&self, habit: &Habit) -> Result<Habit, InfraError> {
        let url = self.endpoint(&["habits"])?;
        let (status, body) = self
            .execute(self.client.post(url).json(habit), "creating habit")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "habit create")
    }

    async fn update_habit(&self, habit: &Habit) -> Result<Habit, InfraError> {
        Self::ensure_non_empty(&habit.id, "habit id")?;
        let url = self.endpoint(&["habits", &habit.id])?;
        let (status, body) = self
            .execute(self.client.put(url).json(habit), "updating habit")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "habit update")
    }

    async fn delete_habit(&self, habit_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(habit_id, "habit id")?;
        let url = self.endpoint(&["habits", habit_id])?;
        let (status, body) = self
            .execute(self.client.delete(url), "deleting habit")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Ok(())
    }

    async fn get_motivation(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
    ) -> Result<Option<MotivationEntry>, InfraError> {
        Self::ensure_non_empty(habit_id, "habit id")?;
        let url = self.endpoint(&["habits", habit_id, "motivation", &user_date.to_string()])?;
        let (status, body) = self
            .execute(self.client.get(url), "reading motivation entry")
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "motivation entry").map(Some)
    }

    async fn create_motivation(&self, entry: &MotivationEntry) -> Result<MotivationEntry, InfraError> {
        Self::ensure_non_empty(&entry.habit_id, "habit id")?;
        let url = self.endpoint(&["habits", &entry.habit_id, "motivation"])?;
        let (status, body) = self
            .execute(self.client.post(url).json(entry), "creating motivation entry")
            .await?;
        if status == StatusCode::CONFLICT {
            return Err(InfraError::AlreadyExists);
        }
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "motivation create")
    }

    async fn update_motivation(&self, entry: &MotivationEntry) -> Result<MotivationEntry, InfraError> {
        Self::ensure_non_empty(&entry.habit_id, "habit id")?;
        let url = self.endpoint(&[
            "habits",
            &entry.habit_id,
            "motivation",
            &entry.date.to_string(),
        ])?;
        let (status, body) = self
            .execute(self.client.put(url).json(entry), "updating motivation entry")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "motivation update")
    }

    async fn get_ability(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
    ) -> Result<Option<AbilityEntry>, InfraError> {
        Self::ensure_non_empty(habit_id, "habit id")?;
        let url = self.endpoint(&["habits", habit_id, "ability", &user_date.to_string()])?;
        let (status, body) = self
            .execute(self.client.get(url), "reading ability entry")
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "ability entry").map(Some)
    }

    async fn create_ability(&self, entry: &AbilityEntry) -> Result<AbilityEntry, InfraError> {
        Self::ensure_non_empty(&entry.habit_id, "habit id")?;
        let url = self.endpoint(&["habits", &entry.habit_id, "ability"])?;
        let (status, body) = self
            .execute(self.client.post(url).json(entry), "creating ability entry")
            .await?;
        if status == StatusCode::CONFLICT {
            return Err(InfraError::AlreadyExists);
        }
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "ability create")
    }

    async fn update_ability(&self, entry: &AbilityEntry) -> Result<AbilityEntry, InfraError> {
        Self::ensure_non_empty(&entry.habit_id, "habit id")?;
        let url = self.endpoint(&[
            "habits",
            &entry.habit_id,
            "ability",
            &entry.date.to_string(),
        ])?;
        let (status, body) = self
            .execute(self.client.put(url).json(entry), "updating ability entry")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "ability update")
    }

    async fn generate_task(&self, request: &GenerateTaskRequest) -> Result<(), InfraError> {
        Self::ensure_non_empty(&request.habit_id, "habit id")?;
        let url = self.endpoint(&["tasks", "generate"])?;
        let (status, body) = self
            .execute(self.client.post(url).json(request), "requesting task generation")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Ok(())
    }

    async fn get_today_task(
        &self,
        habit_id: &str,
        user_date: NaiveDate,
    ) -> Result<Option<TaskEntry>, InfraError> {
        Self::ensure_non_empty(habit_id, "habit id")?;
        let url = self.endpoint(&["habits", habit_id, "task", &user_date.to_string()])?;
        let (status, body) = self
            .execute(self.client.get(url), "reading today's task")
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "task entry").map(Some)
    }

    async fn submit_proof(
        &self,
        task_id: &str,
        submission: &ProofSubmission,
    ) -> Result<ProofResponse, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let url = self.endpoint(&["tasks", task_id, "proof"])?;
        let (status, body) = self
            .execute(self.client.post(url).json(submission), "submitting proof")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body(&body, "proof response")
    }

    async fn sweep_expired_tasks(&self) -> Result<(), InfraError> {
        let url = self.endpoint(&["tasks", "sweep-expired"])?;
        let (status, body) = self
            .execute(self.client.post(url), "sweeping expired tasks")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Ok(())
    }

    async fn streak_freezer_balance(&self) -> Result<u32, InfraError> {
        let url = self.endpoint(&["streak-freezers"])?;
        let (status, body) = self
            .execute(self.client.get(url), "reading streak freezer balance")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body::<BalanceResponse>(&body, "streak freezer balance")
            .map(|response| response.balance)
    }

    async fn consume_streak_freezer(&self) -> Result<u32, InfraError> {
        let url = self.endpoint(&["streak-freezers", "consume"])?;
        let (status, body) = self
            .execute(self.client.post(url), "consuming streak freezer")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body::<BalanceResponse>(&body, "streak freezer balance")
            .map(|response| response.balance)
    }

    async fn award_streak_freezer(&self) -> Result<u32, InfraError> {
        let url = self.endpoint(&["streak-freezers", "award"])?;
        let (status, body) = self
            .execute(self.client.post(url), "awarding streak freezer")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body::<BalanceResponse>(&body, "streak freezer balance")
            .map(|response| response.balance)
    }

    async fn create_post(&self, request: &CreatePostRequest) -> Result<String, InfraError> {
        Self::ensure_non_empty(&request.habit_id, "habit id")?;
        let url = self.endpoint(&["posts"])?;
        let (status, body) = self
            .execute(self.client.post(url).json(request), "creating post")
            .await?;
        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Self::parse_body::<CreatePostResponse>(&body, "post create").map(|response| response.post_id)
    }
}
