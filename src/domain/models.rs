use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MotivationLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbilityLevel {
    Hard,
    Medium,
    Easy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    Photo,
    Video,
    Audio,
    Text,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
    Missed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostVisibility {
    Private,
    Friends,
    CloseFriends,
}

impl PostVisibility {
    pub fn counts_toward_streak(self) -> bool {
        matches!(self, Self::Friends | Self::CloseFriends)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekdays,
    Weekends,
    Days { days: Vec<String> },
    EveryNDays { interval: u32, anchor: String },
}

impl Frequency {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Daily | Self::Weekdays | Self::Weekends => Ok(()),
            Self::Days { days } => {
                if days.is_empty() {
                    return Err("frequency.days must not be empty".to_string());
                }
                for day in days {
                    if parse_weekday(day).is_none() {
                        return Err(format!("frequency.days contains unknown weekday: {day}"));
                    }
                }
                Ok(())
            }
            Self::EveryNDays { interval, anchor } => {
                if *interval == 0 {
                    return Err("frequency.interval must be > 0".to_string());
                }
                validate_date(anchor, "frequency.anchor")
            }
        }
    }

    pub fn scheduled_on(&self, date: NaiveDate) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            Self::Weekends => matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            Self::Days { days } => days
                .iter()
                .filter_map(|day| parse_weekday(day))
                .any(|day| day == date.weekday()),
            Self::EveryNDays { interval, anchor } => {
                let Ok(anchor) = NaiveDate::parse_from_str(anchor, "%Y-%m-%d") else {
                    return false;
                };
                if *interval == 0 || date < anchor {
                    return false;
                }
                (date - anchor).num_days() % *interval as i64 == 0
            }
        }
    }

    pub fn next_occurrence(&self, after: NaiveDate) -> Option<NaiveDate> {
        (1..=366)
            .map(|offset| after + Duration::days(offset))
            .find(|candidate| self.scheduled_on(*candidate))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub frequency: Frequency,
    pub validation_time: String,
    pub difficulty: DifficultyTier,
    pub proof_style: ProofType,
    pub streak: u32,
}

impl Habit {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "habit.id")?;
        validate_non_empty(&self.name, "habit.name")?;
        self.frequency.validate()?;
        validate_hhmm(&self.validation_time, "habit.validation_time")
    }

    pub fn validation_time_of_day(&self) -> Option<NaiveTime> {
        parse_hhmm(&self.validation_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MotivationEntry {
    pub habit_id: String,
    pub date: NaiveDate,
    pub level: MotivationLevel,
}

impl MotivationEntry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.habit_id, "motivation.habit_id")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbilityEntry {
    pub habit_id: String,
    pub date: NaiveDate,
    pub level: AbilityLevel,
}

impl AbilityEntry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.habit_id, "ability.habit_id")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub confidence: f32,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEntry {
    pub id: String,
    pub habit_id: String,
    pub description: String,
    pub easier_alternative: Option<String>,
    pub harder_alternative: Option<String>,
    pub due_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub remaining_attempts: u32,
    pub proof_type: Option<ProofType>,
    pub proof_content: Option<String>,
    pub verdict: Option<ValidationVerdict>,
}

impl TaskEntry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.habit_id, "task.habit_id")?;
        validate_non_empty(&self.description, "task.description")?;
        Ok(())
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && now > self.due_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProofPayload {
    Text { content: String },
    Media { media_type: ProofType, reference: String },
}

impl ProofPayload {
    pub fn proof_type(&self) -> ProofType {
        match self {
            Self::Text { .. } => ProofType::Text,
            Self::Media { media_type, .. } => *media_type,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Text { content } => validate_non_empty(content, "proof.content"),
            Self::Media { media_type, reference } => {
                if *media_type == ProofType::Text {
                    return Err("proof.media_type must be photo, video, or audio".to_string());
                }
                validate_non_empty(reference, "proof.reference")
            }
        }
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    let mut split = value.split(':');
    let Some(hour_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    let Some(minute_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    if split.next().is_some() {
        return Err(format!("{field_name} must be HH:MM"));
    }

    let hour = hour_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{field_name} must be HH:MM"));
    }
    Ok(())
}

fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

pub(crate) fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
