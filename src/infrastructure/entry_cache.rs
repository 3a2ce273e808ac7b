use crate::domain::lifecycle::DailyEntries;
use crate::domain::models::{AbilityEntry, MotivationEntry, TaskEntry};
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-(habit, user-date) cache of the day's records. Mutated only by the
/// coordinators and by selection/day-rollover resets; the state machine
/// reads snapshots.
pub trait DailyEntryCache: Send + Sync {
    fn get(&self, habit_id: &str, date: NaiveDate) -> Result<DailyEntries, InfraError>;
    fn replace(&self, habit_id: &str, date: NaiveDate, entries: DailyEntries)
        -> Result<(), InfraError>;
    fn set_motivation(
        &self,
        habit_id: &str,
        date: NaiveDate,
        entry: Option<MotivationEntry>,
    ) -> Result<(), InfraError>;
    fn set_ability(
        &self,
        habit_id: &str,
        date: NaiveDate,
        entry: Option<AbilityEntry>,
    ) -> Result<(), InfraError>;
    fn set_task(
        &self,
        habit_id: &str,
        date: NaiveDate,
        task: Option<TaskEntry>,
    ) -> Result<(), InfraError>;
    /// Drops motivation and ability so the next occurrence re-prompts.
    fn clear_check_in(&self, habit_id: &str, date: NaiveDate) -> Result<(), InfraError>;
    fn clear_all(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDailyEntryCache {
    entries: Mutex<HashMap<(String, NaiveDate), DailyEntries>>,
}

impl InMemoryDailyEntryCache {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, NaiveDate), DailyEntries>>, InfraError>
    {
        self.entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("entry cache lock poisoned: {error}")))
    }
}

impl DailyEntryCache for InMemoryDailyEntryCache {
    fn get(&self, habit_id: &str, date: NaiveDate) -> Result<DailyEntries, InfraError> {
        let entries = self.lock()?;
        Ok(entries
            .get(&(habit_id.to_string(), date))
            .cloned()
            .unwrap_or_default())
    }

    fn replace(
        &self,
        habit_id: &str,
        date: NaiveDate,
        value: DailyEntries,
    ) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        entries.insert((habit_id.to_string(), date), value);
        Ok(())
    }

    fn set_motivation(
        &self,
        habit_id: &str,
        date: NaiveDate,
        entry: Option<MotivationEntry>,
    ) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        entries
            .entry((habit_id.to_string(), date))
            .or_default()
            .motivation = entry;
        Ok(())
    }

    fn set_ability(
        &self,
        habit_id: &str,
        date: NaiveDate,
        entry: Option<AbilityEntry>,
    ) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        entries
            .entry((habit_id.to_string(), date))
            .or_default()
            .ability = entry;
        Ok(())
    }

    fn set_task(
        &self,
        habit_id: &str,
        date: NaiveDate,
        task: Option<TaskEntry>,
    ) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        entries.entry((habit_id.to_string(), date)).or_default().task = task;
        Ok(())
    }

    fn clear_check_in(&self, habit_id: &str, date: NaiveDate) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        if let Some(day) = entries.get_mut(&(habit_id.to_string(), date)) {
            day.motivation = None;
            day.ability = None;
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<(), InfraError> {
        let mut entries = self.lock()?;
        entries.clear();
        Ok(())
    }
}
