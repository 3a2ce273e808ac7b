use crate::domain::lifecycle::{PinnedOutcome, StickyPin};
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Sticky-pin persistence, keyed by habit. Pins survive process restarts
/// within the same local day; staleness is the caller's concern.
pub trait PinRepository: Send + Sync {
    fn load(&self, habit_id: &str) -> Result<Option<StickyPin>, InfraError>;
    fn save(&self, pin: &StickyPin) -> Result<(), InfraError>;
    fn clear(&self, habit_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqlitePinRepository {
    db_path: PathBuf,
}

impl SqlitePinRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl PinRepository for SqlitePinRepository {
    fn load(&self, habit_id: &str) -> Result<Option<StickyPin>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, String, bool, bool)> = connection
            .query_row(
                "SELECT pinned_on, outcome, dismissed, post_created
                 FROM sticky_pins WHERE habit_id = ?1",
                params![habit_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((pinned_on_raw, outcome_raw, dismissed, post_created)) = row else {
            return Ok(None);
        };

        let pinned_on = NaiveDate::parse_from_str(&pinned_on_raw, "%Y-%m-%d").map_err(|error| {
            InfraError::InvalidConfig(format!(
                "invalid sticky_pins.pinned_on '{pinned_on_raw}': {error}"
            ))
        })?;
        let outcome: PinnedOutcome = serde_json::from_str(&outcome_raw)?;

        Ok(Some(StickyPin {
            habit_id: habit_id.to_string(),
            pinned_on,
            outcome,
            dismissed,
            post_created,
        }))
    }

    fn save(&self, pin: &StickyPin) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let outcome = serde_json::to_string(&pin.outcome)?;
        connection.execute(
            "INSERT INTO sticky_pins (habit_id, pinned_on, outcome, dismissed, post_created)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(habit_id) DO UPDATE SET
               pinned_on = excluded.pinned_on,
               outcome = excluded.outcome,
               dismissed = excluded.dismissed,
               post_created = excluded.post_created",
            params![
                pin.habit_id,
                pin.pinned_on.to_string(),
                outcome,
                pin.dismissed,
                pin.post_created
            ],
        )?;
        Ok(())
    }

    fn clear(&self, habit_id: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM sticky_pins WHERE habit_id = ?1",
            params![habit_id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPinRepository {
    pins: Mutex<HashMap<String, StickyPin>>,
}

impl PinRepository for InMemoryPinRepository {
    fn load(&self, habit_id: &str) -> Result<Option<StickyPin>, InfraError> {
        let pins = self
            .pins
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("pin store lock poisoned: {error}")))?;
        Ok(pins.get(habit_id).cloned())
    }

    fn save(&self, pin: &StickyPin) -> Result<(), InfraError> {
        let mut pins = self
            .pins
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("pin store lock poisoned: {error}")))?;
        pins.insert(pin.habit_id.clone(), pin.clone());
        Ok(())
    }

    fn clear(&self, habit_id: &str) -> Result<(), InfraError> {
        let mut pins = self
            .pins
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("pin store lock poisoned: {error}")))?;
        pins.remove(habit_id);
        Ok(())
    }
}
