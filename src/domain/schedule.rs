use crate::domain::models::Habit;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One calendar occurrence of a habit's validation window, as UTC instants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWindow {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl ValidationWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.open && instant < self.close
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub window: ValidationWindow,
    pub user_date: NaiveDate,
    pub carried_over: bool,
    pub until_open_secs: i64,
    pub until_close_secs: i64,
}

impl WindowState {
    pub fn is_open(&self) -> bool {
        self.until_open_secs == 0 && self.until_close_secs > 0
    }

    pub fn is_elapsed(&self) -> bool {
        self.until_open_secs == 0 && self.until_close_secs == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowResolution {
    NotScheduled {
        today: NaiveDate,
        next: Option<NaiveDate>,
    },
    Scheduled(WindowState),
}

impl WindowResolution {
    /// The calendar day lifecycle decisions are keyed by: the active
    /// window's local day, which near midnight may differ from the
    /// device's wall-clock day.
    pub fn user_date(&self) -> NaiveDate {
        match self {
            Self::NotScheduled { today, .. } => *today,
            Self::Scheduled(state) => state.user_date,
        }
    }
}

/// Builds the window opening at `time` on `date` in `tz`. A local instant
/// erased by a spring-forward transition resolves to one hour later.
fn window_for(
    date: NaiveDate,
    time: NaiveTime,
    tz: Tz,
    window_length: Duration,
) -> Option<ValidationWindow> {
    let local = date.and_time(time);
    let open = tz
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())?
        .with_timezone(&Utc);
    Some(ValidationWindow {
        open,
        close: open + window_length,
    })
}

/// Resolves the active validation window for `habit` at `now`.
///
/// Precedence: yesterday's still-open window (a window may span local
/// midnight), then today's window whether open or not yet open. When
/// today's window has already closed with no carry-over, both countdowns
/// collapse to zero so the caller resolves the occurrence as missed
/// instead of silently rolling forward. Days the frequency does not
/// schedule bypass the calculator entirely.
pub fn resolve_window(
    now: DateTime<Utc>,
    tz: Tz,
    habit: &Habit,
    window_length: Duration,
) -> Option<WindowResolution> {
    let time = habit.validation_time_of_day()?;
    let today = now.with_timezone(&tz).date_naive();
    let yesterday = today - Duration::days(1);

    if habit.frequency.scheduled_on(yesterday) {
        if let Some(window) = window_for(yesterday, time, tz, window_length) {
            if window.contains(now) {
                return Some(WindowResolution::Scheduled(WindowState {
                    window,
                    user_date: yesterday,
                    carried_over: true,
                    until_open_secs: 0,
                    until_close_secs: (window.close - now).num_seconds().max(0),
                }));
            }
        }
    }

    if !habit.frequency.scheduled_on(today) {
        return Some(WindowResolution::NotScheduled {
            today,
            next: habit.frequency.next_occurrence(today),
        });
    }

    let window = window_for(today, time, tz, window_length)?;
    let state = if now < window.open {
        WindowState {
            window,
            user_date: today,
            carried_over: false,
            until_open_secs: (window.open - now).num_seconds().max(0),
            until_close_secs: (window.close - now).num_seconds().max(0),
        }
    } else if window.contains(now) {
        WindowState {
            window,
            user_date: today,
            carried_over: false,
            until_open_secs: 0,
            until_close_secs: (window.close - now).num_seconds().max(0),
        }
    } else {
        WindowState {
            window,
            user_date: today,
            carried_over: false,
            until_open_secs: 0,
            until_close_secs: 0,
        }
    };
    Some(WindowResolution::Scheduled(state))
}
