use crate::application::bootstrap::bootstrap_workspace;
use crate::application::countdown::CountdownTracker;
use crate::application::generation::{GenerationCoordinator, GenerationOutcome, PollPolicy};
use crate::application::proof::{ProofCoordinator, ProofOutcome};
use crate::domain::lifecycle::{
    apply_pin, derive, pin_for, CheckInStep, DailyEntries, DeriveInput, LifecycleState,
    PinnedOutcome, StickyPin,
};
use crate::domain::models::{
    AbilityEntry, AbilityLevel, Habit, MotivationEntry, MotivationLevel, PostVisibility,
    ProofPayload, TaskEntry,
};
use crate::domain::schedule::{resolve_window, WindowResolution};
use crate::infrastructure::config::{read_api_base_url, read_locale, read_timezone};
use crate::infrastructure::entry_cache::{DailyEntryCache, InMemoryDailyEntryCache};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::habit_api_client::{
    CreatePostRequest, GenerateTaskRequest, HabitApiClient, ReqwestHabitApiClient,
};
use crate::infrastructure::pin_repository::{PinRepository, SqlitePinRepository};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use url::Url;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    timezone: Tz,
    locale: String,
    api: Arc<dyn HabitApiClient>,
    entry_cache: Arc<InMemoryDailyEntryCache>,
    pins: Arc<dyn PinRepository>,
    ticker: CountdownTracker,
    now_provider: NowProvider,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let api_config = load_api_config(&config_dir, |key| std::env::var(key).ok())?;
        let base_url = Url::parse(&api_config.base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid api base url: {error}"))
        })?;
        let mut client = ReqwestHabitApiClient::new(base_url);
        if let Some(token) = api_config.bearer_token {
            client = client.with_bearer_token(token);
        }
        Self::assemble(workspace_root, bootstrap.database_path, Arc::new(client))
    }

    /// Same assembly with an injected backend client; the presentation
    /// shell and tests use this to swap transports.
    pub fn with_api(
        workspace_root: PathBuf,
        api: Arc<dyn HabitApiClient>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::assemble(workspace_root, bootstrap.database_path, api)
    }

    fn assemble(
        workspace_root: PathBuf,
        database_path: PathBuf,
        api: Arc<dyn HabitApiClient>,
    ) -> Result<Self, InfraError> {
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let timezone_name = read_timezone(&config_dir)?.unwrap_or_else(|| "UTC".to_string());
        let timezone = timezone_name.parse::<Tz>().map_err(|_| {
            InfraError::InvalidConfig(format!("unknown timezone: {timezone_name}"))
        })?;
        let locale = read_locale(&config_dir)?.unwrap_or_else(|| "en-US".to_string());
        let pins: Arc<dyn PinRepository> = Arc::new(SqlitePinRepository::new(&database_path));

        Ok(Self {
            config_dir,
            database_path,
            logs_dir,
            timezone,
            locale,
            api,
            entry_cache: Arc::new(InMemoryDailyEntryCache::default()),
            pins,
            ticker: CountdownTracker::new(),
            now_provider: Arc::new(Utc::now),
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("engine.log");
        let payload = serde_json::json!({
            "timestamp": (self.now_provider)().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    habits: HashMap<String, Habit>,
    selected_habit_id: Option<String>,
    lifecycle: LifecycleState,
    check_in: Option<CheckInStep>,
    generation_in_flight: bool,
    proof_in_flight: bool,
    post_in_flight: bool,
    freezer_balance: Option<u32>,
    background_poll: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Debug, Clone)]
struct EnginePolicy {
    window_length: Duration,
    tick_interval_ms: u64,
    poll: PollPolicy,
    extended_poll: PollPolicy,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            window_length: Duration::hours(4),
            tick_interval_ms: 1_000,
            poll: PollPolicy {
                interval_ms: 2_000,
                max_attempts: 10,
            },
            extended_poll: PollPolicy {
                interval_ms: 2_000,
                max_attempts: 20,
            },
        }
    }
}

pub async fn list_habits_impl(state: &AppState) -> Result<Vec<Habit>, InfraError> {
    let habits = state.api.list_habits().await?;
    {
        let mut runtime = lock_runtime(state)?;
        runtime.habits = habits
            .iter()
            .map(|habit| (habit.id.clone(), habit.clone()))
            .collect();
    }
    Ok(habits)
}

pub async fn create_habit_impl(state: &AppState, habit: Habit) -> Result<Habit, InfraError> {
    habit.validate().map_err(InfraError::InvalidConfig)?;
    let created = state.api.create_habit(&habit).await?;
    lock_runtime(state)?
        .habits
        .insert(created.id.clone(), created.clone());
    state.log_info("create_habit", &format!("created habit_id={}", created.id));
    Ok(created)
}

pub async fn update_habit_impl(state: &AppState, habit: Habit) -> Result<Habit, InfraError> {
    habit.validate().map_err(InfraError::InvalidConfig)?;
    let updated = state.api.update_habit(&habit).await?;
    let selected = {
        let mut runtime = lock_runtime(state)?;
        runtime.habits.insert(updated.id.clone(), updated.clone());
        runtime.selected_habit_id.as_deref() == Some(updated.id.as_str())
    };
    if selected {
        // The schedule may have changed; re-derive from the new rules.
        let _ = recompute_lifecycle(state).await;
    }
    state.log_info("update_habit", &format!("updated habit_id={}", updated.id));
    Ok(updated)
}

pub async fn delete_habit_impl(state: &AppState, habit_id: String) -> Result<bool, InfraError> {
    let habit_id = habit_id.trim();
    if habit_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "habit_id must not be empty".to_string(),
        ));
    }

    state.api.delete_habit(habit_id).await?;
    let (removed, was_selected) = {
        let mut runtime = lock_runtime(state)?;
        let removed = runtime.habits.remove(habit_id).is_some();
        let was_selected = runtime.selected_habit_id.as_deref() == Some(habit_id);
        if was_selected {
            runtime.selected_habit_id = None;
            runtime.lifecycle = LifecycleState::Empty;
            runtime.check_in = None;
            if let Some(handle) = runtime.background_poll.take() {
                handle.abort();
            }
        }
        (removed, was_selected)
    };
    if was_selected {
        state.ticker.stop();
    }
    state.log_info("delete_habit", &format!("deleted habit_id={habit_id}"));
    Ok(removed || was_selected)
}

/// Switches the engine to a habit (or to none). Cancels the previous
/// ticker and any background poll, resets per-day caches, refreshes the
/// day's entries, derives the fresh state and restarts the ticker.
pub async fn select_habit_impl(
    state: &Arc<AppState>,
    habit_id: Option<String>,
) -> Result<LifecycleState, InfraError> {
    state.ticker.stop();
    {
        let mut runtime = lock_runtime(state)?;
        if let Some(handle) = runtime.background_poll.take() {
            handle.abort();
        }
        runtime.selected_habit_id = None;
        runtime.check_in = None;
        runtime.generation_in_flight = false;
        runtime.proof_in_flight = false;
    }
    state.entry_cache.clear_all()?;

    let Some(raw_id) = habit_id else {
        lock_runtime(state)?.lifecycle = LifecycleState::Empty;
        state.log_info("select_habit", "cleared habit selection");
        return Ok(LifecycleState::Empty);
    };
    let habit_id = raw_id.trim();
    if habit_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "habit_id must not be empty".to_string(),
        ));
    }

    let known = lock_runtime(state)?.habits.get(habit_id).cloned();
    let habit = match known {
        Some(habit) => habit,
        None => {
            let habits = state.api.list_habits().await?;
            let mut runtime = lock_runtime(state)?;
            for habit in habits {
                runtime.habits.insert(habit.id.clone(), habit);
            }
            runtime
                .habits
                .get(habit_id)
                .cloned()
                .ok_or_else(|| InfraError::InvalidConfig(format!("habit not found: {habit_id}")))?
        }
    };

    lock_runtime(state)?.selected_habit_id = Some(habit.id.clone());

    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;
    if let Err(error) = refresh_entries(state, &habit, user_date).await {
        state.log_error("select_habit", &format!("entry refresh degraded: {error}"));
    }

    let lifecycle = recompute_lifecycle(state).await?;
    start_ticker(state, policy.tick_interval_ms);
    if matches!(lifecycle, LifecycleState::ReadyToGenerateTask) {
        // A generation may be pending server-side from a previous session
        // or another device; watch for it on the longer budget.
        start_extended_poll(state, &habit.id, user_date, policy.extended_poll.clone());
    }
    state.log_info("select_habit", &format!("selected habit_id={habit_id}"));
    Ok(lifecycle)
}

pub fn lifecycle_state_impl(state: &AppState) -> Result<LifecycleState, InfraError> {
    Ok(lock_runtime(state)?.lifecycle.clone())
}

pub async fn begin_check_in_impl(state: &AppState) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;
    let entries = state.entry_cache.get(&habit.id, user_date)?;
    let step = if entries.motivation.is_none() {
        Some(CheckInStep::Motivation)
    } else if entries.ability.is_none() {
        Some(CheckInStep::Ability)
    } else {
        None
    };
    lock_runtime(state)?.check_in = step;
    recompute_lifecycle(state).await
}

pub async fn set_motivation_impl(
    state: &AppState,
    level: MotivationLevel,
) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;

    let entry = MotivationEntry {
        habit_id: habit.id.clone(),
        date: user_date,
        level,
    };
    let saved = match state.api.create_motivation(&entry).await {
        Err(InfraError::AlreadyExists) => state.api.update_motivation(&entry).await?,
        other => other?,
    };
    state
        .entry_cache
        .set_motivation(&habit.id, user_date, Some(saved))?;
    advance_check_in(state, &habit.id, user_date)?;
    state.log_info("set_motivation", &format!("recorded for habit_id={}", habit.id));
    recompute_lifecycle(state).await
}

pub async fn set_ability_impl(
    state: &AppState,
    level: AbilityLevel,
) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;

    let entry = AbilityEntry {
        habit_id: habit.id.clone(),
        date: user_date,
        level,
    };
    let saved = match state.api.create_ability(&entry).await {
        Err(InfraError::AlreadyExists) => state.api.update_ability(&entry).await?,
        other => other?,
    };
    state
        .entry_cache
        .set_ability(&habit.id, user_date, Some(saved))?;
    advance_check_in(state, &habit.id, user_date)?;
    state.log_info("set_ability", &format!("recorded for habit_id={}", habit.id));
    recompute_lifecycle(state).await
}

/// Requests task generation. Preconditions that do not hold (window not
/// open, levels missing, task already present, request already in flight)
/// make this a no-op returning the current snapshot; only the bounded
/// poll exhausting or a transport failure surfaces an error state.
pub async fn generate_task_impl(state: &AppState) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let now = (state.now_provider)();
    let resolution = resolve_window(now, state.timezone, &habit, policy.window_length)
        .ok_or_else(|| invalid_validation_time(&habit))?;
    let user_date = resolution.user_date();

    let entries = state.entry_cache.get(&habit.id, user_date)?;
    let window_open = matches!(&resolution, WindowResolution::Scheduled(window) if window.is_open());
    let (Some(motivation), Some(ability)) = (entries.motivation, entries.ability) else {
        return recompute_lifecycle(state).await;
    };
    if !window_open || entries.task.is_some() {
        return recompute_lifecycle(state).await;
    }

    {
        let mut runtime = lock_runtime(state)?;
        if runtime.generation_in_flight {
            return Ok(runtime.lifecycle.clone());
        }
        runtime.generation_in_flight = true;
    }
    let _ = recompute_lifecycle(state).await;

    let request = GenerateTaskRequest {
        habit_id: habit.id.clone(),
        difficulty: habit.difficulty,
        motivation: motivation.level,
        ability: ability.level,
        proof_style: habit.proof_style,
        locale: state.locale.clone(),
        timezone: state.timezone.name().to_string(),
        user_date,
    };
    let coordinator =
        GenerationCoordinator::new(Arc::clone(&state.api), Arc::clone(&state.entry_cache))
            .with_poll_policy(policy.poll.clone());
    let result = coordinator.generate(&request).await;

    lock_runtime(state)?.generation_in_flight = false;

    match result {
        Ok(GenerationOutcome::Ready(_)) => {
            state.log_info("generate_task", &format!("task ready for habit_id={}", habit.id));
            recompute_lifecycle(state).await
        }
        Ok(GenerationOutcome::TimedOut) => {
            let _ = recompute_lifecycle(state).await;
            let error = InfraError::GenerationTimeout;
            state.log_error("generate_task", &error.to_string());
            Ok(LifecycleState::Error {
                message: error.to_string(),
            })
        }
        Err(error) => {
            let _ = recompute_lifecycle(state).await;
            state.log_error("generate_task", &error.to_string());
            Ok(LifecycleState::Error {
                message: error.to_string(),
            })
        }
    }
}

/// Submits one proof for the active pending task. A transport failure
/// keeps the prior display state so the user can retry with the payload
/// intact; verdicts map to their sticky outcomes.
pub async fn submit_proof_impl(
    state: &AppState,
    payload: ProofPayload,
) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;
    let entries = state.entry_cache.get(&habit.id, user_date)?;
    let Some(task) = entries.task else {
        return Err(InfraError::InvalidConfig(
            "no active task to prove".to_string(),
        ));
    };

    {
        let mut runtime = lock_runtime(state)?;
        if runtime.proof_in_flight {
            return Ok(runtime.lifecycle.clone());
        }
        runtime.proof_in_flight = true;
    }
    let _ = recompute_lifecycle(state).await;

    let coordinator = ProofCoordinator::new(Arc::clone(&state.api), Arc::clone(&state.entry_cache));
    let result = coordinator.submit(&habit, &task, &payload, user_date).await;

    lock_runtime(state)?.proof_in_flight = false;

    match result {
        Ok(outcome) => {
            apply_proof_outcome(state, &habit, user_date, outcome).await?;
            recompute_lifecycle(state).await
        }
        Err(error) => {
            let _ = recompute_lifecycle(state).await;
            state.log_error("submit_proof", &error.to_string());
            Ok(LifecycleState::Error {
                message: error.to_string(),
            })
        }
    }
}

pub async fn dismiss_outcome_impl(state: &AppState) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;

    let Some(mut pin) = state.pins.load(&habit.id)? else {
        return Err(InfraError::InvalidConfig(
            "no outcome to dismiss".to_string(),
        ));
    };
    if pin.pinned_on != user_date || !pin.can_dismiss() {
        return Err(InfraError::InvalidConfig(
            "current state cannot be dismissed".to_string(),
        ));
    }
    pin.dismissed = true;
    state.pins.save(&pin)?;
    // Acknowledged outcome: the next occurrence re-prompts the check-in.
    state.entry_cache.clear_check_in(&habit.id, user_date)?;
    state.log_info("dismiss_outcome", &format!("acknowledged for habit_id={}", habit.id));
    recompute_lifecycle(state).await
}

/// Finalizes a validated day. Friends-facing visibility advances the
/// streak and re-fetches the freezer balance; motivation and ability are
/// cleared locally so the next occurrence re-prompts.
pub async fn share_success_impl(
    state: &AppState,
    visibility: PostVisibility,
) -> Result<LifecycleState, InfraError> {
    let habit = required_habit(state)?;
    let policy = load_engine_policy(state.config_dir());
    let user_date = current_user_date(state, &habit, &policy)?;

    let Some(pin) = state.pins.load(&habit.id)? else {
        return Err(InfraError::InvalidConfig("no success to share".to_string()));
    };
    if pin.pinned_on != user_date
        || !matches!(pin.outcome, PinnedOutcome::SuccessShare { .. })
    {
        return Err(InfraError::InvalidConfig("no success to share".to_string()));
    }

    let task = match &pin.outcome {
        PinnedOutcome::SuccessShare { task } => task.clone(),
        _ => None,
    };
    ensure_success_post(state, &habit, user_date, task, None).await;

    if visibility.counts_toward_streak() {
        let mut updated = habit.clone();
        updated.streak += 1;
        let saved = state.api.update_habit(&updated).await?;
        lock_runtime(state)?.habits.insert(saved.id.clone(), saved);
        if let Ok(balance) = state.api.streak_freezer_balance().await {
            lock_runtime(state)?.freezer_balance = Some(balance);
        }
    }

    // Reload so the post flag written above is preserved.
    let mut pin = state.pins.load(&habit.id)?.unwrap_or(pin);
    pin.outcome = PinnedOutcome::SuccessDone;
    pin.dismissed = false;
    state.pins.save(&pin)?;
    state.entry_cache.clear_check_in(&habit.id, user_date)?;
    state.log_info("share_success", &format!("shared for habit_id={}", habit.id));
    recompute_lifecycle(state).await
}

pub async fn get_streak_freezer_balance_impl(state: &AppState) -> Result<u32, InfraError> {
    let balance = state.api.streak_freezer_balance().await?;
    lock_runtime(state)?.freezer_balance = Some(balance);
    Ok(balance)
}

pub async fn use_streak_freezer_impl(state: &AppState) -> Result<u32, InfraError> {
    let balance = state.api.consume_streak_freezer().await?;
    lock_runtime(state)?.freezer_balance = Some(balance);
    state.log_info("use_streak_freezer", &format!("balance={balance}"));
    Ok(balance)
}

pub fn notify_clock_changed_impl(state: &AppState) {
    state.log_info("notify_clock_changed", "forcing immediate re-derivation");
    state.ticker.notify_clock_change();
}

/// Stops the periodic driver and any background poll, e.g. when the
/// habit screen disappears.
pub fn stop_engine_impl(state: &AppState) -> Result<(), InfraError> {
    state.ticker.stop();
    if let Some(handle) = lock_runtime(state)?.background_poll.take() {
        handle.abort();
    }
    Ok(())
}

/// Re-derives the lifecycle snapshot from the freshest data: active
/// window, cached entries (after an opportunistic expired-task sweep),
/// the sticky pin layer, and the in-flight flags. Newly observed
/// terminal outcomes are pinned here, with their side effects.
pub(crate) async fn recompute_lifecycle(state: &AppState) -> Result<LifecycleState, InfraError> {
    let now = (state.now_provider)();
    let policy = load_engine_policy(state.config_dir());

    let (habit, check_in, generation_in_flight, proof_in_flight) = {
        let runtime = lock_runtime(state)?;
        let habit = runtime
            .selected_habit_id
            .as_ref()
            .and_then(|id| runtime.habits.get(id))
            .cloned();
        (
            habit,
            runtime.check_in,
            runtime.generation_in_flight,
            runtime.proof_in_flight,
        )
    };
    let Some(habit) = habit else {
        lock_runtime(state)?.lifecycle = LifecycleState::Empty;
        return Ok(LifecycleState::Empty);
    };

    let resolution = resolve_window(now, state.timezone, &habit, policy.window_length)
        .ok_or_else(|| invalid_validation_time(&habit))?;
    let user_date = resolution.user_date();

    // Day rollover clears pins from previous days.
    let pin = match state.pins.load(&habit.id)? {
        Some(pin) if pin.pinned_on != user_date => {
            state.pins.clear(&habit.id)?;
            None
        }
        other => other,
    };

    let mut entries = state.entry_cache.get(&habit.id, user_date)?;
    if entries.task.as_ref().is_some_and(|task| task.is_past_due(now)) {
        // Past-due pending task: ask the backend to settle it, silently.
        if state.api.sweep_expired_tasks().await.is_ok() {
            if let Ok(updated) = state.api.get_today_task(&habit.id, user_date).await {
                state.entry_cache.set_task(&habit.id, user_date, updated)?;
                entries = state.entry_cache.get(&habit.id, user_date)?;
            }
        }
    }

    let candidate = derive(&DeriveInput {
        habit: Some(&habit),
        window: Some(&resolution),
        entries: &entries,
        generation_in_flight,
        proof_in_flight,
        check_in,
    });
    let resolved = apply_pin(pin.as_ref(), user_date, candidate);

    if pin.is_none() {
        if let Some(outcome) = pin_for(&resolved) {
            let new_pin = StickyPin::new(&habit.id, user_date, outcome);
            state.pins.save(&new_pin)?;
            match &new_pin.outcome {
                PinnedOutcome::Missed { .. } => {
                    if let Ok(balance) = state.api.streak_freezer_balance().await {
                        lock_runtime(state)?.freezer_balance = Some(balance);
                    }
                }
                PinnedOutcome::SuccessShare { task } => {
                    ensure_success_post(state, &habit, user_date, task.clone(), None).await;
                }
                _ => {}
            }
        }
    }

    lock_runtime(state)?.lifecycle = resolved.clone();
    Ok(resolved)
}

async fn apply_proof_outcome(
    state: &AppState,
    habit: &Habit,
    user_date: NaiveDate,
    outcome: ProofOutcome,
) -> Result<(), InfraError> {
    match outcome {
        ProofOutcome::Validated {
            task, auto_post_id, ..
        } => {
            let mut pin = match state.pins.load(&habit.id)? {
                Some(pin) if pin.pinned_on == user_date => pin,
                _ => StickyPin::new(
                    &habit.id,
                    user_date,
                    PinnedOutcome::SuccessShare {
                        task: Some(task.clone()),
                    },
                ),
            };
            pin.outcome = PinnedOutcome::SuccessShare {
                task: Some(task.clone()),
            };
            pin.dismissed = false;
            state.pins.save(&pin)?;
            ensure_success_post(state, habit, user_date, Some(task), auto_post_id).await;
        }
        ProofOutcome::Rejected { attempts_left, .. } => {
            state.pins.save(&StickyPin::new(
                &habit.id,
                user_date,
                PinnedOutcome::Failed { attempts_left },
            ))?;
        }
        ProofOutcome::RejectedFinal { next, .. } => {
            // Consumed for the day: a fresh pin resets every sticky flag.
            state.pins.save(&StickyPin::new(
                &habit.id,
                user_date,
                PinnedOutcome::FailedNoAttempts { next },
            ))?;
        }
    }
    Ok(())
}

/// Creates the owner-only post for a validated day exactly once. The
/// in-flight guard serializes concurrent re-derivations; the pin's
/// `post_created` flag makes the effect idempotent across them.
async fn ensure_success_post(
    state: &AppState,
    habit: &Habit,
    user_date: NaiveDate,
    task: Option<TaskEntry>,
    known_post_id: Option<String>,
) {
    {
        let Ok(mut runtime) = state.runtime.lock() else {
            return;
        };
        if runtime.post_in_flight {
            return;
        }
        runtime.post_in_flight = true;
    }
    let result = ensure_success_post_inner(state, habit, user_date, task, known_post_id).await;
    if let Ok(mut runtime) = state.runtime.lock() {
        runtime.post_in_flight = false;
    }
    if let Err(error) = result {
        state.log_error("ensure_success_post", &error.to_string());
    }
}

async fn ensure_success_post_inner(
    state: &AppState,
    habit: &Habit,
    user_date: NaiveDate,
    task: Option<TaskEntry>,
    known_post_id: Option<String>,
) -> Result<(), InfraError> {
    let Some(mut pin) = state.pins.load(&habit.id)? else {
        return Ok(());
    };
    if pin.pinned_on != user_date || pin.post_created {
        return Ok(());
    }
    if !matches!(
        pin.outcome,
        PinnedOutcome::SuccessShare { .. } | PinnedOutcome::SuccessDone
    ) {
        return Ok(());
    }

    if known_post_id.is_none() {
        let task = task.or_else(|| match &pin.outcome {
            PinnedOutcome::SuccessShare { task } => task.clone(),
            _ => None,
        });
        let request = CreatePostRequest {
            visibility: PostVisibility::Private,
            proof_reference: task.as_ref().and_then(|task| task.proof_content.clone()),
            description: task
                .as_ref()
                .map(|task| task.description.clone())
                .unwrap_or_else(|| habit.name.clone()),
            habit_id: habit.id.clone(),
            linked_task_id: task.map(|task| task.id).unwrap_or_default(),
        };
        state.api.create_post(&request).await?;
    }

    pin.post_created = true;
    state.pins.save(&pin)
}

async fn refresh_entries(
    state: &AppState,
    habit: &Habit,
    user_date: NaiveDate,
) -> Result<(), InfraError> {
    let motivation = state.api.get_motivation(&habit.id, user_date).await?;
    let ability = state.api.get_ability(&habit.id, user_date).await?;
    let task = state.api.get_today_task(&habit.id, user_date).await?;
    state.entry_cache.replace(
        &habit.id,
        user_date,
        DailyEntries {
            motivation,
            ability,
            task,
        },
    )
}

fn advance_check_in(
    state: &AppState,
    habit_id: &str,
    user_date: NaiveDate,
) -> Result<(), InfraError> {
    let entries = state.entry_cache.get(habit_id, user_date)?;
    let mut runtime = lock_runtime(state)?;
    if runtime.check_in.is_some() {
        runtime.check_in = if entries.motivation.is_none() {
            Some(CheckInStep::Motivation)
        } else if entries.ability.is_none() {
            Some(CheckInStep::Ability)
        } else {
            None
        };
    }
    Ok(())
}

fn start_ticker(state: &Arc<AppState>, tick_interval_ms: u64) {
    let weak = Arc::downgrade(state);
    state.ticker.start(
        StdDuration::from_millis(tick_interval_ms.max(1)),
        move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                if let Err(error) = recompute_lifecycle(&state).await {
                    state.log_error("lifecycle_tick", &error.to_string());
                }
            });
        },
    );
}

fn start_extended_poll(
    state: &Arc<AppState>,
    habit_id: &str,
    user_date: NaiveDate,
    policy: PollPolicy,
) {
    let weak = Arc::downgrade(state);
    let habit_id = habit_id.to_string();
    let handle = tokio::spawn(async move {
        let Some(state) = weak.upgrade() else {
            return;
        };
        let coordinator =
            GenerationCoordinator::new(Arc::clone(&state.api), Arc::clone(&state.entry_cache));
        match coordinator.await_task(&habit_id, user_date, &policy).await {
            Ok(GenerationOutcome::Ready(_)) => {
                let _ = recompute_lifecycle(&state).await;
            }
            Ok(GenerationOutcome::TimedOut) => {}
            Err(error) => state.log_error("background_task_poll", &error.to_string()),
        }
    });
    if let Ok(mut runtime) = state.runtime.lock() {
        if let Some(previous) = runtime.background_poll.replace(handle) {
            previous.abort();
        }
    }
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

fn required_habit(state: &AppState) -> Result<Habit, InfraError> {
    let runtime = lock_runtime(state)?;
    runtime
        .selected_habit_id
        .as_ref()
        .and_then(|id| runtime.habits.get(id))
        .cloned()
        .ok_or_else(|| InfraError::InvalidConfig("no habit selected".to_string()))
}

fn current_user_date(
    state: &AppState,
    habit: &Habit,
    policy: &EnginePolicy,
) -> Result<NaiveDate, InfraError> {
    let now = (state.now_provider)();
    resolve_window(now, state.timezone, habit, policy.window_length)
        .map(|resolution| resolution.user_date())
        .ok_or_else(|| invalid_validation_time(habit))
}

fn invalid_validation_time(habit: &Habit) -> InfraError {
    InfraError::InvalidConfig(format!(
        "habit {} has an invalid validation time",
        habit.id
    ))
}

fn load_api_config<F>(config_dir: &Path, lookup: F) -> Result<ApiConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = match optional_lookup_value(&lookup, &["HABITLOCK_API_BASE_URL"]) {
        Some(value) => value,
        None => read_api_base_url(config_dir)?.ok_or_else(|| {
            InfraError::InvalidConfig(
                "missing api base url (set HABITLOCK_API_BASE_URL or app.json apiBaseUrl)"
                    .to_string(),
            )
        })?,
    };
    let bearer_token = optional_lookup_value(&lookup, &["HABITLOCK_API_TOKEN"]);
    Ok(ApiConfig {
        base_url,
        bearer_token,
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn load_engine_policy(config_dir: &Path) -> EnginePolicy {
    let mut policy = EnginePolicy::default();
    let path = config_dir.join("policy.json");
    let Ok(raw) = fs::read_to_string(path) else {
        return policy;
    };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return policy;
    };

    if let Some(value) = parsed.get("windowHours").and_then(serde_json::Value::as_u64) {
        policy.window_length = Duration::hours(value.max(1) as i64);
    }
    if let Some(value) = parsed
        .get("tickIntervalMs")
        .and_then(serde_json::Value::as_u64)
    {
        policy.tick_interval_ms = value.max(1);
    }
    if let Some(poll) = parsed.get("generationPoll") {
        if let Some(value) = poll.get("intervalMs").and_then(serde_json::Value::as_u64) {
            policy.poll.interval_ms = value.max(1);
            policy.extended_poll.interval_ms = value.max(1);
        }
        if let Some(value) = poll.get("maxAttempts").and_then(serde_json::Value::as_u64) {
            policy.poll.max_attempts = value.clamp(1, u8::MAX as u64) as u8;
        }
        if let Some(value) = poll
            .get("extendedMaxAttempts")
            .and_then(serde_json::Value::as_u64)
        {
            policy.extended_poll.max_attempts = value.clamp(1, u8::MAX as u64) as u8;
        }
    }

    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::ProofPhase;
    use crate::domain::models::{DifficultyTier, Frequency, ProofType, TaskStatus, ValidationVerdict};
    use crate::infrastructure::habit_api_client::testing::ScriptedHabitApiClient;
    use crate::infrastructure::habit_api_client::ProofResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "habitlock-command-tests-{}-{sequence}",
                std::process::id()
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn write_fast_poll_policy(&self) {
            fs::create_dir_all(self.path.join("config")).expect("create config dir");
            let policy = serde_json::json!({
                "schema": 1,
                "windowHours": 4,
                "tickIntervalMs": 1000,
                "generationPoll": {
                    "intervalMs": 1,
                    "maxAttempts": 3,
                    "extendedMaxAttempts": 5
                }
            });
            fs::write(
                self.path.join("config").join("policy.json"),
                serde_json::to_string_pretty(&policy).expect("serialize policy"),
            )
            .expect("write policy");
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn adjustable_clock(start: &str) -> (NowProvider, Arc<Mutex<DateTime<Utc>>>) {
        let current = Arc::new(Mutex::new(fixed_time(start)));
        let handle = Arc::clone(&current);
        let provider: NowProvider = Arc::new(move || *handle.lock().expect("clock lock"));
        (provider, current)
    }

    fn sample_habit() -> Habit {
        Habit {
            id: "hab-1".to_string(),
            name: "Evening reading".to_string(),
            frequency: Frequency::Daily,
            validation_time: "21:00".to_string(),
            difficulty: DifficultyTier::Medium,
            proof_style: ProofType::Photo,
            streak: 4,
        }
    }

    fn seeded_api() -> Arc<ScriptedHabitApiClient> {
        let api = Arc::new(ScriptedHabitApiClient::default());
        api.habits
            .lock()
            .expect("habits lock")
            .push(sample_habit());
        api
    }

    fn engine(
        workspace: &TempWorkspace,
        api: Arc<ScriptedHabitApiClient>,
        now: &str,
    ) -> (Arc<AppState>, Arc<Mutex<DateTime<Utc>>>) {
        workspace.write_fast_poll_policy();
        let (provider, clock) = adjustable_clock(now);
        let state = AppState::with_api(workspace.path.clone(), api)
            .expect("initialize app state")
            .with_now_provider(provider);
        (Arc::new(state), clock)
    }

    fn pending_task(remaining_attempts: u32) -> TaskEntry {
        TaskEntry {
            id: "tsk-1".to_string(),
            habit_id: "hab-1".to_string(),
            description: "Read 20 pages".to_string(),
            easier_alternative: None,
            harder_alternative: None,
            due_at: fixed_time("2026-02-17T01:00:00Z"),
            status: TaskStatus::Pending,
            remaining_attempts,
            proof_type: Some(ProofType::Photo),
            proof_content: Some("upload-1".to_string()),
            verdict: None,
        }
    }

    fn verdict(is_valid: bool) -> ValidationVerdict {
        ValidationVerdict {
            is_valid,
            confidence: 0.9,
            feedback: "checked".to_string(),
        }
    }

    fn proof_response(status: TaskStatus, remaining_attempts: u32, is_valid: bool) -> ProofResponse {
        let mut task = pending_task(remaining_attempts);
        task.status = status;
        ProofResponse {
            task,
            verdict: verdict(is_valid),
            auto_post_id: None,
        }
    }

    fn photo_payload() -> ProofPayload {
        ProofPayload::Media {
            media_type: ProofType::Photo,
            reference: "upload-1".to_string(),
        }
    }

    #[tokio::test]
    async fn selecting_unknown_habit_fails() {
        let workspace = TempWorkspace::new();
        let (state, _clock) = engine(&workspace, seeded_api(), "2026-02-16T12:00:00Z");
        let result = select_habit_impl(&state, Some("missing".to_string())).await;
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn check_in_flow_reaches_ready_to_generate() {
        let workspace = TempWorkspace::new();
        let (state, _clock) = engine(&workspace, seeded_api(), "2026-02-16T21:30:00Z");

        let selected = select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");
        assert_eq!(
            selected,
            LifecycleState::ValidationTime {
                until_close_secs: 12_600,
                motivation_set: false,
                ability_set: false,
            }
        );

        let begun = begin_check_in_impl(&state).await.expect("begin check-in");
        assert_eq!(begun, LifecycleState::SetMotivation);

        let after_motivation = set_motivation_impl(&state, MotivationLevel::High)
            .await
            .expect("set motivation");
        assert_eq!(after_motivation, LifecycleState::SetAbility);

        let after_ability = set_ability_impl(&state, AbilityLevel::Medium)
            .await
            .expect("set ability");
        assert_eq!(after_ability, LifecycleState::ReadyToGenerateTask);
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn waiting_state_counts_down_before_open() {
        let workspace = TempWorkspace::new();
        let (state, _clock) = engine(&workspace, seeded_api(), "2026-02-16T20:59:00Z");
        let selected = select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");
        assert_eq!(
            selected,
            LifecycleState::WaitingForValidationTime {
                until_open_secs: 60,
                motivation_set: false,
                ability_set: false,
            }
        );
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn duplicate_motivation_create_falls_back_to_update() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T21:30:00Z");
        select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");

        set_motivation_impl(&state, MotivationLevel::Low)
            .await
            .expect("first write creates");
        set_motivation_impl(&state, MotivationLevel::High)
            .await
            .expect("second write updates instead of erroring");

        let user_date = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        let stored = api
            .motivation
            .lock()
            .expect("motivation lock")
            .get(&("hab-1".to_string(), user_date))
            .cloned()
            .expect("entry exists");
        assert_eq!(stored.level, MotivationLevel::High);
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn generation_polls_to_show_task_and_ignores_duplicates() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T21:30:00Z");
        select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");
        set_motivation_impl(&state, MotivationLevel::High)
            .await
            .expect("set motivation");
        set_ability_impl(&state, AbilityLevel::Medium)
            .await
            .expect("set ability");

        api.push_task_response(Ok(None));
        api.push_task_response(Ok(Some(pending_task(3))));
        let generated = generate_task_impl(&state).await.expect("generate task");
        assert_eq!(
            generated,
            LifecycleState::ShowTask {
                task: pending_task(3),
                proof: ProofPhase::Idle,
            }
        );
        let calls_after_first = api.generate_calls.load(Ordering::SeqCst);
        assert_eq!(calls_after_first, 1);

        // A second request while one is marked in flight is a no-op.
        lock_runtime(&state).expect("runtime").generation_in_flight = true;
        let _ = generate_task_impl(&state).await.expect("no-op");
        assert_eq!(api.generate_calls.load(Ordering::SeqCst), calls_after_first);
        lock_runtime(&state).expect("runtime").generation_in_flight = false;
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn generation_timeout_surfaces_retryable_error() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T21:30:00Z");
        select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");
        set_motivation_impl(&state, MotivationLevel::High)
            .await
            .expect("set motivation");
        set_ability_impl(&state, AbilityLevel::Medium)
            .await
            .expect("set ability");

        // No task ever appears within the 3-attempt test budget.
        let result = generate_task_impl(&state).await.expect("command completes");
        assert!(matches!(result, LifecycleState::Error { .. }));
        assert_eq!(
            lifecycle_state_impl(&state).expect("snapshot"),
            LifecycleState::ReadyToGenerateTask
        );
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn valid_proof_pins_success_and_posts_exactly_once() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        api.push_task_response(Ok(Some(pending_task(3))));
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T21:30:00Z");
        select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");

        api.push_proof_response(Ok(proof_response(TaskStatus::Completed, 3, true)));
        let shared = submit_proof_impl(&state, photo_payload())
            .await
            .expect("submit proof");
        assert!(matches!(shared, LifecycleState::SuccessShare { .. }));
        assert_eq!(api.posts.lock().expect("posts lock").len(), 1);

        // Re-evaluating the transition twice must not duplicate the post.
        recompute_lifecycle(&state).await.expect("recompute");
        recompute_lifecycle(&state).await.expect("recompute");
        assert_eq!(api.posts.lock().expect("posts lock").len(), 1);

        // Sharing to friends advances the streak and finalizes the day.
        api.freezer_balance.store(2, Ordering::SeqCst);
        let done = share_success_impl(&state, PostVisibility::Friends)
            .await
            .expect("share success");
        assert_eq!(done, LifecycleState::SuccessDone);
        let updated = api.updated_habits.lock().expect("updated lock");
        assert_eq!(updated.last().map(|habit| habit.streak), Some(5));
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn invalid_proofs_walk_failed_then_failed_no_attempts() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        api.push_task_response(Ok(Some(pending_task(1))));
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T21:30:00Z");
        select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");

        api.push_proof_response(Ok(proof_response(TaskStatus::Pending, 0, false)));
        let first = submit_proof_impl(&state, photo_payload())
            .await
            .expect("first submission");
        assert_eq!(first, LifecycleState::Failed { attempts_left: 0 });

        api.push_proof_response(Ok(proof_response(TaskStatus::Failed, 0, false)));
        let second = submit_proof_impl(&state, photo_payload())
            .await
            .expect("second submission");
        assert!(matches!(
            second,
            LifecycleState::FailedNoAttempts { next: Some(_) }
        ));
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn sticky_state_survives_entry_loss_until_day_rollover() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        api.push_task_response(Ok(Some(pending_task(1))));
        let (state, clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T21:30:00Z");
        select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");

        api.push_proof_response(Ok(proof_response(TaskStatus::Pending, 0, false)));
        submit_proof_impl(&state, photo_payload())
            .await
            .expect("submission");

        // Drop the backing task entirely: the pin keeps re-emitting.
        let user_date = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        state
            .entry_cache
            .set_task("hab-1", user_date, None)
            .expect("clear task");
        let re_derived = recompute_lifecycle(&state).await.expect("recompute");
        assert_eq!(re_derived, LifecycleState::Failed { attempts_left: 0 });

        // Past local midnight the pin is cleared and derivation restarts.
        *clock.lock().expect("clock lock") = fixed_time("2026-02-17T12:00:00Z");
        let next_day = recompute_lifecycle(&state).await.expect("recompute");
        assert_eq!(
            next_day,
            LifecycleState::WaitingForValidationTime {
                until_open_secs: 9 * 3600,
                motivation_set: false,
                ability_set: false,
            }
        );
        assert!(state.pins.load("hab-1").expect("pin load").is_none());
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn elapsed_window_pins_missed_and_dismisses_to_dismissable() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        api.freezer_balance.store(2, Ordering::SeqCst);
        // A 10:00-14:00 window probed at 20:00: elapsed, no carry-over.
        let mut habit = sample_habit();
        habit.validation_time = "10:00".to_string();
        *api.habits.lock().expect("habits lock") = vec![habit];
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T20:00:00Z");

        let selected = select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");
        assert!(matches!(selected, LifecycleState::Missed { .. }));

        let dismissed = dismiss_outcome_impl(&state).await.expect("dismiss");
        assert!(matches!(dismissed, LifecycleState::DismissableMissed { .. }));

        // The freezer balance was refreshed when the miss was pinned.
        assert_eq!(
            state.runtime.lock().expect("runtime").freezer_balance,
            Some(2)
        );
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn past_due_pending_task_triggers_expired_sweep() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        let mut stale = pending_task(3);
        stale.due_at = fixed_time("2026-02-16T22:00:00Z");
        api.push_task_response(Ok(Some(stale.clone())));
        // The sweep's refetch returns the task settled as missed.
        let mut settled = stale.clone();
        settled.status = TaskStatus::Missed;
        api.push_task_response(Ok(Some(settled)));

        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T23:30:00Z");
        let selected = select_habit_impl(&state, Some("hab-1".to_string()))
            .await
            .expect("select habit");

        assert!(api.sweep_calls.load(Ordering::SeqCst) >= 1);
        assert!(matches!(selected, LifecycleState::Missed { .. }));
        stop_engine_impl(&state).expect("stop engine");
    }

    #[tokio::test]
    async fn consuming_a_freezer_updates_the_cached_balance() {
        let workspace = TempWorkspace::new();
        let api = seeded_api();
        api.freezer_balance.store(3, Ordering::SeqCst);
        let (state, _clock) = engine(&workspace, Arc::clone(&api), "2026-02-16T12:00:00Z");

        let balance = use_streak_freezer_impl(&state).await.expect("consume");
        assert_eq!(balance, 2);
        assert_eq!(
            state.runtime.lock().expect("runtime").freezer_balance,
            Some(2)
        );
    }

    #[test]
    fn api_config_requires_a_base_url() {
        let workspace = TempWorkspace::new();
        // No config files yet and no env: assembling from a bare lookup
        // must name the missing setting.
        let result = load_api_config(&workspace.path.join("config"), |_| None);
        assert!(matches!(result, Err(InfraError::Io(_)) | Err(InfraError::InvalidConfig(_))));

        let result = load_api_config(&workspace.path.join("config"), |key| {
            (key == "HABITLOCK_API_BASE_URL").then(|| "https://api.test".to_string())
        });
        let config = result.expect("env base url wins");
        assert_eq!(config.base_url, "https://api.test");
        assert!(config.bearer_token.is_none());
    }
}
