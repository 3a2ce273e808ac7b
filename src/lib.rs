pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    begin_check_in_impl, create_habit_impl, delete_habit_impl, dismiss_outcome_impl,
    generate_task_impl, get_streak_freezer_balance_impl, lifecycle_state_impl, list_habits_impl,
    notify_clock_changed_impl, select_habit_impl, set_ability_impl, set_motivation_impl,
    share_success_impl, stop_engine_impl, submit_proof_impl, update_habit_impl,
    use_streak_freezer_impl,
};
use std::sync::Arc;

pub use application::commands::AppState;
pub use domain::lifecycle::{LifecycleState, ProofPhase};
pub use domain::models::{
    AbilityLevel, DifficultyTier, Frequency, Habit, MotivationLevel, PostVisibility, ProofPayload,
    ProofType, TaskEntry, TaskStatus,
};

pub async fn list_habits(state: &AppState) -> Result<Vec<Habit>, String> {
    list_habits_impl(state)
        .await
        .map_err(|error| state.command_error("list_habits", &error))
}

pub async fn create_habit(state: &AppState, habit: Habit) -> Result<Habit, String> {
    create_habit_impl(state, habit)
        .await
        .map_err(|error| state.command_error("create_habit", &error))
}

pub async fn update_habit(state: &AppState, habit: Habit) -> Result<Habit, String> {
    update_habit_impl(state, habit)
        .await
        .map_err(|error| state.command_error("update_habit", &error))
}

pub async fn delete_habit(state: &AppState, habit_id: String) -> Result<bool, String> {
    delete_habit_impl(state, habit_id)
        .await
        .map_err(|error| state.command_error("delete_habit", &error))
}

pub async fn select_habit(
    state: &Arc<AppState>,
    habit_id: Option<String>,
) -> Result<LifecycleState, String> {
    select_habit_impl(state, habit_id)
        .await
        .map_err(|error| state.command_error("select_habit", &error))
}

pub fn lifecycle_state(state: &AppState) -> Result<LifecycleState, String> {
    lifecycle_state_impl(state).map_err(|error| state.command_error("lifecycle_state", &error))
}

pub async fn begin_check_in(state: &AppState) -> Result<LifecycleState, String> {
    begin_check_in_impl(state)
        .await
        .map_err(|error| state.command_error("begin_check_in", &error))
}

pub async fn set_motivation(
    state: &AppState,
    level: MotivationLevel,
) -> Result<LifecycleState, String> {
    set_motivation_impl(state, level)
        .await
        .map_err(|error| state.command_error("set_motivation", &error))
}

pub async fn set_ability(state: &AppState, level: AbilityLevel) -> Result<LifecycleState, String> {
    set_ability_impl(state, level)
        .await
        .map_err(|error| state.command_error("set_ability", &error))
}

pub async fn generate_task(state: &AppState) -> Result<LifecycleState, String> {
    generate_task_impl(state)
        .await
        .map_err(|error| state.command_error("generate_task", &error))
}

pub async fn submit_proof(
    state: &AppState,
    payload: ProofPayload,
) -> Result<LifecycleState, String> {
    submit_proof_impl(state, payload)
        .await
        .map_err(|error| state.command_error("submit_proof", &error))
}

pub async fn dismiss_outcome(state: &AppState) -> Result<LifecycleState, String> {
    dismiss_outcome_impl(state)
        .await
        .map_err(|error| state.command_error("dismiss_outcome", &error))
}

pub async fn share_success(
    state: &AppState,
    visibility: PostVisibility,
) -> Result<LifecycleState, String> {
    share_success_impl(state, visibility)
        .await
        .map_err(|error| state.command_error("share_success", &error))
}

pub async fn get_streak_freezer_balance(state: &AppState) -> Result<u32, String> {
    get_streak_freezer_balance_impl(state)
        .await
        .map_err(|error| state.command_error("get_streak_freezer_balance", &error))
}

pub async fn use_streak_freezer(state: &AppState) -> Result<u32, String> {
    use_streak_freezer_impl(state)
        .await
        .map_err(|error| state.command_error("use_streak_freezer", &error))
}

pub fn notify_clock_changed(state: &AppState) {
    notify_clock_changed_impl(state);
}

pub fn stop_engine(state: &AppState) -> Result<(), String> {
    stop_engine_impl(state).map_err(|error| state.command_error("stop_engine", &error))
}
