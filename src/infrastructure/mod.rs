pub mod config;
pub mod entry_cache;
pub mod error;
pub mod habit_api_client;
pub mod pin_repository;
pub mod storage;
