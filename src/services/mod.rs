pub mod ai_service;
pub mod api_client;
pub mod auth_service;
pub mod coordinator;
pub mod notifier;
pub mod session_cache;
pub mod session_controller;
pub mod settings;
pub mod storage;
