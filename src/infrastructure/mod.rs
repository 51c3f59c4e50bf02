// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod firestore_repository;
pub mod firestore_value;
pub mod http_response;
pub mod memory_store;
