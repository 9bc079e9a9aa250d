//! In-memory repository doubles and fixtures for tests

pub mod fixtures;
mod mock_file_repository;
mod mock_webhook_repository;

pub use mock_file_repository::MockFileRepository;
pub use mock_webhook_repository::MockWebhookRepository;
