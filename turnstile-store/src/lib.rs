pub mod app_config;
pub mod database;
mod errors;
pub mod event_repo;
pub mod inventory_repo;
pub mod memory;
pub mod payment_gateway;
pub mod redis_repo;
pub mod registration_repo;
mod rows;
pub mod transaction_repo;
pub mod unit_of_work;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use payment_gateway::HttpPaymentGateway;
pub use redis_repo::RedisClient;
