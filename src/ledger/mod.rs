pub mod memory;
pub mod models;
pub mod repository;
pub mod service;
pub mod store;

pub use memory::InMemoryLedger;
pub use repository::PgLedgerRepository;
pub use service::{LedgerService, OrderRegistration};
