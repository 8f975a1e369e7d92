pub mod scheduler;

pub use scheduler::{ReconciliationScheduler, SchedulerConfig};
