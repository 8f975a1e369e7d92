pub mod client;

pub use client::{AccrualClient, HttpAccrualClient};
