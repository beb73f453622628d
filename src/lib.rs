pub mod agent;
pub mod engine;
pub mod i18n;
pub mod report;
pub mod spec;
pub mod suite;
pub mod telemetry;
pub mod types;

// Re-export the localization helpers
pub use crate::i18n::{t, t_with_args};
