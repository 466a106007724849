// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod alarm;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod time_series;
pub mod upstream;
pub mod util;
