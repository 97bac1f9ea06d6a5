pub mod retention;

pub use retention::run_session_log_retention;
