//! Test modules for the server crate

mod config_tests;
mod main_tests;
mod queue_tests;
mod rate_limiter_tests;
