//! CLI integration tests driving the full pipeline against fake tools.

#![cfg(unix)]

mod build_tests;
mod common;
mod tool_tests;
mod upload_tests;
