//! Integration tests for the crawler
//!
//! Pool and resume behaviour runs against scripted in-memory sessions;
//! the HTTP session and a full pipeline run use wiremock servers.

mod pipeline_tests;
mod resume_tests;
mod stage_tests;
mod support;
