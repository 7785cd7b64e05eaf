//! Integration test suite
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! pipeline end-to-end against temporary input and output files.

mod pipeline_tests;
