//! Integration tests for the sync engine
//!
//! Engine scenarios run against an in-process page source and in-memory
//! stores; the HTTP tests drive the real REST client, downloader and document
//! store against wiremock servers.

mod common;
mod http_tests;
mod sync_tests;
