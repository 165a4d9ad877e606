//! Integration tests for flakesql-client against a mocked statements API.
//!
//! Every test starts its own `wiremock` server, so no account or network
//! access is needed.

mod helpers;
mod query;
mod retry;
mod streaming;
