//! Integration tests for itemstore-web
//!
//! Uses wiremock to simulate JSON web services and verifies paging,
//! mutations, error mapping and the controller running over HTTP.

mod common;

mod test_controller;
mod test_fetch;
mod test_mutations;
