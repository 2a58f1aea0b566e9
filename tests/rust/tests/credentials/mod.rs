//! Credential resolution integration tests

mod resolver;
