//! End-to-end pipeline tests with in-memory collaborators.

mod build_tests;
mod common;
