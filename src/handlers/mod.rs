//! HTTP handlers for the common CRUD endpoints.

pub mod common;
