//! HTTP handlers for entity CRUD and search.

pub mod entity;
