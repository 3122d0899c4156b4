//! Persisted registry of installed versions.

pub mod db;

pub use db::{DbError, StateDb};
