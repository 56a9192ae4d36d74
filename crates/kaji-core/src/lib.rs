//! Core types for the Kaji household task tracker.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the team-state vocabulary (revisions, entity tags, change events), the
//! calendar arithmetic behind window closing, and the in-process event hub.

pub mod calendar;
pub mod closing;
pub mod error;
pub mod event;
pub mod home;
pub mod hub;
pub mod task;
pub mod team;

pub use error::{Error, ErrorKind, Result};
