//! Utilities shared between Huddle packages.

pub mod logger;
pub mod time;
