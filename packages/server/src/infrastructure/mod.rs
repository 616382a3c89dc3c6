//! Infrastructure layer: concrete implementations of domain interfaces.

pub mod auth;
pub mod dispatcher;
pub mod dto;
pub mod repository;
pub mod seed;
