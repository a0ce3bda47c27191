//! API middleware

pub mod auth;
