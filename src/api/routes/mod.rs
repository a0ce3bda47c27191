//! Route handlers

pub mod alerts;
pub mod health;
pub mod register;
pub mod stats;
pub mod status;
