//! Route handlers organized by concern

pub mod debug;
pub mod health;
pub mod webhooks;
