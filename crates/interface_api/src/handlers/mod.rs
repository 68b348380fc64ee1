//! Route handlers

pub mod actions;
pub mod admin;
pub mod fintech;
pub mod health;
