//! Request and response bodies

pub mod actions;
pub mod admin;
pub mod fintech;
