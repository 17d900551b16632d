// src/api/handlers/mod.rs
pub mod health;
pub mod verification;
