// src/api/mod.rs
pub mod auth;
pub mod error;
pub mod handlers;
pub mod types;
pub mod upload;

pub use error::ApiError;
pub use upload::UploadArea;
