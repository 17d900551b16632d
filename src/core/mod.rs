// src/core/mod.rs
pub mod document;
pub mod identity;
pub mod matching;
pub mod ocr;
pub mod services;
pub mod verification;
