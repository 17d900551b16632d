// src/core/document/mod.rs
pub mod classifier;
pub mod parser;
pub mod storage;

pub use classifier::{DocumentClassifier, DocumentType};
pub use parser::parse_fields;
pub use storage::{DocumentHandle, DocumentStorage, LocalDocumentStorage};
