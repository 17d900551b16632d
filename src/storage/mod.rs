// src/storage/mod.rs
pub mod encrypted;

pub use encrypted::{EncryptedStore, StorageError, StoreTransaction};
