//! The translation layer between the flat key space and the file-browser
//! view. Every component recomputes its answer from the store on each call.

pub mod browser_service;
pub mod delete;
pub mod listing;
pub mod pagination;
pub mod search;
pub mod transfer;
pub mod tree;
pub mod validation;

use std::io;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("{0}")]
    Validation(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("request cancelled before the listing completed")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
