//! Common utilities and types shared across cloudshelf crates.
//!
//! This crate provides the error taxonomy every storage backend reports
//! through, the helpers that manipulate slash-separated storage keys, and a
//! redacting wrapper for credentials.

pub mod error;
pub mod key;
pub mod secret;

pub use error::{Error, Result};
pub use key::{
    encode_path, file_name, folder_prefix, is_folder_key, parent_prefix, relative_to,
    replace_prefix, trim_key,
};
pub use secret::Secret;
