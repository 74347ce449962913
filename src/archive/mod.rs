//! Downloading model archives and locating the model inside them.
//!
//! `AssetDownloader` abstracts the network fetch for testability.
//! `HttpDownloader` streams over HTTP; tests use `MockDownloader`.

pub mod download;
pub mod extract;

pub use download::{AssetDownloader, HttpDownloader};
pub use extract::{extract_zip, find_model_file, locate_model};
