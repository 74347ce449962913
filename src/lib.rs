//! arkmesh - image-to-3D generation client with a local model cache.
//!
//! The library side covers the remote generation API ([`providers`]), task
//! polling ([`tasks`]), archive download and extraction ([`archive`]), the
//! URL-keyed model cache ([`cache`]) and the pipeline tying them together
//! ([`pipeline`]). The `arkmesh` binary wraps these in a CLI.

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod tasks;

pub use cache::{ModelCache, ModelRecord};
pub use config::Config;
pub use error::{ArkError, Result};
pub use pipeline::{generate_model, FetchedModel, ModelFetcher};
