//! removd - batch intake for a background-removal service
//!
//! Probes images from files, buffers and URLs with as few bytes as possible,
//! assigns each a billed size tier, and submits them to a remote transform
//! service in bounded concurrent windows.
//!
//! # Module Structure
//!
//! - `probe` - Adaptive prefix reading over files, buffers and HTTP streams
//! - `intake` - Request validation, classification and payload loading
//! - `scheduler` - Windowed batch execution with a progress stream
//! - `transformer` - The remote transform seam, account query and HTTP client
//! - `pipeline` - Single and batch runs, result restore and output writing
//! - `config`, `logging`, `error` - Ambient setup
//!
//! # Usage
//!
//! ```ignore
//! use removd::{ApiKey, Config, ImageSource, ItemRequest, Pipeline};
//!
//! removd::logging::init();
//! let config = Config::from_env()?;
//! let key = ApiKey::from_env_or(None).expect("REMOVD_API_KEY");
//! let pipeline = Pipeline::from_config(config, key)?;
//!
//! let results = pipeline
//!     .batch(vec![ItemRequest::new(ImageSource::path("shoe.jpg"))])
//!     .await;
//! ```

pub mod config;
pub mod error;
pub mod intake;
pub mod logging;
pub mod pipeline;
pub mod probe;
pub mod scheduler;
pub mod source;
pub mod transformer;

#[cfg(test)]
mod test_support;

pub use config::{ApiKey, Config};
pub use error::{Error, Result};
pub use intake::{ItemOptions, ItemRequest, TextOutput, TransformRequest};
pub use pipeline::{BatchRunner, Pipeline, ProgressBatch, TransformOutcome};
pub use scheduler::{run_batch, Failure, Prepared, ProgressStream, WorkItem, WorkResult};
pub use source::{ImageSource, SourceId};
pub use transformer::{Account, HttpTransformer, RemoteResult, Transformer};

/// Get the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
