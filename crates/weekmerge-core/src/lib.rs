pub mod config;
pub mod error;
pub mod frames;
pub mod history;
pub mod jobs;
pub mod key_correction;
pub mod merge;
pub mod notify;
pub mod reconcile;
pub mod release_alignment;
pub mod source;
pub mod storage;
pub mod temporal;
pub mod weekly_delta;

pub use error::{MissingInput, PipelineError, Result};
