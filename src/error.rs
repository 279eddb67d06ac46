//! Error taxonomy for the surfaces that can fail independently of the
//! Script state machine (which reports its own failures through `State`
//! and `ErrorCode` rather than `Result`, see [`crate::Script::update`]).
//!
//! Modeled on the sibling `hotlib` crate's `thiserror`-derived error
//! enums rather than the chosen teacher's (whose own `error.rs` wasn't
//! available to imitate directly).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to copy {0} to shadow path {1}")]
    CopyTimeOut(PathBuf, PathBuf),

    #[error("failed to load library {0}: {1}")]
    Load(PathBuf, #[source] libloading::Error),

    #[error("ran out of candidate shadow paths for {0}")]
    ShadowPathExhausted(PathBuf),

    #[error("failed to create file watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("rebuild command failed to start: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
