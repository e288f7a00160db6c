//! Unified error types for the MCE core.
//!
//! Follows the same shape as a typed leaf-error-per-domain design: every
//! fallible operation in the core funnels into [`Error`], keeping the
//! top-level event loop's error handling uniform. Most domain errors are
//! never propagated as `Result` values into the datapipe machinery itself
//! (per §7 of the design notes, a failed write or IPC call is logged, not
//! threaded through state) — this type exists for the boundary operations
//! that *do* need a typed outcome: settings loading, sysfs probing, and bus
//! client calls.

use thiserror::Error;

/// Every fallible boundary operation in the core funnels into this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("datapipe: {0}")]
    Datapipe(#[from] DatapipeError),

    #[error("bus: {0}")]
    Bus(#[from] BusError),

    #[error("sysfs: {0}")]
    Sysfs(#[from] SysfsError),

    #[error("settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("init: {0}")]
    Init(String),
}

/// Errors raised by the event bus (datapipe) machinery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatapipeError {
    /// A publish re-entered the same channel it was already dispatching.
    #[error("channel '{0}' re-entered during its own publish")]
    Reentrant(&'static str),
    /// A mutation was attempted on a read-only channel.
    #[error("channel '{0}' is read-only")]
    ReadOnly(&'static str),
}

/// Errors from the bus client (C4).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("method call failed: {0}")]
    CallFailed(String),
    #[error("reply had an unexpected signature: expected {expected}, got {got}")]
    SignatureMismatch {
        expected: &'static str,
        got: String,
    },
    #[error("peer {0} has no known owner")]
    NoOwner(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from sysfs probing/writing (shared by C7 and C9).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SysfsError {
    #[error("no candidate path was writable")]
    NotDiscovered,
    #[error("write to {0} failed: {1}")]
    WriteFailed(String, String),
}

/// Errors from settings load/validation (§6.6).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {0}: {1}")]
    Io(String, String),
    #[error("failed to parse settings: {0}")]
    Parse(String),
    #[error("key '{key}' failed validation: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Core-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
