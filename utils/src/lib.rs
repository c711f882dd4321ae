//! Shared infrastructure utilities for sieve.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename), used for
//!   checkpoints, result documents and reports.

pub mod atomic_write;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, atomic_write,
    atomic_write_with_options, recover_bak_file, write_json_atomic,
};
