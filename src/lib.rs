//! # General Loader
//!
//! Replays a producer-generated, self-describing binary event stream as
//! schema-definition and data-write operations against a columnar backend:
//! - Exact, aligned reads from an untrusted stream
//! - Strict header validation (signature, byte order, version, packing)
//! - Producer id → cursor/column handle registries
//! - Ordered, exactly-once replay with full cleanup on failure
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Byte Stream (Read)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Exact Reader                              │
//! │          (scratch buffer, cumulative offset, align)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────────┐
//!   │   Header    │          │ Event Dispatcher │◄──► Id Registries
//!   │  Validator  │          │  (GeneralLoader) │
//!   └─────────────┘          └────────┬────────┘
//!                                     │
//!                                     ▼
//!                             ┌─────────────┐
//!                             │   Backend   │
//!                             │ (Dir / Mem) │
//!                             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod registry;
pub mod session;
pub mod backend;
pub mod loader;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, LoaderError, Result};
pub use config::Config;
pub use backend::{Backend, DirBackend, MemoryBackend};
pub use loader::{load, GeneralLoader, LoadSummary, LoaderState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
