//! Exclusive, reference-counted access to encrypted files.
//!
//! [`FileHandleRegistry`] hands out one [`ManagedFileHandle`] per path. A
//! handle serializes read-modify-write cycles through a FIFO lock whose
//! ownership is a [`HandleGuard`], and evicts itself from the registry once
//! it has been idle (unlocked, no references) for the configured delay.
//!
//! ```no_run
//! # async fn demo() -> nv_files::FilesResult<()> {
//! use std::sync::Arc;
//! use nv_files::{FileHandleRegistry, RegistryConfig, XChaChaCipher};
//!
//! let cipher = Arc::new(XChaChaCipher::from_secret(b"secret"));
//! let registry = FileHandleRegistry::new(cipher, RegistryConfig::default());
//!
//! let guard = registry.lock("/tmp/vault/notes.map").await?;
//! guard
//!     .handle()
//!     .update_map(&guard, |map| map.add_text("title", "hello"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cipher;
mod config;
mod error;
mod handle;
mod registry;
mod spawn;

pub use cipher::{ByteStream, CipherBackend, PlaintextCipher, XChaChaCipher};
pub use config::{DEFAULT_CLEANUP_DELAY_MS, RegistryConfig};
pub use error::{HandleError, OpenError};
pub use handle::{HandleGuard, HandleId, ManagedFileHandle, ReferenceId};
pub use registry::FileHandleRegistry;

pub type FilesResult<T> = Result<T, HandleError>;
