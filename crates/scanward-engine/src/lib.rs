//! Detection engine adapters for scanward.
//!
//! Every external or in-process detection engine is wrapped in an
//! [`EngineAdapter`], which turns one invocation into a typed
//! [`ScanOutcome`](scanward_core::ScanOutcome). Adapters are grouped in an
//! [`AdapterSet`] keyed by [`EngineKind`](scanward_core::EngineKind).
//!
//! # Adapters
//!
//! - [`CommandAdapter`] - runs a command-line scanner such as `clamscan`
//! - [`SignatureAdapter`] - matches BLAKE3 digests against a signature list
//! - [`IntegrityAdapter`] - compares BLAKE3 digests against a baseline
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use scanward_core::{EngineKind, ScanTask};
//! use scanward_engine::{AdapterSet, SignatureAdapter};
//! use tokio_util::sync::CancellationToken;
//!
//! let adapter = SignatureAdapter::from_file("signatures.db", Duration::from_secs(30)).unwrap();
//! let adapters = AdapterSet::new().with(adapter);
//!
//! let task = ScanTask::new("/tmp/download.exe", EngineKind::Signature);
//! let engine = adapters.get(EngineKind::Signature).unwrap();
//! let outcome = engine.invoke(&task, &CancellationToken::new()).unwrap();
//! println!("{}: {}", outcome.path.display(), outcome.verdict);
//! ```

mod adapter;
mod command;
mod digest;
mod integrity;
mod normalize;
mod signature;

pub use adapter::{AdapterSet, EngineAdapter};
pub use command::{CommandAdapter, CommandSpec};
pub use digest::hash_file;
pub use integrity::{Baseline, IntegrityAdapter};
pub use normalize::{EngineRecord, RawReport};
pub use signature::{SignatureAdapter, SignatureDb};
