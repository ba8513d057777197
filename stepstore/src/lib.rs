//! `stepstore` is a step-oriented write engine for domain-decomposed array data on object storage.
//!
//! A parallel simulation runs as a fixed group of ranks, each holding one block of every global array.
//! Every rank opens a [`StepEngine`] and, step by step, puts the values of its blocks into the engine.
//! At the end of each step the engine writes one object per variable, named by an
//! [`ObjectKeyEncoding`](object_key::ObjectKeyEncoding) from the job, experiment, step, variable,
//! block offsets and rank, so ranks never coordinate and never overwrite each other.
//!
//! ## Getting started
//! - Decompose the global array with [`decomposition::decompose`] and declare the variables of the
//!   local block in a [`VariableCatalog`](variable::VariableCatalog).
//! - Parse an [`EngineConfig`] from string parameters, or read a [`ConfigFile`](config::ConfigFile).
//! - Create a transport from a [`TransportConfig`](transport::TransportConfig), or use one of the
//!   [`storage`] transports directly.
//! - [`StepEngine::open`], then loop over [`StepEngine::begin_step`], [`StepEngine::put`] and
//!   [`StepEngine::end_step`], then [`StepEngine::close`].
//!
//! ```rust
//! # use std::sync::Arc;
//! use stepstore::decomposition::{decompose, ProcessGrid};
//! use stepstore::storage::{transport::MemoryTransport, OpenMode};
//! use stepstore::variable::{ElementType, Variable, VariableCatalog};
//! use stepstore::{EngineConfig, PutMode, StepEngine, StepMode};
//!
//! let grid = ProcessGrid::try_from([1u64, 2].as_slice())?;
//! let transport = Arc::new(MemoryTransport::new());
//! for rank in 0..2 {
//!     let block = decompose(&[2, 4], &grid, rank)?;
//!     let mut catalog = VariableCatalog::new();
//!     catalog.declare(Variable::from_decomposition("T", ElementType::Float64, &block)?)?;
//!     let config = EngineConfig::from_params([("jobId", "job1"), ("experimentName", "demo")])?;
//!     let mut engine = StepEngine::open("demo", Arc::new(catalog), transport.clone(), config, rank, OpenMode::Write)?;
//!     for step in 0..3 {
//!         engine.begin_step(StepMode::Append, None)?;
//!         engine.put("T", &[f64::from(step); 4], PutMode::Deferred)?;
//!         engine.end_step()?;
//!     }
//!     engine.close()?;
//! }
//! assert_eq!(transport.list().len(), 6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate features
//! - `filesystem` (default): the filesystem transport.
//! - `gzip` (default): the `gzip` compression transform.
//! - `object_store`: transports for any `object_store` backend (`s3://`, `gs://`, `az://`, `file://`, `memory://`).
//!
//! ## Licence
//! `stepstore` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::wildcard_enum_match_arm)]

pub mod buffer;
pub mod config;
pub mod element;
pub mod engine;
pub mod transform;
pub mod transport;
pub mod variable;

#[cfg(feature = "filesystem")]
pub use stepstore_filesystem as filesystem;
#[cfg(feature = "object_store")]
pub use stepstore_object_store as object_store;
pub use stepstore_decomposition as decomposition;
pub use stepstore_object_key as object_key;
pub use stepstore_storage as storage;

pub use config::{ConfigurationError, EngineConfig};
pub use engine::{EngineError, EngineStatus, PutMode, StepEngine, StepMode, StepStatus};
