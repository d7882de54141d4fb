//! # protomod
//!
//! This library resolves trees of schema files into validated modules and
//! workspaces. It is designed to be used by the `protomod` command-line tool
//! but can also be embedded by anything that needs the same view of a schema
//! source tree: the files, where they came from, and how modules depend on
//! each other.
//!
//! ## Quick Example
//!
//! ```
//! use protomod::config::ModuleConfig;
//! use protomod::module_builder::ModuleBucketBuilder;
//! use protomod::storage::MemoryBucket;
//!
//! // Create an in-memory bucket
//! let bucket = MemoryBucket::new();
//! bucket.add_file_string("proto/acme/weather.proto", "syntax = \"proto3\";").unwrap();
//! bucket.add_file_string("proto/acme/internal/debug.proto", "").unwrap();
//!
//! // Root the module at proto/, skipping the internal directory
//! let config = ModuleConfig::new(["proto"], ["proto/acme/internal"]).unwrap();
//! let module = ModuleBucketBuilder::new()
//!     .build_for_bucket(&bucket, &config, None)
//!     .unwrap();
//!
//! assert_eq!(module.source_file_infos().len(), 1);
//! assert_eq!(module.source_file_infos()[0].module_path.as_str(), "acme/weather.proto");
//! ```
//!
//! ## Core Concepts
//!
//! - **Paths (`path`)**: every path is normalized and validated before use.
//! - **Buckets (`storage`)**: a uniform tree abstraction over directories,
//!   in-memory maps, archives and git checkouts.
//! - **Configuration (`config`)**: `protomod.yaml`, `protomod.work.yaml` and
//!   `protomod.lock`.
//! - **Modules (`module`, `module_builder`)**: the sorted set of schema files
//!   under a module's roots.
//! - **Workspaces (`workspace`)**: member modules closed over their
//!   dependencies, served from siblings or the module cache (`cache`).
//! - **Inputs (`input`)**: opening what the user pointed at.
//!
//! ## Execution Flow
//!
//! 1.  **Open**: turn the input into a bucket and a sub-directory.
//! 2.  **Discover**: look upward for `protomod.work.yaml`.
//! 3.  **Build**: build each member module in parallel.
//! 4.  **Resolve**: order modules so dependencies come first.
//! 5.  **Validate**: reject duplicate module paths across the closure.

pub mod cache;
pub mod config;
pub mod defaults;
pub mod diagnostics;
pub mod error;
pub mod input;
pub mod module;
pub mod module_builder;
pub mod path;
pub mod storage;
pub mod workspace;

#[cfg(test)]
mod path_proptest;
