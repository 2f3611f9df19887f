#![doc = "hf-bucket-core: transfer pipeline library for hf-bucket."]

//! Moves files from the Hugging Face Hub into an S3-compatible bucket.
//!
//! Three roles share one set of job types and one set of contracts:
//! - [`producer`]: validates requests and enqueues transfer jobs;
//! - [`consumer`]: executes queued jobs with an attempt-counted retry policy;
//! - [`synchronise`]: sweeps a whole repository through a [`contract::Submitter`].
//!
//! [`queue`], [`storage`] and [`hub`] are the concrete SQLite, S3 and Hub API collaborators;
//! [`direct`] transfers immediately without a queue.
//!
//! # Usage
//! Depend on this crate from the CLI and from integration tests. Mocks for every contract trait
//! are exported under the default `test-export-mocks` feature.

pub mod config;
pub mod consumer;
pub mod contract;
pub mod direct;
pub mod hub;
pub mod job;
pub mod producer;
pub mod queue;
pub mod storage;
pub mod synchronise;
