//! Generation jobs backed by a Stable Diffusion web UI compatible HTTP API.
//!
//! [`generation_job`] wraps a [`GenerationRequest`] into a job for the `sd-generation-queue`
//! scheduler. Stopping such a job interrupts the backend.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod client;
mod error;
mod job;
mod request;

pub use client::{BackendClient, BackendConfig, GenerationBackend};
pub use error::Error;
pub use job::{generation_job, GenerationWork};
pub use request::{GeneratedImages, GenerationRequest};
