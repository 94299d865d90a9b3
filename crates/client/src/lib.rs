//! Client side of the static file cache queue.
//!
//! This crate provides the HTTP probe used to revalidate cached URLs and the
//! runner that drains the queue, shared by the worker binary and embedders.

pub mod probe;
pub mod runner;

pub use probe::{HttpProbe, MARKER_COOKIE, PROBE_FAILED_STATUS, Probe, ProbeConfig, ProbeError, ProbeResult};

pub use runner::{QueueRunner, RunContext, RunStrategy};
