pub mod app;
pub mod config;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod manifest;
pub mod materialize;
pub mod mpm;
pub mod naming;
pub mod output;
pub mod resolver;
pub mod sidecar;
