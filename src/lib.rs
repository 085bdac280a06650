//! webmedia - serve a local directory tree over HTTP
//!
//! Files are served as-is or through a derivation pipeline that produces
//! thumbnails, upright images, browser-friendly audio and video, and tag
//! JSON with ffmpeg. Derived artifacts are cached on disk and produced at
//! most once at a time per source and kind.

pub mod cache;
pub mod cli;
pub mod config;
pub mod derivation;
pub mod error;
pub mod gateway;
pub mod media;
pub mod orchestrator;
pub mod policy;
pub mod probe;
pub mod server;
pub mod tools;

pub use error::{WebMediaError, WebMediaResult};
