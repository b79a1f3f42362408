//! Live two-channel audio separation.
//!
//! Captures a stereo input device, cuts the stream into normalized analysis
//! windows, separates them with FastICA and scores the separated components
//! against each other.
//!
//! | Module | Role |
//! |--------|------|
//! | [`audio`] | cpal capture, bounded frame queue, windowing |
//! | [`separation`] | `SeparationEngine` trait and FastICA |
//! | [`metrics`] | pairwise metric table |
//! | [`pipeline`] | orchestrator, sinks, session state |
//! | [`config`] | TOML settings and platform paths |

pub mod audio;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod separation;
