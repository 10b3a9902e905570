//! Client library for a batch document conversion backend.
//!
//! Provides directory collection for uploads, a typed REST wrapper,
//! a cancellable fixed-rate status poller, a pure state reducer, and a
//! controller that ties a batch's lifecycle together from submission to
//! package download.

pub mod api;
pub mod artifact;
pub mod config;
pub mod controller;
pub mod events;
pub mod messages;
pub mod poller;
pub mod state;
pub mod upload;
