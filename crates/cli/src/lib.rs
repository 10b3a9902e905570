//! Command-line front end for the batch conversion client.

pub mod cli;
pub mod commands;
pub mod render;
