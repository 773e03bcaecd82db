//! # grantryctl
//!
//! Requester-side command line for Grantry.
//!
//! - `grantryctl create exec-access-request` creates an exec access request
//!   and waits until the granted pod is usable.

#![forbid(unsafe_code)]

pub mod commands;

use clap::{Parser, Subcommand};

/// Grantry command line.
#[derive(Debug, Parser)]
#[command(name = "grantryctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level verbs.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create an access request.
    #[command(subcommand)]
    Create(CreateCommands),
}

/// Resources `create` knows about.
#[derive(Debug, Subcommand)]
pub enum CreateCommands {
    /// Request temporary exec access to one pod of a template's workload.
    ExecAccessRequest(commands::create_exec::CreateExecArgs),
}
