// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Nexus - one command line for many AI text-generation providers.
//!
//! This crate exposes the runtime used by the `nexus` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `llm`: provider abstraction, the four provider clients and the router
//! - `session`: encrypted, atomically written session files
//! - `crypto`: session key vaults and authenticated encryption
//! - `storage`: atomic writes, bounded reads and path validation
//! - `chat`: runs a prompt against a session and persists the exchange
//! - `app`: explicit process context wiring the above together

pub mod app;
pub mod chat;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod llm;
pub mod session;
pub mod storage;

pub use error::{NexusError, Result};
