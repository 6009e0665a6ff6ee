// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session persistence for Nexus
//!
//! Conversations are stored one file per session, sealed with the session
//! key and replaced atomically on every change.

pub mod envelope;
pub mod export;
pub mod model;
pub mod store;

pub use export::ExportFormat;
pub use model::{
    ListEntry, ListReport, MatchKind, Message, SearchHit, Session, SessionSummary, SkippedEntry,
};
pub use store::SessionStore;
