// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for Nexus
//!
//! Provides abstraction over different LLM providers and the router that
//! picks one per request.

pub mod message;
pub mod mock_provider;
pub mod model_cache;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod router;

pub use message::*;
pub use provider::*;
pub use router::{Completion, ProviderRouter, RequestState, RouterEvent, RouterStream};
