// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat exchanges
//!
//! Runs prompts against stored sessions and formats the results for the
//! terminal.

pub mod display;
pub mod engine;
pub mod input;

pub use engine::{ChatEngine, ExchangeEvent, ExchangeRequest, ExchangeStream};
pub use input::PromptSources;
