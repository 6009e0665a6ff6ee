// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Filesystem primitives shared by the session store and the CLI
//!
//! - `atomic`: crash-safe writes and size-bounded reads
//! - `path`: name sanitization and user path validation

pub mod atomic;
pub mod path;

pub use atomic::{read_bounded, read_to_end_bounded, stage, write_atomic, StagedWrite};
pub use path::{
    is_sensitive_path, sanitize_session_name, session_path, validate_file_path,
    validate_output_path,
};
