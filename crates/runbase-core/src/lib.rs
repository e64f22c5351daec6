// ABOUTME: Core types and constants for the RunBase reconciliation engine
// ABOUTME: Foundation crate with error types, domain models, and physical constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # RunBase Core
//!
//! Foundation types shared by every crate in the workspace:
//!
//! - [`errors`]: `AppError`, `ErrorCode`, and the `AppResult` alias
//! - [`models`]: raw source records, canonical activities, conflicts, intervals
//! - [`constants`]: unit conversions, track geometry, race distances, plausibility limits

/// Unified error handling
pub mod errors;

/// Domain models
pub mod models;

/// Physical constants and validation limits
pub mod constants;
