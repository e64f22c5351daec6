// ABOUTME: Shared helpers for the runbase CLI
// ABOUTME: Console formatting of activities, conflicts, and run reports
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

pub mod display;
