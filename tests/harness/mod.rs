// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for access gate attack simulation.
//!
//! This module provides utilities for simulating abusive request patterns
//! against the gate to validate its controls under concurrency.

pub mod attacks;
pub mod generators;
pub mod metrics;
