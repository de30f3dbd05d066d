// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Random ID generation for envelopes, sessions, and batches.

/// Generate a fresh unique identifier. Used for outbound envelope `id`s,
/// session IDs the caller does not already supply, and batch IDs.
pub fn new_id() -> String {
    nanoid::nanoid!(21)
}
