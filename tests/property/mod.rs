// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of the asset lifecycle: the transition tables hold for every
//! requested change, and persistence is fail-closed.

mod asset_lifecycle;
