// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tollgate integration tests.
//!
//! Provides mock collaborators and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a backend or socket server.
//!
//! # Components
//!
//! - [`MockBackend`] - Shared server-side grants, redeem codes and catalog
//! - [`MockRemoteSource`] - Remote source with call capture, latency and failure injection
//! - [`PushHub`] / [`HubChannel`] - In-process real-time server and per-device connections
//! - [`TestHarness`] - Builds complete devices around a [`ManualClock`]

pub mod backend;
pub mod harness;
pub mod mock_remote;
pub mod push_hub;

pub use backend::{Grant, MockBackend};
pub use harness::{Device, StorageKind, TestHarness, TestHarnessBuilder, eventually};
pub use mock_remote::{CheckCall, MockRemoteSource};
pub use push_hub::{HubChannel, PushHub};
pub use tollgate_core::ManualClock;
