// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time update channel for Tollgate.
//!
//! [`WsUpdateChannel`] keeps a WebSocket connection to the push server,
//! re-authenticating after every reconnect, and fans server pushes out to
//! subscribers as [`ChannelEvent`](tollgate_core::ChannelEvent)s.

pub mod channel;
pub mod frame;
pub mod offline;

pub use channel::{ReconnectPolicy, WsUpdateChannel};
pub use offline::OfflineChannel;
