// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted client-side state for switchboard actors.
//!
//! Holds what must survive a restart: the last selected session, the last
//! confirmed presence status, and the unread counter of each role namespace.
//! SQLite via `tokio-rusqlite`, schema managed by refinery migrations.

pub mod database;
pub mod memory;
pub mod migrations;
pub mod store;

pub use database::Database;
pub use memory::MemoryStateStore;
pub use store::SqliteStateStore;
