// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-handoff rating prompts.

pub mod prompter;

pub use prompter::RatingPrompter;
