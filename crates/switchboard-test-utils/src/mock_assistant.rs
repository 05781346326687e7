// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock assistant for deterministic testing.
//!
//! `MockAssistant` implements `AssistantApi` with pre-configured answers and
//! captures every question for assertion in tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use switchboard_core::{AssistantApi, Result, SessionId};
use tokio::sync::Mutex;

/// A mock assistant that returns answers in order.
///
/// Once the queue is empty it echoes the question back, prefixed with
/// `assistant: `.
#[derive(Debug, Default)]
pub struct MockAssistant {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<(SessionId, String)>>,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answers(answers: Vec<String>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Every question asked so far, in order.
    pub async fn asked(&self) -> Vec<(SessionId, String)> {
        self.asked.lock().await.clone()
    }

    pub async fn ask_count(&self) -> usize {
        self.asked.lock().await.len()
    }
}

#[async_trait]
impl AssistantApi for MockAssistant {
    async fn ask(&self, session_id: SessionId, text: &str) -> Result<String> {
        self.asked.lock().await.push((session_id, text.to_string()));
        let answer = self.answers.lock().await.pop_front();
        Ok(answer.unwrap_or_else(|| format!("assistant: {text}")))
    }
}
