//! Prompt trait abstraction for user confirmation.
//!
//! Implementations:
//! - `AssumeYes` - Approves everything (`--yes`)
//! - `ScriptedPrompt` - Replays canned answers, for testing
//! - `TerminalPrompt` (in vsync) - Reads stdin

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

/// Asks the user to approve a pending change.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Present `details`, ask `question`, and return true only on an explicit yes.
    async fn confirm(&self, details: &str, question: &str) -> bool;
}

/// Only a case-insensitive "y" is a yes; everything else, including empty
/// input, is a no.
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']).eq_ignore_ascii_case("y")
}

/// Approves every change without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

#[async_trait]
impl Prompt for AssumeYes {
    async fn confirm(&self, details: &str, question: &str) -> bool {
        info!("{} (auto-approved)\n{}", question, details);
        true
    }
}

/// Replays canned answers in order and records every question asked.
///
/// Once the answers run out every further question is declined.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn confirm(&self, _details: &str, question: &str) -> bool {
        self.asked.lock().unwrap().push(question.to_string());
        let answer = self.answers.lock().unwrap().pop_front();
        answer.is_some_and(|a| is_affirmative(&a))
    }
}
