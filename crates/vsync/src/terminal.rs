//! Interactive confirmation on the controlling terminal.

use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::debug;
use vsync_core::prompt::{is_affirmative, Prompt};

/// Prints the change listing to stdout and reads the answer from stdin.
///
/// One buffered reader is kept for the whole run so piped answers are not
/// lost between questions.
pub struct TerminalPrompt {
    stdin: Mutex<BufReader<Stdin>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

fn show(details: &str, question: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}\n", details)?;
    write!(stdout, "{} [y/N] ", question)?;
    stdout.flush()
}

#[async_trait]
impl Prompt for TerminalPrompt {
    async fn confirm(&self, details: &str, question: &str) -> bool {
        if let Err(e) = show(details, question) {
            debug!("Failed to write prompt: {}", e);
            return false;
        }

        let mut answer = String::new();
        match self.stdin.lock().await.read_line(&mut answer).await {
            // EOF
            Ok(0) => {
                println!();
                false
            }
            Ok(_) => is_affirmative(&answer),
            Err(e) => {
                debug!("Failed to read answer: {}", e);
                false
            }
        }
    }
}
