//! Operator confirmation

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use crate::Result;

/// Asks the operator a yes/no question
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Print `question` and return true only for an explicit yes
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Reads the answer from stdin
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> Result<bool> {
        println!("{}", question);
        print!("Are you sure? [y/N] ");
        tokio::io::stdout().flush().await?;

        let mut input = String::new();
        let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
        reader.read_line(&mut input).await?;
        Ok(is_yes(&input))
    }
}

/// Only `y`/`yes` (any case) confirm; anything else, including EOF, declines
pub fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// Answers every question the same way (`--yes` / `--force`)
#[derive(Clone, Copy, Debug)]
pub struct Preapproved;

#[async_trait]
impl Confirm for Preapproved {
    async fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}
