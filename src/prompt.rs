//! Yes/no confirmation
//!
//! The push flow and `withdraw` ask the user before acting. Callers take a
//! `&dyn Confirm` so tests can script the answers.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;

/// Asks a yes/no question
pub trait Confirm {
    fn confirm(&self, question: &str) -> io::Result<bool>;
}

/// Prompt on stderr, answer on stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{} [y/N]: ", question)?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(parse_answer(&line))
    }
}

/// `y` or `yes` (any case) is yes; everything else is no
pub fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Whether stdin and stderr are both attached to a terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stderr().is_terminal()
}

/// Pre-recorded answers, for tests
///
/// Answers are consumed in order; once they run out every question is
/// answered no.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .map(|asked| asked.clone())
            .unwrap_or_default()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        let answer = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(false);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer("  YES "));
        assert!(!parse_answer("\n"));
        assert!(!parse_answer("no"));
        assert!(!parse_answer("yep"));
    }

    #[test]
    fn test_scripted_confirm() {
        let confirm = ScriptedConfirm::new([true, false]);

        assert!(confirm.confirm("first?").unwrap());
        assert!(!confirm.confirm("second?").unwrap());
        assert!(!confirm.confirm("third?").unwrap());
        assert_eq!(confirm.asked(), vec!["first?", "second?", "third?"]);
    }
}
