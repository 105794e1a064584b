//! Spoken announcements.

use std::process::{Command, Stdio};

/// Fire-and-forget speech output. Failures are logged, never returned.
pub trait Notifier: Send + Sync {
    fn speak(&self, text: &str);
}

/// Runs a text-to-speech program on a detached thread per announcement.
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    /// Parse a whitespace-separated command line. `None` if it is empty.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Notifier for CommandSpeaker {
    fn speak(&self, text: &str) {
        tracing::info!(text, "announcement");
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let program = self.program.clone();

        let spawned = std::thread::Builder::new()
            .name("cafewatch-speak".into())
            .spawn(move || match command.status() {
                Ok(status) if !status.success() => {
                    tracing::warn!(program = %program, %status, "speech command failed");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(program = %program, error = %e, "speech command could not run");
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to spawn speech thread");
        }
    }
}

/// Logs announcements instead of speaking them.
pub struct LogSpeaker;

impl Notifier for LogSpeaker {
    fn speak(&self, text: &str) {
        tracing::info!(text, "announcement (speech disabled)");
    }
}

/// Speaker for the configured command, or a log-only speaker when empty.
pub fn from_config(command: &str) -> Box<dyn Notifier> {
    match CommandSpeaker::from_command_line(command) {
        Some(speaker) => Box::new(speaker),
        None => Box::new(LogSpeaker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_line() {
        let speaker = CommandSpeaker::from_command_line("espeak -v en -s 150").unwrap();
        assert_eq!(speaker.program, "espeak");
        assert_eq!(speaker.args, vec!["-v", "en", "-s", "150"]);
    }

    #[test]
    fn test_empty_command_disables_speech() {
        assert!(CommandSpeaker::from_command_line("   ").is_none());
    }

    #[test]
    fn test_missing_program_does_not_panic() {
        let speaker = CommandSpeaker::from_command_line("/nonexistent/cafewatch-tts").unwrap();
        speaker.speak("Welcome");
        LogSpeaker.speak("Welcome back");
    }
}
