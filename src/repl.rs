use std::fs;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::core::config::crybro_dir;
use crate::core::dispatcher::LineSource;

/// What one prompt produced.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl+C at the prompt.
    Interrupted,
    /// Ctrl+D or closed stdin.
    Eof,
}

pub struct Repl {
    editor: DefaultEditor,
    history_file: PathBuf,
}

impl Repl {
    pub fn new() -> Result<Self, String> {
        let mut editor = DefaultEditor::new()
            .map_err(|e| format!("Failed to initialize line editor: {}", e))?;

        let dir = crybro_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| format!("Failed to create {} directory: {}", dir.display(), e))?;
        }

        let history_file = dir.join("repl_history.txt");
        if history_file.exists() {
            if let Err(e) = editor.load_history(&history_file) {
                debug!(error = %e, "could not load REPL history");
            }
        }

        Ok(Self { editor, history_file })
    }

    pub fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, ReadlineError> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                    // A signal exit skips the final save.
                    if let Err(e) = self.save_history() {
                        debug!(error = %e, "history not saved");
                    }
                }
                Ok(ReadOutcome::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(err),
        }
    }

    pub fn save_history(&mut self) -> Result<(), String> {
        self.editor
            .save_history(&self.history_file)
            .map_err(|e| format!("Failed to save REPL history: {}", e))
    }
}

impl LineSource for Repl {
    fn next_line(&mut self, prompt: &str) -> Result<ReadOutcome, String> {
        self.read_line(prompt).map_err(|e| e.to_string())
    }
}

/// Terminal settings from before the line editor switched to raw mode.
pub struct TerminalState {
    #[cfg(unix)]
    saved: Option<nix::sys::termios::Termios>,
}

impl TerminalState {
    pub fn capture() -> Self {
        #[cfg(unix)]
        {
            Self::capture_from(std::io::stdin())
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    #[cfg(unix)]
    fn capture_from<Fd: std::os::fd::AsFd>(fd: Fd) -> Self {
        Self {
            saved: nix::sys::termios::tcgetattr(fd).ok(),
        }
    }

    /// Put the captured settings back. The signal handler exits without
    /// unwinding, so the editor never restores them itself.
    pub fn restore(&self) {
        #[cfg(unix)]
        self.restore_to(std::io::stdin());
    }

    #[cfg(unix)]
    fn restore_to<Fd: std::os::fd::AsFd>(&self, fd: Fd) {
        use nix::sys::termios::{tcsetattr, SetArg};

        if let Some(saved) = &self.saved {
            if let Err(e) = tcsetattr(fd, SetArg::TCSANOW, saved) {
                debug!(error = %e, "could not restore terminal");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::pty::openpty;
    use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, LocalFlags, SetArg};

    #[test]
    fn test_restore_leaves_raw_mode() {
        let pty = openpty(None, None).unwrap();
        let state = TerminalState::capture_from(&pty.slave);
        assert!(tcgetattr(&pty.slave).unwrap().local_flags.contains(LocalFlags::ICANON));

        let mut raw = tcgetattr(&pty.slave).unwrap();
        cfmakeraw(&mut raw);
        tcsetattr(&pty.slave, SetArg::TCSANOW, &raw).unwrap();
        assert!(!tcgetattr(&pty.slave).unwrap().local_flags.contains(LocalFlags::ICANON));

        state.restore_to(&pty.slave);

        let restored = tcgetattr(&pty.slave).unwrap();
        assert!(restored.local_flags.contains(LocalFlags::ICANON));
        assert!(restored.local_flags.contains(LocalFlags::ECHO));
    }

    #[test]
    fn test_restore_without_terminal_is_a_noop() {
        let state = TerminalState { saved: None };
        state.restore();
    }
}
