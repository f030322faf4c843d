//! The interactive command loop.
//!
//! One line in, one command out. Everything that can go wrong inside a
//! command is reported and the prompt comes back; only `exit`, Ctrl+C and
//! end of input leave the loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::credentials::CredentialStore;
use crate::core::errors::ScriptError;
use crate::core::runner::{self, PathLookup, ScriptRunner, ToolLookup};
use crate::core::scripts::find_scripts;
use crate::core::supervisor::{NodeState, NodeSupervisor};
use crate::output::{self, Printer};
use crate::repl::ReadOutcome;

pub const PROMPT: &str = "crybro> ";
pub const RUN_USAGE: &str = "Usage: run <script_name>";
pub const ENV_ADD_USAGE: &str = "Usage: env add NAME=VALUE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Run(String),
    ShowEnv,
    EnvAdd { name: String, value: String },
    UnknownEnv(String),
    Help,
    Exit,
    /// Recognised command with missing or malformed arguments.
    Usage(&'static str),
    Unknown(String),
}

/// Split a line into a command word and the raw remainder.
///
/// Returns `None` for blank input.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let command = head.to_lowercase();

    let parsed = match command.as_str() {
        "exit" | "quit" | "q" => Command::Exit,
        "list" | "ls" => Command::List,
        "run" if rest.is_empty() => Command::Usage(RUN_USAGE),
        "run" => Command::Run(rest.to_string()),
        "env" => parse_env(rest),
        "help" => Command::Help,
        _ => Command::Unknown(command),
    };
    Some(parsed)
}

fn parse_env(rest: &str) -> Command {
    if rest.is_empty() {
        return Command::ShowEnv;
    }

    let (sub, assignment) = match rest.split_once(char::is_whitespace) {
        Some((sub, assignment)) => (sub, assignment.trim()),
        None => (rest, ""),
    };
    if sub != "add" {
        return Command::UnknownEnv(rest.to_string());
    }

    match assignment.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Command::EnvAdd {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        },
        _ => Command::Usage(ENV_ADD_USAGE),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Anything that can feed lines to the dispatcher.
pub trait LineSource {
    fn next_line(&mut self, prompt: &str) -> Result<ReadOutcome, String>;
}

pub struct Dispatcher<L = PathLookup> {
    supervisor: Arc<NodeSupervisor>,
    store: CredentialStore,
    runner: ScriptRunner<L>,
    printer: Printer,
    cwd: PathBuf,
}

impl Dispatcher<PathLookup> {
    pub fn new(supervisor: Arc<NodeSupervisor>, store: CredentialStore, cwd: PathBuf) -> Self {
        Self::with_runner(supervisor, store, cwd, ScriptRunner::new())
    }
}

impl<L: ToolLookup> Dispatcher<L> {
    pub fn with_runner(
        supervisor: Arc<NodeSupervisor>,
        store: CredentialStore,
        cwd: PathBuf,
        runner: ScriptRunner<L>,
    ) -> Self {
        Self {
            supervisor,
            store,
            runner,
            printer: Printer::new(),
            cwd,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Prompt, dispatch, repeat until the session ends.
    pub fn run<S: LineSource>(&mut self, source: &mut S) {
        loop {
            println!();
            match source.next_line(PROMPT) {
                Ok(ReadOutcome::Line(line)) => {
                    let Some(command) = parse(&line) else {
                        continue;
                    };
                    debug!(?command, "dispatching");
                    if self.dispatch(command) == Flow::Terminate {
                        break;
                    }
                }
                Ok(ReadOutcome::Interrupted) | Ok(ReadOutcome::Eof) => {
                    println!();
                    self.shutdown();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "input error");
                    self.printer.error(&format!("Input error: {}", e));
                    self.shutdown();
                    break;
                }
            }
        }
    }

    pub fn dispatch(&mut self, command: Command) -> Flow {
        match command {
            Command::List => {
                list_scripts(&self.printer, &self.cwd);
            }
            Command::Run(identifier) => {
                run_script(&self.printer, &self.runner, &self.store, &self.cwd, &identifier);
            }
            Command::ShowEnv => {
                output::show_store(&self.printer, &self.store);
                if self.supervisor.state() == NodeState::Stopped {
                    self.printer.warning("Anvil is stopped; these values may be stale.");
                }
            }
            Command::EnvAdd { name, value } => {
                self.printer.success(&format!("Set {} = {}", name, value));
                self.store.set(name, value);
            }
            Command::UnknownEnv(_) => self.printer.warning(
                "Unknown env command. Use 'env' to show or 'env add NAME=VALUE' to add.",
            ),
            Command::Help => output::show_help(&self.printer),
            Command::Exit => {
                self.shutdown();
                return Flow::Terminate;
            }
            Command::Usage(usage) => self.printer.warning(usage),
            Command::Unknown(command) => self.printer.warning(&format!(
                "Unknown command: {}. Type 'help' for available commands.",
                command
            )),
        }
        Flow::Continue
    }

    fn shutdown(&self) {
        if self.supervisor.stop() {
            self.printer.warning("Anvil stopped.");
        }
        self.printer.success("Goodbye!");
    }
}

pub fn list_scripts(printer: &Printer, cwd: &Path) {
    let scripts = find_scripts(cwd);
    output::show_scripts(printer, &scripts, cwd);
}

/// Resolve and run one script, reporting the result. Returns whether the
/// script ran and exited successfully.
pub fn run_script<L: ToolLookup>(
    printer: &Printer,
    runner: &ScriptRunner<L>,
    store: &CredentialStore,
    cwd: &Path,
    identifier: &str,
) -> bool {
    let scripts = find_scripts(cwd);
    let Some(script) = runner::resolve(identifier, &scripts, cwd) else {
        printer.error(&ScriptError::NotFound(identifier.to_string()).to_string());
        return false;
    };

    printer.info(&format!("Running: {}", script.file_name()));
    printer.separator();
    let result = runner.execute(&script, store);
    printer.separator();

    match result {
        Ok(outcome) => {
            if !outcome.status.success() {
                printer.warning(&format!("{} exited with {}", outcome.program, outcome.status));
            }
            printer.dim(&format!(
                "Script finished in {} (started {}).",
                outcome.elapsed_display(),
                outcome.started_at.format("%H:%M:%S")
            ));
            outcome.status.success()
        }
        Err(e) => {
            printer.error(&e.to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct Scripted(VecDeque<ReadOutcome>);

    impl Scripted {
        fn lines(lines: &[&str]) -> Self {
            Self(lines.iter().map(|l| ReadOutcome::Line(l.to_string())).collect())
        }
    }

    impl LineSource for Scripted {
        fn next_line(&mut self, _prompt: &str) -> Result<ReadOutcome, String> {
            Ok(self.0.pop_front().unwrap_or(ReadOutcome::Eof))
        }
    }

    fn dispatcher(cwd: &Path) -> Dispatcher {
        let supervisor = Arc::new(NodeSupervisor::new(Config::default()));
        Dispatcher::new(supervisor, CredentialStore::new(), cwd.to_path_buf())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
        assert_eq!(parse("LS"), Some(Command::List));
        assert_eq!(parse("list"), Some(Command::List));
        assert_eq!(parse("Q"), Some(Command::Exit));
        assert_eq!(parse("quit"), Some(Command::Exit));
        assert_eq!(parse("help"), Some(Command::Help));
        assert_eq!(parse("env"), Some(Command::ShowEnv));
        assert_eq!(parse("frob x"), Some(Command::Unknown("frob".to_string())));
    }

    #[test]
    fn test_parse_run_keeps_raw_remainder() {
        assert_eq!(parse("run"), Some(Command::Usage(RUN_USAGE)));
        assert_eq!(parse("RUN  my script.sh "), Some(Command::Run("my script.sh".to_string())));
    }

    #[test]
    fn test_parse_env_add() {
        assert_eq!(
            parse("env add FOO = a=b "),
            Some(Command::EnvAdd {
                name: "FOO".to_string(),
                value: "a=b".to_string()
            })
        );
        assert_eq!(parse("env add badtoken"), Some(Command::Usage(ENV_ADD_USAGE)));
        assert_eq!(parse("env add"), Some(Command::Usage(ENV_ADD_USAGE)));
        assert_eq!(parse("env add =x"), Some(Command::Usage(ENV_ADD_USAGE)));
        assert_eq!(parse("env show"), Some(Command::UnknownEnv("show".to_string())));
    }

    #[test]
    fn test_env_add_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let mut shell = dispatcher(dir.path());
        let mut source = Scripted::lines(&["env add FOO=bar", "", "env add FOO=baz", "env add badtoken", "env"]);

        shell.run(&mut source);

        assert_eq!(shell.store().get("FOO"), Some("baz"));
        assert_eq!(shell.store().len(), 1);
    }

    #[test]
    fn test_exit_ends_session() {
        let dir = TempDir::new().unwrap();
        let mut shell = dispatcher(dir.path());
        let mut source = Scripted::lines(&["nonsense", "run", "exit", "env add LATE=1"]);

        shell.run(&mut source);

        assert!(shell.store().get("LATE").is_none());
        assert_eq!(source.0.len(), 1);
    }

    #[test]
    fn test_interrupt_ends_session() {
        let dir = TempDir::new().unwrap();
        let mut shell = dispatcher(dir.path());
        let mut source = Scripted(VecDeque::from([
            ReadOutcome::Interrupted,
            ReadOutcome::Line("env add AFTER=1".to_string()),
        ]));

        shell.run(&mut source);

        assert!(shell.store().is_empty());
    }

    #[test]
    fn test_missing_script_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let mut shell = dispatcher(dir.path());

        assert_eq!(shell.dispatch(Command::Run("nope".to_string())), Flow::Continue);
        assert_eq!(shell.dispatch(Command::List), Flow::Continue);
        assert_eq!(shell.dispatch(Command::Exit), Flow::Terminate);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_script_by_index_sees_added_env() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        std::fs::write(
            dir.path().join("hello.sh"),
            format!("printf '%s' \"$GREETING\" > '{}'\n", out.display()),
        )
        .unwrap();

        let mut shell = dispatcher(dir.path());
        shell.dispatch(parse("env add GREETING=hi").unwrap());
        assert_eq!(shell.dispatch(parse("run 1").unwrap()), Flow::Continue);

        assert_eq!(std::fs::read_to_string(out).unwrap(), "hi");
    }
}
