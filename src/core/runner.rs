//! Resolving and running user scripts.
//!
//! Each extension maps to an ordered list of candidate invocations. The first
//! one whose tool is installed gets to run the script.

use std::borrow::Cow;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::core::credentials::{CredentialStore, ETH_RPC_URL, PRIVATE_KEY};
use crate::core::errors::ScriptError;
use crate::core::scripts::ScriptEntry;
use crate::core::supervisor::rpc_url;
use crate::core::config::DEFAULT_PORT;

/// Pick a script by 1-based index, by name, or by path.
///
/// Strategies are tried in order: a numeric index into `candidates`, then the
/// path relative to `cwd`, the file name or the stem, and finally `identifier`
/// as a literal path on disk.
pub fn resolve(identifier: &str, candidates: &[ScriptEntry], cwd: &Path) -> Option<ScriptEntry> {
    if !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(index) = identifier.parse::<usize>() {
            if (1..=candidates.len()).contains(&index) {
                return Some(candidates[index - 1].clone());
            }
        }
    }

    let by_name = candidates.iter().find(|script| {
        let relative = script.relative_to(cwd);
        relative.to_string_lossy() == identifier
            || relative == Path::new(identifier)
            || script.file_name() == identifier
            || script.stem().as_deref() == Some(identifier)
    });
    if let Some(script) = by_name {
        return Some(script.clone());
    }

    let expanded = shellexpand::full(identifier).unwrap_or(Cow::Borrowed(identifier));
    let direct = PathBuf::from(expanded.as_ref());
    let direct = if direct.is_relative() { cwd.join(direct) } else { direct };
    ScriptEntry::from_path(&direct)
}

/// One way of launching a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    fn new(program: &str, args: impl IntoIterator<Item = OsString>) -> Self {
        Self {
            program: program.to_string(),
            args: args.into_iter().collect(),
        }
    }

    #[cfg(test)]
    fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Answers whether a tool can be launched.
pub trait ToolLookup {
    fn is_available(&self, program: &str) -> bool;
}

/// Looks tools up on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLookup;

impl ToolLookup for PathLookup {
    fn is_available(&self, program: &str) -> bool {
        // Explicit paths are left for spawn to judge.
        if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
            return true;
        }
        which::which(program).is_ok()
    }
}

/// Candidate invocations for `entry`, most preferred first.
pub fn plan(entry: &ScriptEntry, store: &CredentialStore) -> Vec<Invocation> {
    let file: OsString = entry.path.clone().into_os_string();
    let with_file = |program: &str, leading: &[&str]| {
        let mut args: Vec<OsString> = leading.iter().map(OsString::from).collect();
        args.push(file.clone());
        Invocation::new(program, args)
    };

    match entry.extension.as_str() {
        "py" => vec![with_file("python3", &[]), with_file("python", &[])],
        "js" => vec![with_file("node", &[])],
        "ts" => vec![
            with_file("ts-node", &[]),
            with_file("tsx", &[]),
            with_file("npx", &["ts-node"]),
        ],
        "sh" => vec![with_file("bash", &[]), with_file("sh", &[])],
        "sol" => {
            let rpc = store
                .get(ETH_RPC_URL)
                .map(str::to_string)
                .unwrap_or_else(|| rpc_url(DEFAULT_PORT));
            let key = store.get(PRIVATE_KEY).unwrap_or_default();
            let args = [
                OsString::from("script"),
                file.clone(),
                OsString::from("--rpc-url"),
                OsString::from(rpc),
                OsString::from("--private-key"),
                OsString::from(key),
                OsString::from("--broadcast"),
            ];
            vec![Invocation::new("forge", args)]
        }
        _ => vec![Invocation::new(&entry.path.to_string_lossy(), Vec::new())],
    }
}

/// How a finished script went.
#[derive(Debug)]
pub struct RunOutcome {
    pub program: String,
    pub status: ExitStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed: TimeDelta,
}

impl RunOutcome {
    pub fn elapsed_display(&self) -> String {
        format!("{:.2}s", self.elapsed.num_milliseconds() as f64 / 1000.0)
    }
}

pub struct ScriptRunner<L = PathLookup> {
    lookup: L,
}

impl ScriptRunner<PathLookup> {
    pub fn new() -> Self {
        Self { lookup: PathLookup }
    }
}

impl<L: ToolLookup> ScriptRunner<L> {
    pub fn with_lookup(lookup: L) -> Self {
        Self { lookup }
    }

    /// The planned invocations whose tool is available.
    pub fn candidates(&self, entry: &ScriptEntry, store: &CredentialStore) -> Vec<Invocation> {
        plan(entry, store)
            .into_iter()
            .filter(|invocation| {
                let available = self.lookup.is_available(&invocation.program);
                if !available {
                    debug!(program = %invocation.program, "runner not installed");
                }
                available
            })
            .collect()
    }

    /// Run `entry` to completion with the store exported to its environment.
    ///
    /// A non-zero exit is still `Ok`; errors mean nothing could be launched.
    pub fn execute(&self, entry: &ScriptEntry, store: &CredentialStore) -> Result<RunOutcome, ScriptError> {
        let tried: Vec<String> = plan(entry, store).into_iter().map(|i| i.program).collect();

        for invocation in self.candidates(entry, store) {
            let started_at = Utc::now();
            let status = Command::new(&invocation.program)
                .args(&invocation.args)
                .envs(store.iter())
                .status();

            match status {
                Ok(status) => {
                    let elapsed = Utc::now() - started_at;
                    info!(
                        script = %entry.path.display(),
                        program = %invocation.program,
                        %status,
                        "script finished"
                    );
                    return Ok(RunOutcome {
                        program: invocation.program,
                        status,
                        started_at,
                        elapsed,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(program = %invocation.program, "runner vanished, trying next");
                    continue;
                }
                Err(e) => return Err(ScriptError::Io(e)),
            }
        }

        Err(ScriptError::NoRunner {
            path: entry.path.clone(),
            tried: tried.join(", "),
        })
    }
}

impl Default for ScriptRunner<PathLookup> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::Credentials;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    struct FakeLookup(HashSet<&'static str>);

    impl FakeLookup {
        fn only(tools: &[&'static str]) -> Self {
            Self(tools.iter().copied().collect())
        }
    }

    impl ToolLookup for FakeLookup {
        fn is_available(&self, program: &str) -> bool {
            self.0.contains(program)
        }
    }

    fn entry(path: &str) -> ScriptEntry {
        let path = PathBuf::from(path);
        ScriptEntry {
            extension: path.extension().unwrap().to_string_lossy().into_owned(),
            path,
            size_bytes: 0,
        }
    }

    fn fixture(root: &Path, names: &[&str]) -> Vec<ScriptEntry> {
        names
            .iter()
            .map(|name| {
                let path = root.join(name);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, "").unwrap();
                ScriptEntry::from_path(&path).unwrap()
            })
            .collect()
    }

    fn programs(invocations: &[Invocation]) -> Vec<String> {
        invocations.iter().map(|i| i.program.clone()).collect()
    }

    #[test]
    fn test_resolve_by_index() {
        let dir = TempDir::new().unwrap();
        let scripts = fixture(dir.path(), &["a.py", "b.js", "c.sol"]);

        assert_eq!(resolve("2", &scripts, dir.path()), Some(scripts[1].clone()));
        assert_eq!(resolve("1", &scripts, dir.path()), Some(scripts[0].clone()));
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        let dir = TempDir::new().unwrap();
        let scripts = fixture(dir.path(), &["a.py", "b.js", "c.sol"]);

        assert_eq!(resolve("99", &scripts, dir.path()), None);
        assert_eq!(resolve("0", &scripts, dir.path()), None);
    }

    #[test]
    fn test_resolve_by_stem_name_and_relative_path() {
        let dir = TempDir::new().unwrap();
        let scripts = fixture(dir.path(), &["a.py", "sub/b.js"]);

        assert_eq!(resolve("b", &scripts, dir.path()), Some(scripts[1].clone()));
        assert_eq!(resolve("b.js", &scripts, dir.path()), Some(scripts[1].clone()));
        assert_eq!(resolve("sub/b.js", &scripts, dir.path()), Some(scripts[1].clone()));
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let dir = TempDir::new().unwrap();
        let scripts = fixture(dir.path(), &["deploy.sh", "deploy.sol"]);

        assert_eq!(resolve("deploy", &scripts, dir.path()), Some(scripts[0].clone()));
    }

    #[test]
    fn test_resolve_literal_path() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let extra = fixture(outside.path(), &["tool.rb"]);
        let scripts = fixture(dir.path(), &["a.py"]);

        let path = extra[0].path.to_string_lossy().into_owned();
        let resolved = resolve(&path, &scripts, dir.path()).unwrap();
        assert_eq!(resolved.path, extra[0].path);
        assert_eq!(resolved.extension, "rb");
    }

    #[test]
    fn test_resolve_not_found() {
        let dir = TempDir::new().unwrap();
        let scripts = fixture(dir.path(), &["a.py"]);

        assert_eq!(resolve("missing", &scripts, dir.path()), None);
        assert_eq!(resolve("1", &[], dir.path()), None);
    }

    #[test]
    fn test_plan_forge_uses_store() {
        let mut store = CredentialStore::new();
        store.publish(&Credentials {
            private_key: "0xkey".to_string(),
            address: "0xaddr".to_string(),
            rpc_url: "http://127.0.0.1:9545".to_string(),
        });

        let invocations = plan(&entry("script/Deploy.s.sol"), &store);
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].describe(),
            "forge script script/Deploy.s.sol --rpc-url http://127.0.0.1:9545 --private-key 0xkey --broadcast"
        );
    }

    #[test]
    fn test_plan_forge_defaults_without_node() {
        let invocations = plan(&entry("Deploy.sol"), &CredentialStore::new());
        assert_eq!(
            invocations[0].describe(),
            "forge script Deploy.sol --rpc-url http://127.0.0.1:8545 --private-key  --broadcast"
        );
    }

    #[test]
    fn test_plan_per_extension() {
        let store = CredentialStore::new();
        assert_eq!(programs(&plan(&entry("a.py"), &store)), vec!["python3", "python"]);
        assert_eq!(programs(&plan(&entry("a.js"), &store)), vec!["node"]);
        assert_eq!(programs(&plan(&entry("a.sh"), &store)), vec!["bash", "sh"]);
        assert_eq!(programs(&plan(&entry("bin/a.rb"), &store)), vec!["bin/a.rb"]);
    }

    #[test]
    fn test_typescript_fallback_chain() {
        let store = CredentialStore::new();
        let ts = entry("a.ts");

        let runner = ScriptRunner::with_lookup(FakeLookup::only(&["tsx", "npx"]));
        let candidates = runner.candidates(&ts, &store);
        assert_eq!(programs(&candidates), vec!["tsx", "npx"]);

        let runner = ScriptRunner::with_lookup(FakeLookup::only(&["npx"]));
        let candidates = runner.candidates(&ts, &store);
        assert_eq!(candidates[0].describe(), "npx ts-node a.ts");
    }

    #[test]
    fn test_no_runner_available() {
        let runner = ScriptRunner::with_lookup(FakeLookup::only(&[]));
        let err = runner.execute(&entry("a.ts"), &CredentialStore::new()).unwrap_err();

        match err {
            ScriptError::NoRunner { tried, .. } => assert_eq!(tried, "ts-node, tsx, npx"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_exports_store_and_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("seen.txt");
        let script = dir.path().join("probe.sh");
        fs::write(
            &script,
            format!("printf '%s %s' \"$PRIVATE_KEY\" \"$EXTRA\" > '{}'\nexit 3\n", out.display()),
        )
        .unwrap();

        let mut store = CredentialStore::new();
        store.set(PRIVATE_KEY, "0xfeed");
        store.set("EXTRA", "yes");

        let runner = ScriptRunner::with_lookup(FakeLookup::only(&["sh"]));
        let outcome = runner
            .execute(&ScriptEntry::from_path(&script).unwrap(), &store)
            .unwrap();

        assert_eq!(outcome.program, "sh");
        assert_eq!(outcome.status.code(), Some(3));
        assert_eq!(fs::read_to_string(out).unwrap(), "0xfeed yes");
    }
}
