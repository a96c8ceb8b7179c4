//! Mock remote host for testing.
//!
//! Records every call in order and keeps a small in-memory filesystem so the
//! directory-based state the orchestrator relies on (routing fragments,
//! deployment directories) behaves like it would on a real host. Commands
//! that are not filesystem operations succeed with empty output unless a
//! failure rule matches them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::host::Host;
use crate::remote::{CommandOutput, FileTransfer, RemoteSession};

/// One interaction with the mock host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run(String),
    Put(String),
    Reconnect,
}

#[derive(Debug, Clone)]
struct FailureRule {
    prefix: String,
    remaining: Option<usize>,
    output: CommandOutput,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    rules: Vec<FailureRule>,
    outputs: Vec<(String, String)>,
}

/// A scriptable stand-in for a remote host
#[derive(Debug, Clone)]
pub struct MockSession {
    host: Host,
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every command starting with `prefix` fail with `status`
    pub fn fail_on(&self, prefix: &str, status: i32, stderr: &str) {
        self.push_rule(prefix, None, status, stderr);
    }

    /// Make the next `times` commands starting with `prefix` fail
    pub fn fail_times(&self, prefix: &str, times: usize, status: i32, stderr: &str) {
        self.push_rule(prefix, Some(times), status, stderr);
    }

    fn push_rule(&self, prefix: &str, remaining: Option<usize>, status: i32, stderr: &str) {
        self.state().rules.push(FailureRule {
            prefix: prefix.to_string(),
            remaining,
            output: CommandOutput {
                status,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        });
    }

    /// Answer commands starting with `prefix` with `stdout`
    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.state()
            .outputs
            .push((prefix.to_string(), stdout.to_string()));
    }

    /// Pre-create a file on the mock host
    pub fn seed_file(&self, path: &str, content: &[u8]) {
        self.state().files.insert(path.to_string(), content.to_vec());
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Only the commands that were run, in order
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Run(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching `predicate`
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.state().calls.iter().position(predicate)
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    pub fn file_string(&self, path: &str) -> Option<String> {
        self.file(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
    }

    /// Paths of every file on the mock host
    pub fn files(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }
}

impl MockState {
    fn match_rule(&mut self, command: &str) -> Option<CommandOutput> {
        for rule in self.rules.iter_mut() {
            if !command.starts_with(&rule.prefix) {
                continue;
            }
            match rule.remaining {
                None => return Some(rule.output.clone()),
                Some(0) => continue,
                Some(ref mut n) => {
                    *n -= 1;
                    return Some(rule.output.clone());
                }
            }
        }
        None
    }

    fn dir_exists(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.dirs.contains(dir.trim_end_matches('/'))
            || self.files.keys().any(|path| path.starts_with(&prefix))
    }

    fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut names = BTreeSet::new();
        for path in self.files.keys().chain(self.dirs.iter()) {
            if let Some(rest) = path.strip_prefix(&prefix) {
                if let Some(name) = rest.split('/').next() {
                    if !name.is_empty() {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        names.into_iter().collect()
    }

    fn remove_tree(&mut self, dir: &str) {
        let dir = dir.trim_end_matches('/').to_string();
        let prefix = format!("{}/", dir);
        self.files
            .retain(|path, _| path != &dir && !path.starts_with(&prefix));
        self.dirs.retain(|path| path != &dir && !path.starts_with(&prefix));
    }

    /// Emulate the handful of filesystem commands the orchestrator issues
    fn emulate(&mut self, command: &str) -> CommandOutput {
        let ok = |stdout: String| CommandOutput {
            status: 0,
            stdout,
            stderr: String::new(),
        };
        let missing = |path: &str| CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: format!("{}: No such file or directory", path),
        };

        let words = split_words(command);
        let args: Vec<&str> = words.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["mkdir", "-p", paths @ ..] => {
                for path in paths {
                    let path = path.trim_end_matches('/');
                    let mut current = String::new();
                    for part in path.split('/') {
                        if !current.is_empty() {
                            current.push('/');
                        }
                        current.push_str(part);
                        self.dirs.insert(current.clone());
                    }
                }
                ok(String::new())
            }
            ["test", "-d", path] => {
                if self.dir_exists(path) {
                    ok(String::new())
                } else {
                    missing(*path)
                }
            }
            ["test", "-f", path] => {
                if self.files.contains_key(*path) {
                    ok(String::new())
                } else {
                    missing(*path)
                }
            }
            ["ls", "-1A", path] => {
                if self.dir_exists(path) {
                    let mut listing = self.list_dir(path).join("\n");
                    if !listing.is_empty() {
                        listing.push('\n');
                    }
                    ok(listing)
                } else {
                    missing(*path)
                }
            }
            ["rm", "-f", path] => {
                self.files.remove(*path);
                ok(String::new())
            }
            ["rm", "-rf", path] => {
                self.remove_tree(path);
                ok(String::new())
            }
            _ => {
                let stdout = self
                    .outputs
                    .iter()
                    .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                    .map(|(_, stdout)| stdout.clone())
                    .unwrap_or_default();
                ok(stdout)
            }
        }
    }
}

/// Split a command into words, honouring single quotes and backslashes
fn split_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for quoted in chars.by_ref() {
                    if quoted == '\'' {
                        break;
                    }
                    current.push(quoted);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[async_trait]
impl RemoteSession for MockSession {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn run(&self, command: &str, must_succeed: bool) -> Result<CommandOutput, DeployError> {
        let output = {
            let mut state = self.state();
            state.calls.push(Call::Run(command.to_string()));
            match state.match_rule(command) {
                Some(output) => output,
                None => state.emulate(command),
            }
        };

        if must_succeed && !output.success() {
            return Err(output.into_error(command));
        }
        Ok(output)
    }

    async fn reconnect(&mut self) -> Result<(), DeployError> {
        self.state().calls.push(Call::Reconnect);
        Ok(())
    }
}

#[async_trait]
impl FileTransfer for MockSession {
    async fn put(&self, content: &[u8], remote_path: &str) -> Result<(), DeployError> {
        let mut state = self.state();
        state.calls.push(Call::Put(remote_path.to_string()));

        let parent = remote_path.rsplit_once('/').map(|(dir, _)| dir);
        if let Some(parent) = parent {
            if !state.dir_exists(parent) {
                return Err(DeployError::Transfer {
                    path: remote_path.to_string(),
                    reason: format!("{}: No such file or directory", parent),
                });
            }
        }
        state.files.insert(remote_path.to_string(), content.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock() -> MockSession {
        MockSession::new(Host::new("local", "localhost", None))
    }

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words(r"rm -f 'dir with space/it'\''s'"),
            vec!["rm", "-f", "dir with space/it's"]
        );
        assert_eq!(split_words("  ls   -1A  d "), vec!["ls", "-1A", "d"]);
    }

    #[tokio::test]
    async fn test_put_requires_parent_dir() {
        let session = mock();
        assert!(session.put(b"x", "root/file").await.is_err());

        session.run("mkdir -p 'root'", true).await.unwrap();
        session.put(b"x", "root/file").await.unwrap();
        assert_eq!(session.file("root/file"), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_listing_and_removal() {
        let session = mock();
        session.seed_file("root/caddy.d/a", b"");
        session.seed_file("root/caddy.d/b", b"");

        let listing = session.run("ls -1A 'root/caddy.d'", true).await.unwrap();
        assert_eq!(listing.stdout, "a\nb\n");

        session.run("rm -f 'root/caddy.d/a'", true).await.unwrap();
        assert!(!session.probe("test -f 'root/caddy.d/a'").await);
        assert!(session.probe("test -f 'root/caddy.d/b'").await);
    }

    #[tokio::test]
    async fn test_failure_rules() {
        let session = mock();
        session.fail_times("docker ps", 1, 127, "not found");

        let err = session.run("docker ps", true).await.unwrap_err();
        assert!(matches!(err, DeployError::Command { status: 127, .. }));
        assert!(session.run("docker ps", true).await.is_ok());

        session.fail_on("false", 1, "");
        let output = session.run("false", false).await.unwrap();
        assert_eq!(output.status, 1);
        assert_eq!(session.commands().len(), 3);
    }
}
