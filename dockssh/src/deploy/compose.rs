//! Container stack manager commands
//!
//! Builds the `up`/`down`/`exec`/`logs` command lines run on the remote
//! host. Nothing here executes anything.

use crate::remote::shell_quote;

/// Command builder for the remote stack manager CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackManager {
    program: String,
}

impl StackManager {
    /// `program` may contain spaces (`docker compose`); it is used unquoted
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn base(&self, manifest: &str, project: Option<&str>) -> String {
        match project {
            Some(project) => format!(
                "{} -p {} -f {}",
                self.program,
                shell_quote(project),
                shell_quote(manifest)
            ),
            None => format!("{} -f {}", self.program, shell_quote(manifest)),
        }
    }

    /// Start (or converge) the stack in the background
    pub fn up(&self, manifest: &str, project: Option<&str>) -> String {
        format!("{} up -d", self.base(manifest, project))
    }

    /// Stop and remove the stack's containers
    pub fn down(&self, manifest: &str, project: Option<&str>) -> String {
        format!("{} down", self.base(manifest, project))
    }

    /// Run `command` inside a running service without a TTY
    pub fn exec(&self, manifest: &str, project: Option<&str>, service: &str, command: &str) -> String {
        format!("{} exec -T {} {}", self.base(manifest, project), service, command)
    }

    /// Follow the stack's logs
    pub fn logs_follow(&self, manifest: &str, project: Option<&str>) -> String {
        format!("{} logs -f", self.base(manifest, project))
    }

    /// Probe that the CLI is installed
    pub fn version(&self) -> String {
        format!("{} --version", self.program)
    }
}
