//! Shell command execution used by every detector.
//!
//! Failures never propagate: a missing binary, a nonzero exit or empty stdout
//! all come back as an empty line list, which detectors read as "nothing of
//! this kind on the system".

use std::process::Command;
use tracing::debug;

/// Runs a shell command and hands back its trimmed stdout lines.
pub(crate) trait CommandRunner {
    fn run(&self, command: &str) -> Vec<String>;

    /// Installed version of a Debian package, empty when not installed.
    fn package_version(&self, package: &str) -> String {
        let query = format!("dpkg-query -W -f='${{Status}}|${{Version}}' {package} 2>/dev/null");
        self.run(&query)
            .first()
            .and_then(|line| parse_status_version(line))
            .unwrap_or_default()
    }
}

/// `sh -c` backed runner.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Vec<String> {
        let output = match Command::new("sh").arg("-c").arg(command).output() {
            Ok(output) => output,
            Err(err) => {
                debug!(command, error = %err, "could not spawn shell");
                return Vec::new();
            }
        };

        if !output.status.success() {
            debug!(command, status = ?output.status.code(), "command exited nonzero");
            return Vec::new();
        }

        split_output(&String::from_utf8_lossy(&output.stdout))
    }
}

pub(crate) fn split_output(stdout: &str) -> Vec<String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.lines().map(|line| line.trim().to_string()).collect()
}

fn parse_status_version(line: &str) -> Option<String> {
    let (status, version) = line.split_once('|')?;
    if status.trim().ends_with(" installed") && !version.trim().is_empty() {
        Some(version.trim().to_string())
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::CommandRunner;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Canned responses keyed by exact command text.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        responses: HashMap<String, Vec<String>>,
        packages: HashMap<String, String>,
        pub(crate) calls: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on(mut self, command: &str, lines: &[&str]) -> Self {
            self.responses.insert(
                command.to_string(),
                lines.iter().map(|line| line.to_string()).collect(),
            );
            self
        }

        pub(crate) fn with_package(mut self, name: &str, version: &str) -> Self {
            self.packages.insert(name.to_string(), version.to_string());
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command: &str) -> Vec<String> {
            self.calls.borrow_mut().push(command.to_string());
            self.responses.get(command).cloned().unwrap_or_default()
        }

        fn package_version(&self, package: &str) -> String {
            self.packages.get(package).cloned().unwrap_or_default()
        }
    }
}
