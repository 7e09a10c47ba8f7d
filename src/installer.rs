//! Installer execution
//!
//! The composite command from an [`ActionPlan`] runs as one detached shell
//! invocation on the tokio runtime; its exit code and output come back over a
//! oneshot channel. Installs need network access, so a connectivity check
//! gates the whole command before anything runs.

use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::plan::ActionPlan;

/// Exit code installer scripts use for "nothing to report".
const IGNORED_EXIT_CODE: i32 = 255;

/// Installer errors surfaced to the caller
#[derive(Error, Debug)]
pub enum InstallError {
    #[error(
        "No internet connection.\nYou need an internet connection to install the additional software.\nPlease, connect to the internet and try again."
    )]
    NoInternetConnection,

    #[error("Failed to start installer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Installer task ended without reporting a result")]
    Cancelled,
}

/// Classified installer exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// Exit code 0 or 1
    Succeeded,
    /// Exit code 255
    Ignored,
    /// Any other exit code, or killed by a signal
    Failed,
}

impl InstallStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(IGNORED_EXIT_CODE) => InstallStatus::Ignored,
            Some(0 | 1) => InstallStatus::Succeeded,
            _ => InstallStatus::Failed,
        }
    }
}

/// What the installer reported back
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub command: String,
    pub exit_code: Option<i32>,
    pub output: String,
    pub status: InstallStatus,
}

/// Network reachability check run before installs.
pub(crate) trait Connectivity {
    async fn is_online(&self) -> bool;
}

/// Online when an HTTP request to the configured URL gets any response.
pub(crate) struct HttpConnectivity {
    client: reqwest::Client,
    url: String,
}

impl HttpConnectivity {
    pub(crate) fn new(config: &NetworkConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;
        Ok(Self {
            client,
            url: config.check_url.clone(),
        })
    }
}

impl Connectivity for HttpConnectivity {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "connectivity check");
                true
            }
            Err(err) => {
                debug!(url = %self.url, error = %err, "connectivity check failed");
                false
            }
        }
    }
}

/// Start `command` in the background and return the channel its report
/// arrives on.
pub fn spawn_installer(command: String) -> oneshot::Receiver<Result<InstallReport, InstallError>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = run_installer(command).await;
        let _ = tx.send(result);
    });
    rx
}

async fn run_installer(command: String) -> Result<InstallReport, InstallError> {
    info!(%command, "running installer");
    let output = Command::new("sh").arg("-c").arg(&command).output().await?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    let exit_code = output.status.code();
    let status = InstallStatus::from_exit_code(exit_code);
    match status {
        InstallStatus::Failed => warn!(?exit_code, "installer failed"),
        _ => info!(?exit_code, ?status, "installer finished"),
    }

    Ok(InstallReport {
        command,
        exit_code,
        output: text.trim().to_string(),
        status,
    })
}

/// Run the plan's composite command. `Ok(None)` when there is nothing to do.
///
/// When the plan installs anything and the machine is offline, nothing runs.
pub(crate) async fn execute(
    plan: &ActionPlan,
    connectivity: &impl Connectivity,
) -> Result<Option<InstallReport>, InstallError> {
    let Some(command) = plan.composite_command() else {
        return Ok(None);
    };

    if plan.has_installs() && !connectivity.is_online().await {
        warn!(%command, "no internet connection, install aborted");
        return Err(InstallError::NoInternetConnection);
    }

    let report = spawn_installer(command)
        .await
        .map_err(|_| InstallError::Cancelled)??;
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ActionPlanItem, Operation};

    struct FixedConnectivity(bool);

    impl Connectivity for FixedConnectivity {
        async fn is_online(&self) -> bool {
            self.0
        }
    }

    fn single(manufacturer_id: &str, operation: Operation) -> ActionPlan {
        ActionPlan {
            items: vec![ActionPlanItem {
                driver_id: String::new(),
                manufacturer_id: manufacturer_id.to_string(),
                operation,
            }],
        }
    }

    #[test]
    fn exit_code_classification() {
        assert_eq!(InstallStatus::from_exit_code(Some(0)), InstallStatus::Succeeded);
        assert_eq!(InstallStatus::from_exit_code(Some(1)), InstallStatus::Succeeded);
        assert_eq!(InstallStatus::from_exit_code(Some(255)), InstallStatus::Ignored);
        assert_eq!(InstallStatus::from_exit_code(Some(2)), InstallStatus::Failed);
        assert_eq!(InstallStatus::from_exit_code(Some(100)), InstallStatus::Failed);
        assert_eq!(InstallStatus::from_exit_code(None), InstallStatus::Failed);
    }

    #[tokio::test]
    async fn spawned_installer_reports_output_and_code() {
        let report = spawn_installer("echo installing; exit 255".to_string())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.exit_code, Some(255));
        assert_eq!(report.status, InstallStatus::Ignored);
        assert_eq!(report.output, "installing");
    }

    #[tokio::test]
    async fn offline_install_aborts_before_running() {
        let plan = single("14e4", Operation::Install);
        let result = execute(&plan, &FixedConnectivity(false)).await;

        assert!(matches!(result, Err(InstallError::NoInternetConnection)));
    }

    #[tokio::test]
    async fn noop_plan_runs_nothing() {
        let plan = single("14e4", Operation::NoChange);
        let result = execute(&plan, &FixedConnectivity(false)).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn purge_does_not_need_connectivity() {
        // install-broadcom is not on PATH in the test environment, so the
        // shell reports 127.
        let plan = single("14e4", Operation::Purge);
        let report = execute(&plan, &FixedConnectivity(false))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.command, "install-broadcom purge");
        assert_eq!(report.exit_code, Some(127));
        assert_eq!(report.status, InstallStatus::Failed);
    }
}
