//! Trigger that runs an external extraction command over a staging directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::delta::RunDelta;

use super::{ExtractionTrigger, TriggerError};

const STAGING_PLACEHOLDER: &str = "{staging_dir}";

/// Stages the delta's files into `<staging_root>/run-<run_id>` and runs the
/// configured command on it.
///
/// Files are symlinked, or copied where links are unavailable. The staging
/// directory is removed once the command finishes.
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    command: Vec<String>,
    staging_root: PathBuf,
}

impl CommandTrigger {
    pub fn new(command: Vec<String>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            command,
            staging_root: staging_root.into(),
        }
    }

    pub fn from_config(config: &ExtractionConfig, output_dir: &Path) -> Self {
        Self::new(config.command.clone(), output_dir.join("staging"))
    }

    /// Whether a command is configured at all.
    pub fn has_command(&self) -> bool {
        !self.command.is_empty()
    }

    async fn stage(&self, staging: &Path, delta: &RunDelta) -> Result<usize, TriggerError> {
        let staging_err = |source: std::io::Error| TriggerError::Staging {
            path: staging.to_path_buf(),
            source,
        };
        fs::create_dir_all(staging).await.map_err(staging_err)?;

        let mut staged = 0;
        for item in delta.items() {
            let source = match fs::canonicalize(&item.local_path).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(
                        remote_id = %item.remote_id,
                        path = %item.local_path.display(),
                        error = %e,
                        "Delta file is gone, not staging it"
                    );
                    continue;
                }
            };
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = staging.join(file_name);
            link_or_copy(&source, &target).await.map_err(staging_err)?;
            staged += 1;
        }
        Ok(staged)
    }

    async fn run_command(&self, staging: &Path) -> Result<(), TriggerError> {
        let staging_str = staging.to_string_lossy();
        let args: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace(STAGING_PLACEHOLDER, &staging_str))
            .collect();
        let Some((program, rest)) = args.split_first() else {
            return Ok(());
        };

        debug!(program = %program, args = ?rest, "Running extraction command");
        let output = Command::new(program)
            .args(rest)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TriggerError::CommandNotFound(program.clone())
                } else {
                    TriggerError::Spawn(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TriggerError::CommandFailed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(500).collect(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExtractionTrigger for CommandTrigger {
    async fn trigger(&self, run_id: &str, delta: &RunDelta) -> Result<(), TriggerError> {
        if !self.has_command() {
            debug!("No extraction command configured");
            return Ok(());
        }
        if delta.is_empty() {
            info!("No new documents this run, skipping extraction");
            return Ok(());
        }

        let staging = self.staging_root.join(format!("run-{}", run_id));
        let result = match self.stage(&staging, delta).await {
            Ok(0) => {
                info!("No delta files left on disk, skipping extraction");
                Ok(())
            }
            Ok(staged) => {
                info!(files = staged, staging = %staging.display(), "Running extraction");
                self.run_command(&staging).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
            }
        }
        result
    }
}

async fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if fs::symlink(source, target).await.is_ok() {
            return Ok(());
        }
    }
    fs::copy(source, target).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaItem;
    use crate::ledger::LedgerStatus;
    use tempfile::TempDir;

    async fn delta_with_file(dir: &Path, name: &str) -> RunDelta {
        let path = dir.join(name);
        fs::write(&path, b"%PDF-1.4").await.unwrap();
        [DeltaItem {
            remote_id: "0698z000001AaAaAAK".to_string(),
            status: LedgerStatus::Downloaded,
            local_path: path,
            checksum: "c".repeat(64),
        }]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_without_command_is_noop() {
        let temp = TempDir::new().unwrap();
        let delta = delta_with_file(temp.path(), "a.pdf").await;
        let trigger = CommandTrigger::new(Vec::new(), temp.path().join("staging"));

        trigger.trigger("r1", &delta).await.unwrap();
        assert!(!temp.path().join("staging").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sees_only_delta_files() {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        fs::create_dir_all(&downloads).await.unwrap();
        fs::write(downloads.join("old.pdf"), b"old").await.unwrap();
        let delta = delta_with_file(&downloads, "new_0698z000001AaAaAAK.pdf").await;

        let listing = temp.path().join("listing.txt");
        let trigger = CommandTrigger::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("ls \"$0\" > {}", listing.display()),
                "{staging_dir}".to_string(),
            ],
            temp.path().join("staging"),
        );

        trigger.trigger("r1", &delta).await.unwrap();

        let listed = fs::read_to_string(&listing).await.unwrap();
        assert_eq!(listed.trim(), "new_0698z000001AaAaAAK.pdf");
        // staging is cleaned up
        assert!(!temp.path().join("staging").join("run-r1").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_error() {
        let temp = TempDir::new().unwrap();
        let delta = delta_with_file(temp.path(), "a.pdf").await;
        let trigger = CommandTrigger::new(
            vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            temp.path().join("staging"),
        );

        let result = trigger.trigger("r1", &delta).await;
        assert!(matches!(result, Err(TriggerError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let temp = TempDir::new().unwrap();
        let delta = delta_with_file(temp.path(), "a.pdf").await;
        let trigger = CommandTrigger::new(
            vec!["docketeer-no-such-extractor".to_string()],
            temp.path().join("staging"),
        );

        let result = trigger.trigger("r1", &delta).await;
        assert!(matches!(result, Err(TriggerError::CommandNotFound(_))));
    }
}
