// Hook Runner - sequential pre/post command lists from a settings file
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::application::constants::HOOK_READ_TIMEOUT_MS;
use crate::domain::{HookCommand, HookSettings, SysExecOptions};
use crate::error::{AppError, Result};
use crate::port::CommandRunner;

/// Load hook settings; a missing file yields the defaults (no hooks)
pub async fn load_settings(path: &Path) -> Result<HookSettings> {
    if !tokio::fs::try_exists(path).await? {
        info!(path = %path.display(), "No hook settings file, using defaults");
        return Ok(HookSettings::default());
    }

    let raw = tokio::fs::read_to_string(path).await?;
    let settings: HookSettings = serde_json::from_str(&raw).map_err(|e| {
        AppError::Config(format!("invalid hook settings {}: {}", path.display(), e))
    })?;

    info!(
        path = %path.display(),
        pre_cmds = settings.pre_cmds.len(),
        post_cmds = settings.post_cmds.len(),
        "Hook settings loaded"
    );
    Ok(settings)
}

/// Runs hook commands one after another through a `CommandRunner`
pub struct HookRunner {
    runner: Arc<dyn CommandRunner>,
    options: SysExecOptions,
}

impl HookRunner {
    /// Hooks use plaintext parsing and a 60s read timeout
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_options(
            runner,
            SysExecOptions::default().with_read_timeout_ms(HOOK_READ_TIMEOUT_MS),
        )
    }

    pub fn with_options(runner: Arc<dyn CommandRunner>, options: SysExecOptions) -> Self {
        Self { runner, options }
    }

    /// Run every command in order, stopping at the first failure
    ///
    /// Returns the number of commands that ran (0 in quiet mode).
    pub async fn run_all(&self, cmds: &[HookCommand]) -> Result<usize> {
        let mut ran = 0;

        for cmd in cmds {
            info!(command = %cmd.command, args = ?cmd.args, "Running hook");

            match self
                .runner
                .run_plaintext(&cmd.command, &cmd.args, &self.options)
                .await
            {
                Ok(Some(_)) => ran += 1,
                Ok(None) => {}
                Err(source) => {
                    error!(
                        command = %cmd.command,
                        kind = %source.kind(),
                        "Hook failed, aborting remaining hooks"
                    );
                    return Err(AppError::Hook {
                        command: cmd.command.clone(),
                        source,
                    });
                }
            }
        }

        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::port::command_runner::mocks::{MockBehavior, MockCommandRunner};

    fn cmds() -> Vec<HookCommand> {
        vec![
            HookCommand::new("first", ["a"]),
            HookCommand::new("second", Vec::<String>::new()),
            HookCommand::new("third", ["b", "c"]),
        ]
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let mock = Arc::new(MockCommandRunner::new());
        let runner = HookRunner::new(mock.clone());

        let ran = runner.run_all(&cmds()).await.unwrap();

        assert_eq!(ran, 3);
        let names: Vec<String> = mock.calls().into_iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(mock.calls()[2].1, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let mock = Arc::new(
            MockCommandRunner::new().on("second", MockBehavior::NonZeroExit(3, "nope".into())),
        );
        let runner = HookRunner::new(mock.clone());

        let err = runner.run_all(&cmds()).await.unwrap_err();

        match err {
            AppError::Hook { command, source } => {
                assert_eq!(command, "second");
                assert_eq!(source.kind(), ErrorKind::NonZeroExit { code: 3 });
                assert_eq!(source.data().map(String::as_str), Some("nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.call_count(), 2, "third hook must not run");
    }

    #[tokio::test]
    async fn test_timeout_uses_hook_read_timeout() {
        let mock = Arc::new(MockCommandRunner::new().on("first", MockBehavior::Timeout));
        let runner = HookRunner::new(mock);

        let err = runner.run_all(&cmds()).await.unwrap_err();
        match err {
            AppError::Hook { source, .. } => assert_eq!(
                source.kind(),
                ErrorKind::KilledByTimeout {
                    read_timeout_ms: HOOK_READ_TIMEOUT_MS
                }
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_quiet_runs_nothing() {
        let mock = Arc::new(MockCommandRunner::new());
        let runner = HookRunner::with_options(mock.clone(), SysExecOptions::default().quiet(true));

        assert_eq!(runner.run_all(&cmds()).await.unwrap(), 0);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(settings, HookSettings::default());
    }

    #[tokio::test]
    async fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sysexec.json");
        std::fs::write(&path, r#"{ "preCmds": [["echo", ["hi"]]] }"#).unwrap();

        let settings = load_settings(&path).await.unwrap();
        assert_eq!(settings.pre_cmds, vec![HookCommand::new("echo", ["hi"])]);
        assert!(settings.post_cmds.is_empty());
    }

    #[tokio::test]
    async fn test_load_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ preCmds: ").unwrap();

        let err = load_settings(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
