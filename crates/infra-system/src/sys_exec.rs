// Supervised process runner
// reason: tokio for async child IO + timers, nix for the kill signal (unix)
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, info_span, warn, Instrument};

use sysexec_core::application::constants::{
    READ_CHUNK_SIZE, SUCCESS_EXIT_CODE, WATCHDOG_POLL_INTERVAL,
};
use sysexec_core::application::panic_guard::execute_guarded;
use sysexec_core::application::{EnhancedPromise, Handlers, Message, RejectHandle};
use sysexec_core::domain::{
    looks_like_syntax_error, BoxError, ErrorDetails, ErrorKind, OutputParser, ParseError,
    PlaintextParser, ProcessExit, ProcessOutcome, SysExecOptions, SysExecResult,
};
use sysexec_core::port::id_provider::UuidProvider;
use sysexec_core::port::time_provider::SystemTimeProvider;
use sysexec_core::port::{CommandRunner, IdProvider, TimeProvider};

use crate::run_state::{RunState, StreamKind};
use crate::watchdog::{Watchdog, WatchdogRegistry};

type RunHandlers<R> = Handlers<ProcessOutcome<R>, R>;

/// Supervised process runner
///
/// Spawns one child per call, buffers its stdout/stderr, kills it when it
/// stays silent longer than the read timeout and settles exactly once with
/// a `ProcessOutcome` or a typed `SysExecError`.
pub struct SysExec {
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    watchdogs: WatchdogRegistry,
}

impl Default for SysExec {
    fn default() -> Self {
        Self::new()
    }
}

impl SysExec {
    pub fn new() -> Self {
        Self::with_providers(Arc::new(SystemTimeProvider), Arc::new(UuidProvider))
    }

    /// Create a runner with explicit time/id sources
    ///
    /// # Example
    /// ```ignore
    /// let runner = SysExec::with_providers(
    ///     Arc::new(SystemTimeProvider),
    ///     Arc::new(SequentialIdProvider::default()),
    /// );
    /// ```
    pub fn with_providers(
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            time_provider,
            id_provider,
            watchdogs: WatchdogRegistry::default(),
        }
    }

    /// Watchdog timers currently alive for runs of this instance
    pub fn active_watchdogs(&self) -> usize {
        self.watchdogs.active()
    }

    /// Run `command` to completion and parse its stdout with `parser`
    ///
    /// Returns `Ok(None)` in quiet mode without spawning anything.
    ///
    /// # Errors
    /// - `SpawnFailure`: the process could not be started
    /// - `KilledByTimeout` / `KilledExternally`: terminated by a signal
    /// - `ParseFailure`: the parser rejected (or panicked on) stdout
    /// - `NonZeroExit`: carries the parsed stdout as data
    /// - `Uncaught`: IO failure while supervising
    pub async fn run<P>(
        &self,
        command: &str,
        args: &[String],
        parser: P,
        options: &SysExecOptions,
    ) -> SysExecResult<P::Output>
    where
        P: OutputParser,
    {
        if options.quiet {
            debug!(command = %command, "Quiet mode, process not spawned");
            return Ok(None);
        }

        let run_id = self.id_provider.generate_id();
        let span = info_span!("sys_exec", run_id = %run_id, command = %command);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        // Own process group, so a kill also reaches pipe-holding descendants
        #[cfg(unix)]
        cmd.process_group(0);

        let supervisor = Supervisor {
            program: command.to_string(),
            parser,
            time_provider: Arc::clone(&self.time_provider),
            watchdogs: self.watchdogs.clone(),
            read_timeout_ms: options.read_timeout_ms,
        };
        let read_timeout = options.read_timeout();

        let promise: EnhancedPromise<ProcessOutcome<P::Output>, P::Output> = EnhancedPromise::run(
            move |handlers| {
                async move { supervisor.supervise(cmd, read_timeout, handlers).await }
                    .instrument(span)
            },
            on_uncaught,
        );

        promise.await.map(Some)
    }
}

#[async_trait]
impl CommandRunner for SysExec {
    async fn run_plaintext(
        &self,
        command: &str,
        args: &[String],
        options: &SysExecOptions,
    ) -> SysExecResult<String> {
        self.run(command, args, PlaintextParser, options).await
    }
}

/// Maps failures escaping the supervision body into the taxonomy
fn on_uncaught<R>(err: BoxError, handle: RejectHandle<ProcessOutcome<R>, R>)
where
    R: Send + 'static,
{
    let parser_suspected = looks_like_syntax_error(err.as_ref());
    error!(error = %err, parser_suspected, "Uncaught failure while supervising process");

    let message = if parser_suspected {
        "uncaught exception (probably parser has failed)"
    } else {
        "uncaught exception"
    };
    handle.reject(
        message,
        ErrorDetails::new(ErrorKind::Uncaught { parser_suspected }).with_source(err),
    );
}

/// Owns everything one run needs besides its mutable state
struct Supervisor<P> {
    program: String,
    parser: P,
    time_provider: Arc<dyn TimeProvider>,
    watchdogs: WatchdogRegistry,
    read_timeout_ms: u64,
}

impl<P: OutputParser> Supervisor<P> {
    /// spawned -> collecting-output -> closed -> settled
    async fn supervise(
        self,
        mut cmd: Command,
        read_timeout: Option<std::time::Duration>,
        handlers: RunHandlers<P::Output>,
    ) -> Result<(), BoxError> {
        let started_millis = self.time_provider.now_millis();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(error = %err, "Failed to spawn process");
                handlers.reject(
                    format!("failed to spawn '{}': {}", self.program, err),
                    ErrorDetails::new(ErrorKind::SpawnFailure).with_source(err),
                );
                return Ok(());
            }
        };
        info!(pid = ?child.id(), "Process spawned");

        let mut state = RunState::new(started_millis);
        if let Some(timeout) = read_timeout {
            state.arm_watchdog(Watchdog::start(
                timeout,
                WATCHDOG_POLL_INTERVAL,
                &self.watchdogs,
            ));
        }

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            state.disarm_watchdog();
            handlers.reject(
                "spawned process has no readable stdout/stderr handles",
                ErrorDetails::new(ErrorKind::SpawnFailure),
            );
            return Ok(());
        };

        let mut out_buf = vec![0u8; READ_CHUNK_SIZE];
        let mut err_buf = vec![0u8; READ_CHUNK_SIZE];
        let mut stdout_open = true;
        let mut stderr_open = true;

        let status = loop {
            tokio::select! {
                read = stdout.read(&mut out_buf), if stdout_open => match read? {
                    0 => stdout_open = false,
                    n => state.record(StreamKind::Stdout, &out_buf[..n], self.time_provider.now_millis()),
                },
                read = stderr.read(&mut err_buf), if stderr_open => match read? {
                    0 => stderr_open = false,
                    n => state.record(StreamKind::Stderr, &err_buf[..n], self.time_provider.now_millis()),
                },
                _ = state.watchdog_tick() => {
                    let now = self.time_provider.now_millis();
                    if state.should_kill(now) {
                        warn!(
                            silence_ms = state.silence_ms(now),
                            read_timeout_ms = self.read_timeout_ms,
                            "Read timeout exceeded, killing process"
                        );
                        state.mark_timeout_killed();
                        send_kill(&mut child);
                    }
                },
                // Grandchildren may keep the pipes open after a timeout kill
                status = child.wait(), if (!stdout_open && !stderr_open) || state.timeout_killed() => {
                    break status?;
                }
            }
        };

        self.on_process_closed(ProcessExit::from_status(status), &mut state, &handlers);
        Ok(())
    }

    /// Close handler: decides the single settlement of the run
    ///
    /// A close observed after settlement is a no-op.
    fn on_process_closed(
        &self,
        exit: ProcessExit,
        state: &mut RunState,
        handlers: &RunHandlers<P::Output>,
    ) {
        state.disarm_watchdog();
        if handlers.is_settled() {
            debug!(?exit, "Close after settlement ignored");
            return;
        }

        let std_out = state.take_output(StreamKind::Stdout);
        let std_err = state.take_output(StreamKind::Stderr);
        let duration_ms = self.time_provider.now_millis() - state.started_millis();

        let code = match exit {
            ProcessExit::Code(code) => code,
            // The flag only picks the killed kind; a normal exit is never a kill
            ProcessExit::Signal(_) if state.timeout_killed() => {
                warn!(duration_ms, "Process killed by read timeout");
                handlers.reject(
                    "spawned process was killed due to read timeout",
                    ErrorDetails::new(ErrorKind::KilledByTimeout {
                        read_timeout_ms: self.read_timeout_ms,
                    }),
                );
                return;
            }
            ProcessExit::Signal(signal) => {
                warn!(?signal, duration_ms, "Process killed by external signal");
                handlers.reject(
                    Message::lazy(move || match signal {
                        Some(signal) => format!(
                            "spawned process was killed due to external signal ({})",
                            signal
                        ),
                        None => "spawned process was killed due to external signal".to_string(),
                    }),
                    ErrorDetails::new(ErrorKind::KilledExternally { signal }),
                );
                return;
            }
        };

        let parsed = match execute_guarded(|| self.parser.parse(&std_out)).into_result() {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(parse_err)) => {
                warn!(error = %parse_err, exit_code = code, "Failed to parse process output");
                handlers.reject(
                    "failed to parse output of spawned process",
                    ErrorDetails::new(ErrorKind::ParseFailure).with_source(parse_err),
                );
                return;
            }
            Err(panic_msg) => {
                handlers.reject(
                    "failed to parse output of spawned process",
                    ErrorDetails::new(ErrorKind::ParseFailure)
                        .with_source(ParseError::Panicked(panic_msg)),
                );
                return;
            }
        };

        if code != SUCCESS_EXIT_CODE {
            warn!(exit_code = code, duration_ms, "Process returned non-success exit code");
            handlers.reject(
                Message::lazy(move || {
                    format!("spawned process returned non-success ({}) exit code", code)
                }),
                ErrorDetails::new(ErrorKind::NonZeroExit { code }).with_data(parsed),
            );
            return;
        }

        info!(
            exit_code = code,
            duration_ms,
            stdout_bytes = std_out.len(),
            stderr_bytes = std_err.len(),
            "Process completed"
        );
        handlers.resolve(ProcessOutcome {
            exit_code: Some(code),
            std_out,
            std_err,
            parsed_std_out: parsed,
            duration_ms,
        });
    }
}

/// Send the single kill signal (SIGKILL to the child's process group on unix)
fn send_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // Group id equals the child pid (spawned with process_group(0))
        if let Some(pgid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) => return,
                Err(errno) => warn!(pgid, error = %errno, "Group SIGKILL failed, falling back"),
            }
        }
    }

    if let Err(err) = child.start_kill() {
        warn!(error = %err, "Failed to kill process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use sysexec_core::domain::JsonParser;
    use sysexec_core::port::id_provider::SequentialIdProvider;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sh(script: &str) -> Vec<String> {
        args(&["-c", script])
    }

    #[tokio::test]
    async fn test_echo_success() {
        let runner = SysExec::new();
        let outcome = runner
            .run("echo", &args(&["hello"]), PlaintextParser, &SysExecOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.std_out, b"hello\n");
        assert_eq!(outcome.parsed_std_out, "hello\n");
        assert!(outcome.std_err.is_empty());
        assert!(outcome.duration_ms >= 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_parsed_output() {
        let runner = SysExec::new();
        let err = runner
            .run(
                "sh",
                &sh(r#"echo '{"error":"E404"}'; exit 2"#),
                JsonParser::<serde_json::Value>::new(),
                &SysExecOptions::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NonZeroExit { code: 2 });
        assert_eq!(err.data().unwrap()["error"], "E404");
        assert_eq!(err.message(), "spawned process returned non-success (2) exit code");
    }

    #[tokio::test]
    async fn test_quiet_never_spawns() {
        let runner = SysExec::new();
        let result = runner
            .run(
                "definitely-not-a-real-binary-xyz",
                &[],
                PlaintextParser,
                &SysExecOptions::default().quiet(true),
            )
            .await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(runner.active_watchdogs(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = SysExec::new();
        let err = runner
            .run(
                "definitely-not-a-real-binary-xyz",
                &[],
                PlaintextParser,
                &SysExecOptions::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SpawnFailure);
        assert!(err.message().contains("definitely-not-a-real-binary-xyz"));
        assert_eq!(runner.active_watchdogs(), 0);
    }

    #[tokio::test]
    async fn test_chunks_keep_arrival_order() {
        let runner = SysExec::new();
        let outcome = runner
            .run(
                "sh",
                &sh("printf AB; sleep 0.2; printf CD"),
                PlaintextParser,
                &SysExecOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.std_out, b"ABCD");
    }

    #[tokio::test]
    async fn test_parse_failure() {
        let runner = SysExec::new();
        let err = runner
            .run(
                "echo",
                &args(&["not json"]),
                JsonParser::<serde_json::Value>::new(),
                &SysExecOptions::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert!(err.original().is_some());
    }

    #[tokio::test]
    async fn test_panicking_parser_is_parse_failure() {
        let runner = SysExec::new();
        let parser = |_: &[u8]| -> Result<u32, ParseError> { panic!("bad parser") };
        let err = runner
            .run("true", &[], parser, &SysExecOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert!(err.original().unwrap().to_string().contains("bad parser"));
    }

    #[tokio::test]
    async fn test_cwd_and_env_are_applied() {
        let dir = std::env::temp_dir();
        let runner = SysExec::new();
        let outcome = runner
            .run(
                "sh",
                &sh(r#"printf '%s|' "$SYSEXEC_TEST_VAR"; pwd"#),
                PlaintextParser,
                &SysExecOptions::default()
                    .with_cwd(&dir)
                    .with_env("SYSEXEC_TEST_VAR", "marker"),
            )
            .await
            .unwrap()
            .unwrap();

        let (var, cwd) = outcome.parsed_std_out.trim_end().split_once('|').unwrap();
        assert_eq!(var, "marker");
        assert_eq!(
            std::fs::canonicalize(cwd).unwrap(),
            std::fs::canonicalize(&dir).unwrap()
        );
    }

    #[tokio::test]
    async fn test_close_after_settlement_is_noop() {
        let parse_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = parse_calls.clone();
        let supervisor = Supervisor {
            program: "fake".to_string(),
            parser: move |buf: &[u8]| -> Result<usize, ParseError> {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(buf.len())
            },
            time_provider: Arc::new(SystemTimeProvider),
            watchdogs: WatchdogRegistry::default(),
            read_timeout_ms: 0,
        };

        let promise = EnhancedPromise::<ProcessOutcome<usize>, usize>::run(
            move |handlers| async move {
                let mut state = RunState::new(0);
                state.record(StreamKind::Stdout, b"abc", 1);
                supervisor.on_process_closed(ProcessExit::Code(0), &mut state, &handlers);
                supervisor.on_process_closed(ProcessExit::Code(1), &mut state, &handlers);
                Ok(())
            },
            on_uncaught,
        );

        let outcome = promise.await.unwrap();
        assert_eq!(outcome.parsed_std_out, 3);
        assert_eq!(parse_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_external_signal_is_killed_externally() {
        let runner = SysExec::new();
        let err = runner
            .run("sh", &sh("kill -9 $$"), PlaintextParser, &SysExecOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::KilledExternally { signal: Some(9) });
        assert!(err.kind().is_killed());
    }

    #[tokio::test]
    async fn test_watchdogs_released_on_every_path() {
        let runner = SysExec::with_providers(
            Arc::new(SystemTimeProvider),
            Arc::new(SequentialIdProvider::default()),
        );
        let options = SysExecOptions::default().with_read_timeout_ms(5_000);

        let _ = runner.run("true", &[], PlaintextParser, &options).await;
        assert_eq!(runner.active_watchdogs(), 0);

        let _ = runner.run("false", &[], PlaintextParser, &options).await;
        assert_eq!(runner.active_watchdogs(), 0);

        let _ = runner
            .run("echo", &args(&["x"]), JsonParser::<u8>::new(), &options)
            .await;
        assert_eq!(runner.active_watchdogs(), 0);
    }

    fn plaintext_supervisor(
        watchdogs: &WatchdogRegistry,
        read_timeout_ms: u64,
    ) -> Supervisor<PlaintextParser> {
        Supervisor {
            program: "test".to_string(),
            parser: PlaintextParser,
            time_provider: Arc::new(SystemTimeProvider),
            watchdogs: watchdogs.clone(),
            read_timeout_ms,
        }
    }

    /// Dead, or a zombie waiting for its reaper
    #[cfg(target_os = "linux")]
    fn process_gone(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_background_grandchild_is_killed_with_the_group() {
        let runner = SysExec::new();
        let started = std::time::Instant::now();
        let outcome = runner
            .run(
                "sh",
                &sh("sleep 30 & echo $!; exit 0"),
                PlaintextParser,
                &SysExecOptions::default().with_read_timeout_ms(300),
            )
            .await
            .unwrap()
            .unwrap();

        // sh exited normally; only its background sleep held the pipes
        assert_eq!(outcome.exit_code, Some(0));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert_eq!(runner.active_watchdogs(), 0);

        let pid: u32 = outcome.parsed_std_out.trim().parse().unwrap();
        #[cfg(target_os = "linux")]
        assert!(process_gone(pid), "background sleep {} survived the run", pid);
        let _ = pid;
    }

    #[tokio::test]
    async fn test_normal_exit_after_timeout_kill_is_not_a_kill() {
        let supervisor = plaintext_supervisor(&WatchdogRegistry::default(), 300);

        let promise = EnhancedPromise::<ProcessOutcome<String>, String>::run(
            move |handlers| async move {
                let mut state = RunState::new(0);
                state.record(StreamKind::Stdout, b"done\n", 1);
                state.mark_timeout_killed();
                supervisor.on_process_closed(ProcessExit::Code(0), &mut state, &handlers);
                Ok(())
            },
            on_uncaught,
        );

        let outcome = promise.await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.parsed_std_out, "done\n");
    }

    #[tokio::test]
    async fn test_signal_after_timeout_kill_is_killed_by_timeout() {
        let supervisor = plaintext_supervisor(&WatchdogRegistry::default(), 300);

        let promise = EnhancedPromise::<ProcessOutcome<String>, String>::run(
            move |handlers| async move {
                let mut state = RunState::new(0);
                state.mark_timeout_killed();
                supervisor.on_process_closed(ProcessExit::Signal(Some(9)), &mut state, &handlers);
                Ok(())
            },
            on_uncaught,
        );

        let err = promise.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KilledByTimeout { read_timeout_ms: 300 });
        assert_eq!(err.message(), "spawned process was killed due to read timeout");
    }

    #[tokio::test]
    async fn test_missing_stdio_handle_is_spawn_failure() {
        let registry = WatchdogRegistry::default();
        let supervisor = plaintext_supervisor(&registry, 5_000);
        let mut cmd = Command::new("true");
        cmd.stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let promise = EnhancedPromise::<ProcessOutcome<String>, String>::run(
            move |handlers| {
                supervisor.supervise(cmd, Some(std::time::Duration::from_secs(5)), handlers)
            },
            on_uncaught,
        );

        let err = promise.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SpawnFailure);
        assert_eq!(
            err.message(),
            "spawned process has no readable stdout/stderr handles"
        );
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_is_uncaught() {
        let promise = EnhancedPromise::<ProcessOutcome<String>, String>::run(
            |_handlers| async move {
                Err::<(), BoxError>(Box::new(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "stdout read failed",
                )))
            },
            on_uncaught,
        );

        let err = promise.await.unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Uncaught {
                parser_suspected: false
            }
        );
        assert_eq!(err.message(), "uncaught exception");
        assert!(err
            .original()
            .unwrap()
            .to_string()
            .contains("stdout read failed"));
    }

    #[tokio::test]
    async fn test_syntax_failure_is_uncaught_parser_suspected() {
        let promise = EnhancedPromise::<ProcessOutcome<String>, String>::run(
            |_handlers| async move {
                let _: serde_json::Value = serde_json::from_str("{unterminated")?;
                Ok::<(), BoxError>(())
            },
            on_uncaught,
        );

        let err = promise.await.unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Uncaught {
                parser_suspected: true
            }
        );
        assert_eq!(
            err.message(),
            "uncaught exception (probably parser has failed)"
        );
    }
}
