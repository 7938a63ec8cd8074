//! SysExec CLI - run supervised commands and hook lists from the terminal

mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use sysexec_core::application::constants::DEFAULT_READ_TIMEOUT_MS;
use sysexec_core::application::{load_settings, run_with_log, HookRunner, RunWithLogOptions};
use sysexec_core::domain::{
    JsonParser, NpmJsonParser, OutputParser, PlaintextParser, SysExecOptions,
};
use sysexec_infra_system::SysExec;

const DEFAULT_CONFIG_PATH: &str = "~/.sysexec/hooks.json";

#[derive(Parser)]
#[command(name = "sysexec")]
#[command(about = "Supervised process runner with a read-timeout watchdog", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logs (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one command under supervision
    Run {
        /// How to parse stdout
        #[arg(short, long, value_enum, default_value_t = ParserKind::Plain)]
        parser: ParserKind,

        /// Allowed output silence before the process is killed (0 disables)
        #[arg(long, env = "SYSEXEC_READ_TIMEOUT_MS", default_value_t = DEFAULT_READ_TIMEOUT_MS)]
        read_timeout_ms: u64,

        /// Do not run anything
        #[arg(short, long)]
        quiet: bool,

        /// Working directory of the child
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Run the pre/post hook commands of a settings file
    Hooks {
        /// Hook settings file
        #[arg(long, env = "SYSEXEC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: String,

        /// Which hook list to run
        #[arg(long, value_enum, default_value_t = Phase::All)]
        phase: Phase,

        /// Do not run anything
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ParserKind {
    Plain,
    Json,
    NpmJson,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Phase {
    Pre,
    Post,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    info!("SysExec v{}", sysexec_core::VERSION);

    match cli.command {
        Commands::Run {
            parser,
            read_timeout_ms,
            quiet,
            cwd,
            argv,
        } => {
            let mut options = SysExecOptions::default()
                .quiet(quiet)
                .with_read_timeout_ms(read_timeout_ms);
            if let Some(cwd) = cwd {
                options = options.with_cwd(cwd);
            }

            let (command, args) = argv
                .split_first()
                .context("Missing command to run")?;
            let runner = SysExec::new();

            match parser {
                ParserKind::Plain => {
                    run_command(&runner, command, args, PlaintextParser, &options, String::clone)
                        .await
                }
                ParserKind::Json => {
                    run_command(
                        &runner,
                        command,
                        args,
                        JsonParser::<serde_json::Value>::new(),
                        &options,
                        render_json,
                    )
                    .await
                }
                ParserKind::NpmJson => {
                    run_command(
                        &runner,
                        command,
                        args,
                        NpmJsonParser::<serde_json::Value>::new(),
                        &options,
                        render_json,
                    )
                    .await
                }
            }
        }

        Commands::Hooks {
            config,
            phase,
            quiet,
        } => run_hooks(&config, phase, quiet).await,
    }
}

async fn run_command<P>(
    runner: &SysExec,
    command: &str,
    args: &[String],
    parser: P,
    options: &SysExecOptions,
    render: impl Fn(&P::Output) -> String,
) -> Result<()>
where
    P: OutputParser,
{
    match runner.run(command, args, parser, options).await {
        Ok(Some(outcome)) => {
            output::print_outcome(&outcome, render);
            Ok(())
        }
        Ok(None) => {
            output::print_quiet();
            Ok(())
        }
        Err(err) => {
            output::print_failure(&err, render);
            Err(err.without_data()).with_context(|| format!("`{}` failed", command))
        }
    }
}

async fn run_hooks(config: &str, phase: Phase, quiet: bool) -> Result<()> {
    let path = PathBuf::from(shellexpand::tilde(config).into_owned());
    let settings = load_settings(&path)
        .await
        .with_context(|| format!("Failed to load hook settings from {}", path.display()))?;

    let hook_runner = HookRunner::new(Arc::new(SysExec::new()));

    let lists = [
        (Phase::Pre, "pre", &settings.pre_cmds),
        (Phase::Post, "post", &settings.post_cmds),
    ];

    for (list_phase, label, cmds) in lists {
        if phase != Phase::All && phase != list_phase {
            continue;
        }

        let count = cmds.len();
        let ran = run_with_log(
            hook_runner.run_all(cmds),
            RunWithLogOptions::new(
                format!("Running {} hooks", label),
                format!("{} command(s) completed", count),
            )
            .quiet(quiet),
        )
        .await?;

        match ran {
            Some(n) => println!("{} {} {} hook(s) ran", "✓".green(), n, label),
            None => println!("{} {} hooks skipped", "○".yellow(), label),
        }
    }

    Ok(())
}

fn render_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
