// Terminal rendering of run outcomes and failures
use colored::Colorize;
use tabled::{Table, Tabled};

use sysexec_core::domain::{ProcessOutcome, SysExecError};

#[derive(Tabled)]
struct SummaryRow {
    field: &'static str,
    value: String,
}

/// Summary table + parsed stdout
pub fn print_outcome<R>(outcome: &ProcessOutcome<R>, render: impl Fn(&R) -> String) {
    let exit_code = outcome
        .exit_code
        .map_or_else(|| "none".to_string(), |code| code.to_string());

    let rows = vec![
        SummaryRow {
            field: "exit code",
            value: exit_code,
        },
        SummaryRow {
            field: "duration",
            value: format!("{} ms", outcome.duration_ms),
        },
        SummaryRow {
            field: "stdout",
            value: format!("{} bytes", outcome.std_out.len()),
        },
        SummaryRow {
            field: "stderr",
            value: format!("{} bytes", outcome.std_err.len()),
        },
    ];

    println!("{}", "✓ Process completed".green().bold());
    println!();
    println!("{}", Table::new(rows));

    let parsed = render(&outcome.parsed_std_out);
    if !parsed.is_empty() {
        println!();
        println!("{}", "Parsed output:".cyan().bold());
        println!("{}", parsed);
    }

    if !outcome.std_err.is_empty() {
        println!();
        println!("{}", "stderr:".yellow().bold());
        println!("{}", outcome.stderr_lossy());
    }
}

/// Kind, message, payload and cause of a failed run
pub fn print_failure<R>(err: &SysExecError<R>, render: impl Fn(&R) -> String) {
    eprintln!(
        "{} {}",
        format!("✗ [{}]", err.kind().tag()).red().bold(),
        err.message()
    );

    if let Some(data) = err.data() {
        eprintln!("  {} {}", "data:".bold(), render(data));
    }
    if let Some(cause) = err.original() {
        eprintln!("  {} {}", "cause:".bold(), cause);
    }
}

pub fn print_quiet() {
    println!("{}", "○ Quiet mode: nothing was run".yellow());
}
