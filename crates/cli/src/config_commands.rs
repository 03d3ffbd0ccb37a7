use std::{path::Path, process::ExitCode};

use {anyhow::Result, clap::Args};

use courier_config::{
    Purpose,
    validate::{self, Severity},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Args, Debug)]
pub struct NewConfigArgs {
    /// File to create.
    #[arg(long, default_value = "courier.toml")]
    pub output: std::path::PathBuf,
    /// Bot username written into the template.
    #[arg(long, default_value = "courier")]
    pub username: String,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Validate for the console connector instead of Mattermost.
    #[arg(long)]
    pub shell: bool,
    /// Show informational diagnostics in addition to errors and warnings.
    #[arg(long)]
    pub verbose: bool,
}

pub fn new_config(args: &NewConfigArgs) -> Result<ExitCode> {
    courier_config::write_template(&args.output, &args.username)?;
    eprintln!("Wrote {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

pub fn check_config(config_path: Option<&Path>, args: &CheckConfigArgs) -> ExitCode {
    let purpose = if args.shell {
        Purpose::Shell
    } else {
        Purpose::Run
    };
    let result = validate::validate(config_path, purpose);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !args.verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{}{RESET} {}: {}",
                d.severity, d.path, d.message
            );
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
