use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tally_check::{Checker, CheckerConfig, LineIndex, Mode, SignatureTable};

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Tally: static linear/affine resource checking for program trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a program tree and report resource violations
    Check {
        /// Path to the JSON program tree
        file: PathBuf,

        /// Stop each function at its first violation
        #[arg(long)]
        fail_fast: bool,

        /// Number of worker threads
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,

        /// Source text the tree was parsed from (for line:column positions)
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Print the global signature table
    Signatures {
        /// Path to the JSON program tree
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            file,
            fail_fast,
            jobs,
            format,
            source,
        } => {
            let config = CheckerConfig {
                mode: if fail_fast { Mode::FailFast } else { Mode::Batch },
                workers: jobs,
            };
            let pass = cmd_check(&file, config, format, source)?;
            if !pass {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Signatures { file, format } => cmd_signatures(&file, format),
    }
}

fn cmd_check(
    file: &Path,
    config: CheckerConfig,
    format: Format,
    source: Option<PathBuf>,
) -> Result<bool> {
    let loaded = tally_cli::load_program(file)?;
    let index = match source {
        Some(path) => {
            let src = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read source '{}'", path.display()))?;
            Some(LineIndex::new(&src))
        }
        None => None,
    };

    log::info!(
        "checking {} functions with {} worker(s), {:?} mode",
        loaded.program.functions.len(),
        config.workers,
        config.mode
    );
    let report = Checker::new(config).check(&loaded.program);
    let name = file.display().to_string();

    match format {
        Format::Pretty => {
            for line in tally_cli::render_pretty(&name, &report, index.as_ref()) {
                eprintln!("{}", line);
            }
            println!("{}", tally_cli::summary(&report));
        }
        Format::Json => println!("{}", tally_cli::json_report(&name, &loaded, &report)?),
    }
    Ok(report.is_pass())
}

fn cmd_signatures(file: &Path, format: Format) -> Result<()> {
    let loaded = tally_cli::load_program(file)?;
    let (table, malformed) = SignatureTable::collect(&loaded.program);
    for m in &malformed {
        eprintln!("warning: {}", m);
    }

    match format {
        Format::Pretty => {
            for sig in table.iter() {
                println!("{}", tally_cli::format_signature(sig));
            }
        }
        Format::Json => println!("{}", tally_cli::signatures_json(&table)?),
    }
    Ok(())
}
