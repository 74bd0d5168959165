#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use ikv::KeyCodec;
use ikv_harness::{TrialConfig, run_sweep, run_trial};
use std::env;

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("sweep") => sweep_cmd(&args[1..]),
        Some("trial") => trial_cmd(&args[1..]),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

fn parse_flags(args: &[String], config: &mut TrialConfig, workers: &mut usize) -> Result<()> {
    let mut index = 0_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--inserts" => {
                let raw = args.get(index + 1).context("--inserts requires a value")?;
                config.inserts = raw.parse().context("invalid --inserts value")?;
                index += 2;
            }
            "--workers" => {
                let raw = args.get(index + 1).context("--workers requires a value")?;
                *workers = raw.parse().context("invalid --workers value")?;
                index += 2;
            }
            "--domains" => {
                let raw = args.get(index + 1).context("--domains requires a value")?;
                config.domains = raw
                    .split(';')
                    .map(|domain| domain.split(',').map(str::to_owned).collect())
                    .collect();
                index += 2;
            }
            other => bail!("unknown flag: {other}"),
        }
    }
    Ok(())
}

fn sweep_cmd(args: &[String]) -> Result<()> {
    let mut config = TrialConfig::example();
    let mut workers = std::thread::available_parallelism().map_or(1, usize::from);
    parse_flags(args, &mut config, &mut workers)?;

    let codec = KeyCodec::example();
    let report = run_sweep(&config, &codec, workers)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean_sweep() {
        bail!("sweep found {} failing trials", report.failed);
    }
    Ok(())
}

fn trial_cmd(args: &[String]) -> Result<()> {
    let Some(raw_trial) = args.first() else {
        bail!("usage: ikv-harness trial <index> [--inserts N]");
    };
    let trial: u64 = raw_trial.parse().context("invalid trial index")?;

    let mut config = TrialConfig::example();
    let mut workers = 1_usize;
    parse_flags(&args[1..], &mut config, &mut workers)?;

    let total = config
        .trial_count()
        .context("trial count overflows u64")?;
    if trial >= total {
        bail!("trial {trial} out of range (sweep has {total} trials)");
    }

    let codec = KeyCodec::example();
    let rows = config.rows_for_trial(trial);
    for row in &rows {
        println!("{row}");
    }

    let outcome = run_trial(&codec, &rows)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn print_usage() {
    println!("ikv-harness\n");
    println!("USAGE:");
    println!("  ikv-harness sweep [--inserts N] [--workers N] [--domains 1,2;a,b;x,y]");
    println!("  ikv-harness trial <index> [--inserts N] [--domains 1,2;a,b;x,y]");
}
