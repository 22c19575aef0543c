use anyhow::{bail, Context, Result};
use kloppy::{
    config::CopyConfig,
    core::{CopyOrchestrator, CopyReport},
    observability::{init_logging, shutdown_logging},
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Redraw interval for the progress line
const DISPLAY_INTERVAL: Duration = Duration::from_millis(100);

struct CliArgs {
    destination: PathBuf,
    sources: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    pause: bool,
    /// Source list was piped in, so stdin cannot wait for Enter
    sources_from_stdin: bool,
}

impl CliArgs {
    fn can_pause(&self) -> bool {
        self.pause && !self.sources_from_stdin
    }
}

fn main() -> ExitCode {
    let started = Instant::now();
    let raw: Vec<String> = std::env::args().skip(1).collect();

    if raw.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    let args = match parse_args(raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("Usage: kloppy [--config FILE] [--pause] DEST [SOURCE...]");
            return ExitCode::FAILURE;
        }
    };
    let pause = args.can_pause();
    if args.pause && !pause {
        eprintln!("--pause ignored: stdin already supplied the source list");
    }

    let code = match run_paste(args) {
        Ok(report) => {
            println!();
            println!("All files and folders pasted successfully.");
            if !report.missing_sources.is_empty() {
                println!("{} source(s) no longer existed and were skipped.", report.missing_sources.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\nError during paste operation: {:#}", e);
            ExitCode::FAILURE
        }
    };

    println!("Time taken: {:.2?}", started.elapsed());
    shutdown_logging();

    if pause {
        println!("\nPress Enter to exit...");
        let _ = std::io::stdin().lock().read_line(&mut String::new());
    }

    code
}

fn parse_args(raw: Vec<String>) -> Result<CliArgs> {
    let mut destination = None;
    let mut sources = Vec::new();
    let mut config_path = None;
    let mut pause = false;

    let mut iter = raw.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--pause" => pause = true,
            "--config" => {
                let path = iter.next().context("--config requires a file path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--paste" => {
                let path = iter.next().context("--paste requires a destination directory")?;
                destination = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            _ if destination.is_none() => destination = Some(PathBuf::from(arg)),
            _ => sources.push(PathBuf::from(arg)),
        }
    }

    let Some(destination) = destination else {
        bail!("Missing destination directory");
    };

    let sources_from_stdin = sources.is_empty();
    if sources_from_stdin {
        sources = read_sources_from_stdin()?;
    }
    if sources.is_empty() {
        bail!("No files or folders to paste");
    }

    let sources = sources.iter().map(|p| absolute(p)).collect::<Result<Vec<_>>>()?;

    Ok(CliArgs {
        destination,
        sources,
        config_path,
        pause,
        sources_from_stdin,
    })
}

/// One path per line, as produced by a file-manager clipboard export
fn read_sources_from_stdin() -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read source list from stdin")?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            sources.push(PathBuf::from(trimmed));
        }
    }
    Ok(sources)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    match dunce::canonicalize(path) {
        Ok(p) => Ok(p),
        // Left for discovery to report as missing
        Err(_) => Ok(std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(path)),
    }
}

#[tokio::main]
async fn run_paste(args: CliArgs) -> Result<CopyReport> {
    let config = match &args.config_path {
        Some(path) => CopyConfig::load(path).await
            .context("Failed to load configuration")?,
        None => CopyConfig::default(),
    };

    init_logging(
        &config.log_level,
        config.log_directory.as_deref(),
        config.log_rotation.into(),
    )?;

    info!("Kloppy v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config_path {
        info!("Configuration loaded from: {}", path.display());
    }
    info!(
        "Memory bound: {} bytes across {} queued batches",
        config.max_resident_bytes(),
        config.queue_capacity
    );

    let mut orchestrator = CopyOrchestrator::new(config, &args.destination)?;
    info!("Pasting into {}", orchestrator.destination().display());
    let mut updates = orchestrator.subscribe();

    let display = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().status.clone();
            let _ = write!(stdout, "\r{}", status);
            let _ = stdout.flush();
            tokio::time::sleep(DISPLAY_INTERVAL).await;
        }
    });

    let result = orchestrator.run(&args.sources).await;

    // Closing the progress channel lets the display print its final frame and exit
    drop(orchestrator);
    if let Err(e) = display.await {
        warn!("Progress display stopped unexpectedly: {}", e);
    }

    result
}

fn print_help() {
    println!("Kloppy v{} - Batched file paste", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("  kloppy [OPTIONS] DEST [SOURCE...]");
    println!("  kloppy [OPTIONS] --paste DEST [SOURCE...]");
    println!();
    println!("When no SOURCE is given, source paths are read from stdin, one per line.");
    println!();
    println!("OPTIONS:");
    println!("  --config FILE    JSON configuration (batch_threshold, queue_capacity, chunk_size, logging)");
    println!("  --pause          Wait for Enter before exiting (ignored when sources come from stdin)");
    println!("  --help           Show this help");
    println!();
    println!("EXAMPLES:");
    println!("  kloppy ~/backup ~/Documents/report.pdf ~/Pictures");
    println!("  xclip -o | kloppy --paste ~/backup");
}
