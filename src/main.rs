//! src/main.rs

use std::panic;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;

use badblocks_map::logging::current_timestamp;
use badblocks_map::{
    open_for_scan, ArtifactWriter, DeviceScanner, Logger, OsDeviceInfo, Result, ScanConfig, ScanError, ScanStatus, MIB,
    SECTOR_SIZE,
};

const USAGE_DETAILS: &str = "   -s span: set minimum contiguous span (MiB) that must be free from defect.
            If any sector within it is bad, the whole span is marked bad.
            If span is zero or not supplied, then each sector is checked.";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Minimum contiguous span in MiB; a bad sector condemns its whole aligned span.
    #[clap(short = 's', long = "span", value_name = "MIB", default_value_t = 0, allow_negative_numbers = true)]
    span: i64,
    /// Block device or image file to scan.
    device: PathBuf,
    /// Bypass the page cache (O_DIRECT on Linux).
    #[clap(long)]
    direct_io: bool,
    /// Directory receiving the .png/.txt/.span artifacts.
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,
    #[clap(long, default_value = "badblocks.log")]
    log_file: PathBuf,
    /// Print a JSON summary on stdout when the scan ends.
    #[clap(long)]
    json: bool,
    #[clap(long)]
    no_progress: bool,
}

fn usage_and_exit(detail: &str) -> ! {
    let program = std::env::args().next().unwrap_or_else(|| "badblocks".to_string());
    if !detail.is_empty() {
        eprintln!("{}", detail.trim_end());
    }
    println!("Usage:\n{} [-s span] device", program);
    println!("{}\n", USAGE_DETAILS);
    process::exit(1);
}

/// `-s` in MiB to bytes. Negative or overflowing spans are rejected.
fn span_bytes(span_mib: i64) -> std::result::Result<u64, String> {
    u64::try_from(span_mib)
        .ok()
        .and_then(|mib| mib.checked_mul(MIB))
        .ok_or_else(|| format!("error: invalid span '{}'", span_mib))
}

fn parse_cli() -> (Cli, u64) {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => usage_and_exit(&e.to_string()),
        },
    };
    let min_span_bytes = match span_bytes(cli.span) {
        Ok(bytes) => bytes,
        Err(msg) => usage_and_exit(&msg),
    };
    (cli, min_span_bytes)
}

/// Io errors only surface once the scan has run, from writing its results.
fn failure_message(e: &ScanError) -> String {
    match e {
        ScanError::Io(_) => format!("Writing results failed: {}", e),
        _ => format!("Scan did not run: {}", e),
    }
}

fn main() {
    let (cli, min_span_bytes) = parse_cli();
    let logger = match Logger::with_file(&cli.log_file) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[{}] Failed to open log file '{}': {}. Further logs will only go to stderr.", current_timestamp(), cli.log_file.display(), e);
            Logger::stderr()
        }
    };
    let main_result = panic::catch_unwind(panic::AssertUnwindSafe(|| main_logic(&cli, min_span_bytes, &logger)));
    let exit_code = match main_result {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            logger.info(None, failure_message(&e));
            1
        }
        Err(panic_payload) => {
            let mut panic_msg = "A critical error occurred: scan panicked!".to_string();
            if let Some(s) = panic_payload.downcast_ref::<String>() {
                panic_msg.push_str(&format!("\nPanic message: {}", s));
            } else if let Some(s) = panic_payload.downcast_ref::<&str>() {
                panic_msg.push_str(&format!("\nPanic message: {}", s));
            }
            logger.info(None, panic_msg);
            101
        }
    };
    process::exit(exit_code);
}

fn main_logic(cli: &Cli, min_span_bytes: u64, logger: &Logger) -> Result<()> {
    logger.info(None, format!("Starting bad block scan of {}", cli.device.display()));
    logger.info(None, format!("Minimum span: {} bytes{}", min_span_bytes, if min_span_bytes == 0 { " (per-sector)" } else { "" }));
    logger.info(None, format!("Direct I/O: {}", cli.direct_io));

    let (mut device, total_bytes) = open_for_scan(&OsDeviceInfo, &cli.device, cli.direct_io)?;
    logger.info(None, format!("Device size={} bytes", total_bytes));

    let config = ScanConfig {
        min_span_bytes,
        direct_io: cli.direct_io,
        show_progress: !cli.no_progress,
        ..ScanConfig::default()
    };
    let scanner = DeviceScanner::new(config, logger.clone());
    let mut writer = ArtifactWriter::new(device.path(), &cli.output_dir, total_bytes / SECTOR_SIZE, logger.clone());
    let outcome = scanner.scan(&mut device, total_bytes, &mut writer)?;

    if let ScanStatus::Aborted { sector, reason } = &outcome.status {
        logger.info(None, format!("Scan stopped early at sector {} ({}); results are partial.", sector, reason));
    }
    writer.write(&outcome.model, outcome.total_sectors)?;

    logger.info(None, "--- Scan Summary ---");
    logger.info(None, format!("  Status:       {}", outcome.status.label()));
    logger.info(None, format!("  Bad sectors:  {}", outcome.model.bads.len()));
    logger.info(None, format!("  Bad spans:    {} ({} sectors)", outcome.model.spans.len(), outcome.model.span_sectors()));
    logger.info(None, format!("  Elapsed:      {:.2?}", outcome.elapsed));

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_json(&cli.device)).unwrap_or_default());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("badblocks").chain(args.iter().copied()))
    }

    #[test]
    fn span_defaults_to_per_sector() {
        let cli = parse(&["/dev/sdb"]).unwrap();
        assert_eq!(cli.device, PathBuf::from("/dev/sdb"));
        assert_eq!(span_bytes(cli.span), Ok(0));
    }

    #[test]
    fn explicit_zero_span_is_accepted() {
        let cli = parse(&["-s", "0", "/dev/sdb"]).unwrap();
        assert_eq!(span_bytes(cli.span), Ok(0));
    }

    #[test]
    fn span_is_converted_from_mib() {
        let cli = parse(&["-s", "4", "/dev/sdb"]).unwrap();
        assert_eq!(span_bytes(cli.span), Ok(4 * 1_048_576));
    }

    #[test]
    fn non_integer_span_fails_to_parse() {
        assert!(parse(&["-s", "abc", "/dev/sdb"]).is_err());
        assert!(parse(&["-s", "1.5", "/dev/sdb"]).is_err());
    }

    #[test]
    fn missing_device_fails_to_parse() {
        let err = parse(&["-s", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn negative_span_parses_then_is_rejected() {
        let cli = parse(&["-s", "-1", "/dev/sdb"]).unwrap();
        assert_eq!(cli.span, -1);
        assert!(span_bytes(cli.span).is_err());
    }

    #[test]
    fn io_failure_is_reported_as_result_write_failure() {
        let err = ScanError::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"));
        assert!(failure_message(&err).starts_with("Writing results failed: "));
    }

    #[test]
    fn setup_failures_are_reported_as_scan_not_run() {
        let empty = ScanError::EmptyDevice { path: PathBuf::from("/dev/sdb") };
        assert!(failure_message(&empty).starts_with("Scan did not run: "));
        assert!(failure_message(&ScanError::InvalidSpan { bytes: 700 }).starts_with("Scan did not run: "));
    }

    #[test]
    fn overflowing_span_is_rejected() {
        let cli = parse(&["-s", &i64::MAX.to_string(), "/dev/sdb"]).unwrap();
        assert!(span_bytes(cli.span).is_err());
    }
}
