use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use xyz2las::pipeline::{ConvertOptions, ConvertReport, convert};

const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;

/// Convert XYZ text, GeoTIFF, ASCII grid and GeoJSON sources to a LAS/LAZ point cloud
#[derive(Parser)]
#[command(name = "xyz2las")]
#[command(about = "Convert XYZ text, rasters and vector features to a LAS/LAZ point cloud")]
#[command(version)]
struct Cli {
    /// Input files followed by the output .las or .laz path
    #[arg(required = true, num_args = 2..)]
    files: Vec<PathBuf>,

    /// Coordinate scale stored in the output header
    #[arg(short, long, default_value_t = 0.01)]
    scale: f64,

    /// Color points by height, stretched over the 2nd to 98th Z percentile
    #[arg(short, long)]
    color: bool,

    /// Only log warnings and errors, no progress
    #[arg(short, long)]
    quiet: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn print_progress(accepted: u64, expected: Option<u64>) {
    let mut stderr = std::io::stderr();
    let _ = match expected {
        Some(total) if total > 0 => write!(
            stderr,
            "\rWriting points: {accepted} / {total} ({:.0}%)",
            accepted as f64 * 100.0 / total as f64
        ),
        _ => write!(stderr, "\rScanning: {accepted} points"),
    };
    let _ = stderr.flush();
}

fn print_summary(report: &ConvertReport) {
    println!("Found {} points.", report.points_written);
    println!(
        "Bounds: {:?} - {:?}",
        report.bounds.min(),
        report.bounds.max()
    );
    if let Some((low, high)) = report.color_range {
        println!("Color range: {low} - {high}");
    }
    if let Some(srs) = &report.spatial_reference {
        println!("Spatial reference: {srs}");
    }
    if report.skipped_records > 0 {
        println!("Skipped {} unreadable records.", report.skipped_records);
    }
    println!("Successfully wrote {} points.", report.points_written);
}

fn main() -> ExitCode {
    let mut cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    // num_args guarantees at least two entries
    let Some(output) = cli.files.pop() else {
        return ExitCode::from(EXIT_ERROR);
    };
    let options = ConvertOptions {
        inputs: cli.files,
        output,
        scale: cli.scale,
        colorize: cli.color,
    };

    let result = if cli.quiet {
        convert(&options, &mut xyz2las::processing::sink::NoProgress)
    } else {
        let mut observer = print_progress;
        let result = convert(&options, &mut observer);
        eprintln!();
        result
    };

    match result {
        Ok(report) if cli.json => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                ExitCode::from(EXIT_SUCCESS)
            }
            Err(e) => {
                error!("Failed to serialize report: {e}");
                ExitCode::from(EXIT_ERROR)
            }
        },
        Ok(report) => {
            print_summary(&report);
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
