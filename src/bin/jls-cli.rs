use clap::{Parser, Subcommand};
use jls::signal::{DataType, Signal, SignalType};
use jls::{Reader, Writer};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jls", version = "1.0.0", about = "The jls signal-log container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic FSR triangle-wave signal into a new file
    Generate {
        output: PathBuf,
        #[arg(long, default_value = "1000000.0")]
        sample_rate: f64,
        #[arg(long, default_value = "1000000")]
        length: u64,
        #[arg(long, default_value = "1000")]
        samples_per_data: u32,
        #[arg(long, default_value = "10")]
        sample_decimate_factor: u32,
        #[arg(long, default_value = "1000")]
        entries_per_summary: u32,
        #[arg(long, default_value = "10")]
        summary_decimate_factor: u32,
    },
    /// Open a file read-only and print its source/signal/track summary
    Profile { input: PathBuf },
    /// Scan chunk headers from the front of the file and print a health log
    Scan { input: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::Generate {
            output,
            sample_rate,
            length,
            samples_per_data,
            sample_decimate_factor,
            entries_per_summary,
            summary_decimate_factor,
        } => {
            let mut w = Writer::create_path(&output)?;
            w.signal_def(Signal {
                signal_id: 1,
                source_id: 0,
                signal_type: SignalType::Fsr,
                data_type: DataType::F32,
                sample_rate,
                samples_per_data,
                sample_decimate_factor,
                entries_per_summary,
                summary_decimate_factor,
                utc_rate_auto: 0,
                name: "triangle".into(),
                si_units: "V".into(),
            })?;

            const PERIOD: u64 = 1000;
            let samples: Vec<f32> = (0..length)
                .map(|i| triangle(i % PERIOD, PERIOD))
                .collect();
            w.fsr_f32(1, 0, &samples)?;
            w.close()?;

            println!(
                "Generated: {}  ({} samples @ {sample_rate} Hz)",
                output.display(),
                length
            );
        }

        Commands::Profile { input } => {
            let file = std::fs::File::open(&input)?;
            let mut r = Reader::open(file)?;

            println!("── jls file ─────────────────────────────────────────────");
            println!("  Path     {}", input.display());
            println!("  Sources  {}", r.sources().len());
            for src in r.sources() {
                println!(
                    "    id={:<4} name={:<16} vendor={:<16} model={}",
                    src.source_id, src.name, src.vendor, src.model
                );
            }
            println!("  Signals  {}", r.signals().len());
            for sig in r.signals() {
                let length = r.fsr_length(sig.signal_id);
                let length_str = match length {
                    Ok(n) => n.to_string(),
                    Err(e) => format!("n/a ({e})"),
                };
                println!(
                    "    id={:<4} type={:?} name={:<16} sample_rate={:<12} fsr_length={}",
                    sig.signal_id, sig.signal_type, sig.name, sig.sample_rate, length_str
                );
            }
        }

        Commands::Scan { input } => {
            let file = std::fs::File::open(&input)?;
            let mut r = Reader::open(file)?;
            let report = r.scan_forward();
            println!("Scan recovered {} chunk(s):", report.chunks.len());
            for c in &report.chunks {
                println!(
                    "  @{:<10} tag=0x{:02x} payload_length={}",
                    c.offset, c.tag, c.payload_length
                );
            }
            if !report.errors.is_empty() {
                println!("  {} error(s) encountered during scan:", report.errors.len());
                for e in &report.errors {
                    println!("    {e}");
                }
            }
        }
    }

    Ok(())
}

fn triangle(phase: u64, period: u64) -> f32 {
    let half = period as f64 / 2.0;
    let x = phase as f64 % period as f64;
    let v = if x < half { x / half } else { 2.0 - x / half };
    (v * 2.0 - 1.0) as f32
}
