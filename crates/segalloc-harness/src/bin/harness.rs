//! CLI entrypoint for the segalloc harness.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use segalloc_core::{Allocator, AllocatorConfig};
use segalloc_harness::scenario::{self, ScenarioKind};
use segalloc_harness::snapshot_digest::SnapshotArtifact;
use segalloc_harness::storm::{self, StormConfig};
use segalloc_harness::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Verification tooling for segalloc.
#[derive(Debug, Parser)]
#[command(name = "segalloc-harness")]
#[command(about = "Scenario, storm, and snapshot harness for segalloc")]
struct Cli {
    /// JSONL log output path (stdout when omitted).
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Forward allocator lifecycle records into the log.
    #[arg(long, global = true)]
    lifecycle: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one named scenario, or all of them.
    Scenario {
        /// `allocate-all`, `fragmented-chain`, `mixed-classes`,
        /// `contiguous-fill`, or `all`.
        #[arg(long, default_value = "all")]
        name: String,
    },
    /// Run a seeded churn storm and verify invariants along the way.
    Storm {
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        #[arg(long, default_value_t = 2_000)]
        ops: usize,
        /// Managed range size in bytes.
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        capacity: u64,
        /// Verify invariants every N steps.
        #[arg(long, default_value_t = 1)]
        check_every: usize,
    },
    /// Populate a fresh allocator and write a digested snapshot artifact.
    Snapshot {
        /// Managed range size in bytes.
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        capacity: u64,
        /// Output path for the snapshot JSON.
        #[arg(long)]
        output: PathBuf,
        /// Re-read the artifact and rebuild an allocator from it.
        #[arg(long)]
        verify: bool,
    },
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid seed `{raw}`: {err}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let writer: Box<dyn Write> = match &cli.log {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    let mut emitter = LogEmitter::new(writer, "cli");
    let config = AllocatorConfig::from_env_overrides();

    let ok = match cli.command {
        Command::Scenario { name } => {
            let kinds = if name.trim() == "all" {
                ScenarioKind::ALL.to_vec()
            } else {
                vec![ScenarioKind::from_name(&name)?]
            };
            let mut all_passed = true;
            for kind in kinds {
                let report = scenario::run(kind, config.clone())?;
                if cli.lifecycle {
                    emitter.emit_lifecycle(&report.lifecycle)?;
                }
                let (level, outcome) = if report.passed {
                    (LogLevel::Info, Outcome::Pass)
                } else {
                    (LogLevel::Error, Outcome::Fail)
                };
                emitter.emit_entry(
                    LogEntry::new("", level, "scenario_complete")
                        .with_scenario(kind.as_str())
                        .with_outcome(outcome)
                        .with_duration_ms(report.duration_ms)
                        .with_details(serde_json::to_value(&report)?),
                )?;
                all_passed &= report.passed;
            }
            all_passed
        }
        Command::Storm {
            seed,
            ops,
            capacity,
            check_every,
        } => {
            let storm_config = StormConfig {
                seed: parse_seed(&seed)?,
                ops,
                capacity,
                check_every,
                ..StormConfig::default()
            };
            match storm::run(&storm_config, config) {
                Ok(report) => {
                    if cli.lifecycle {
                        emitter.emit_lifecycle(&report.lifecycle)?;
                    }
                    emitter.emit_entry(
                        LogEntry::new("", LogLevel::Info, "storm_complete")
                            .with_outcome(Outcome::Pass)
                            .with_details(serde_json::to_value(&report)?),
                    )?;
                    true
                }
                Err(err) => {
                    emitter.emit_entry(
                        LogEntry::new("", LogLevel::Error, "storm_failed")
                            .with_outcome(Outcome::Fail)
                            .with_details(json!({
                                "seed": storm_config.seed,
                                "error": err.to_string(),
                            })),
                    )?;
                    false
                }
            }
        }
        Command::Snapshot {
            capacity,
            output,
            verify,
        } => {
            let mut allocator = Allocator::with_config(capacity, 0, config)?;
            // A few live allocations so the artifact is not trivially empty.
            let mut held = Vec::new();
            for size in [100u64, 5_000, 70_000] {
                if let Some(chain) = allocator.allocate(size, 16) {
                    held.push(chain);
                }
            }
            if !held.is_empty() {
                allocator.deallocate_chain(held.remove(0));
            }

            let artifact = SnapshotArtifact::capture(&allocator)?;
            artifact.write(&output)?;
            let mut details = json!({
                "output": output.display().to_string(),
                "sha256": artifact.sha256,
                "capacity": capacity,
                "outstanding": allocator.outstanding_count(),
            });
            if verify {
                let restored = SnapshotArtifact::read(&output)?.restore()?;
                details["verified_free_bytes"] = json!(restored.free_byte_count());
            }
            if cli.lifecycle {
                emitter.emit_lifecycle(&allocator.drain_lifecycle_logs())?;
            }
            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "snapshot_written")
                    .with_outcome(Outcome::Pass)
                    .with_details(details),
            )?;
            true
        }
    };

    emitter.flush()?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
