//! Human-readable summary of a run, printed to stdout once all phases are done.

use std::io::{self, Write};

use yansi::Paint;

use crate::phase::{Phase, PhaseOutcome, PhaseReport, RunReport};

/// Prints the summary of all phases to stdout.
pub fn print_report(report: &RunReport) {
    let stdout = io::stdout();
    // A closed stdout must not turn a finished run into a failure.
    write_report(&mut stdout.lock(), report).ok();
}

/// Writes the summary of all phases to `out`.
pub fn write_report(out: &mut impl Write, report: &RunReport) -> io::Result<()> {
    if report.phases.is_empty() {
        writeln!(out, "{}", "No phases ran.".bold())?;
        return Ok(());
    }

    for phase in &report.phases {
        writeln!(out)?;
        write_phase(out, phase)?;
    }

    Ok(())
}

fn write_phase(out: &mut impl Write, report: &PhaseReport) -> io::Result<()> {
    let title = format!("## {}", report.phase.as_str().to_uppercase());

    match report.outcome {
        PhaseOutcome::Unsupported => {
            return writeln!(out, "{} {}", title.bold(), "not implemented".yellow());
        }
        PhaseOutcome::Cancelled => {
            writeln!(out, "{} ({} ticks, {})", title.bold(), report.ticks, "CANCELLED".red())?
        }
        PhaseOutcome::Completed => writeln!(out, "{} ({} ticks)", title.bold(), report.ticks)?,
    }

    write!(
        out,
        "  keys: {}; key size: {}; revision: {}",
        report.key_count.bold(),
        report.key_size,
        report.revision.bold().blue()
    )?;
    if report.phase == Phase::Delete {
        write!(out, "; deleted: {}", report.deleted.bold().green())?;
    }
    writeln!(out)?;

    write!(out, "  {} ops", report.attempted)?;
    if report.failures > 0 {
        write!(
            out,
            ", {}",
            format!("{} FAILURES", report.failures).bold().red()
        )?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(report: &RunReport) -> String {
        yansi::disable();
        let mut out = Vec::new();
        write_report(&mut out, report).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn renders_all_outcomes() {
        let report = RunReport {
            phases: vec![
                PhaseReport {
                    phase: Phase::Create,
                    outcome: PhaseOutcome::Completed,
                    ticks: 1,
                    key_count: 5,
                    key_size: 8,
                    attempted: 5,
                    failures: 1,
                    revision: 4,
                    deleted: 0,
                },
                PhaseReport {
                    phase: Phase::Delete,
                    outcome: PhaseOutcome::Cancelled,
                    ticks: 1,
                    key_count: 5,
                    key_size: 8,
                    attempted: 2,
                    failures: 0,
                    revision: 6,
                    deleted: 2,
                },
                PhaseReport {
                    phase: Phase::Compaction,
                    outcome: PhaseOutcome::Unsupported,
                    ticks: 0,
                    key_count: 5,
                    key_size: 8,
                    attempted: 0,
                    failures: 0,
                    revision: 0,
                    deleted: 0,
                },
            ],
        };

        let output = render(&report);

        assert!(output.contains("## CREATE (1 ticks)"), "{output}");
        assert!(output.contains("keys: 5; key size: 8; revision: 4\n"), "{output}");
        assert!(output.contains("5 ops, 1 FAILURES"), "{output}");
        assert!(output.contains("## DELETE (1 ticks, CANCELLED)"), "{output}");
        assert!(output.contains("revision: 6; deleted: 2"), "{output}");
        assert!(output.contains("## COMPACTION not implemented"), "{output}");
    }

    #[test]
    fn renders_empty_run() {
        assert_eq!(render(&RunReport::default()), "No phases ran.\n");
    }
}
