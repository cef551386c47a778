//! Human-readable lines printed after a successful invocation.

use colored::Colorize;

use svcregen_reconcile::{Change, HookOutcome, PreOutcome};

pub fn print_outcome(outcome: &HookOutcome) {
    match outcome {
        HookOutcome::Initialized { created } => {
            for path in created {
                println!("{} created {}", "✓".green(), path.display());
            }
        }
        HookOutcome::Pre { registry, .. } => print_pre(registry),
        HookOutcome::Post => {}
    }
}

fn print_pre(outcome: &PreOutcome) {
    match outcome {
        PreOutcome::Installed => println!("{} installed default services registry", "✓".green()),
        PreOutcome::Unchanged => {}
        PreOutcome::Reconciled { changes } => {
            for change in changes {
                println!("  {}  {change}", marker(change));
            }
        }
    }
}

fn marker(change: &Change) -> colored::ColoredString {
    match change {
        Change::Added { .. } => "+".green(),
        Change::Removed { .. } => "-".red(),
        Change::StatusRetracted { .. } | Change::Updated { .. } => "~".yellow(),
    }
}
