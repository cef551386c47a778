//! svcregen — service registry regeneration hook.
//!
//! # Usage
//!
//! ```text
//! svcregen init
//! svcregen pre <force> <dry_run> <pending_dir>
//! svcregen post <force> <dry_run> <pending_dir>
//! ```
//!
//! `--root` / `SVCREGEN_ROOT` relocates every path under a prefix;
//! `--templates` / `SVCREGEN_TEMPLATES` points at another templates dir.

mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use svcregen_core::layout::{Layout, ROOT_ENV, TEMPLATES_ENV};
use svcregen_reconcile::{hook, Invocation, Stage};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "svcregen",
    version,
    about = "Regenerate the services registry during a configuration transaction",
    long_about = None,
)]
struct Cli {
    /// Lifecycle stage: init | pre | post.
    stage: String,

    /// Force flag from the orchestrator (accepted, unused).
    force: Option<String>,

    /// Dry-run flag from the orchestrator (accepted, unused).
    dry_run: Option<String>,

    /// Pending directory where staged files are placed (required for `pre`).
    pending_dir: Option<PathBuf>,

    /// Filesystem root every path is resolved under.
    #[arg(long, env = ROOT_ENV, default_value = "/")]
    root: PathBuf,

    /// Directory holding the baseline registry and bundled defaults.
    #[arg(long, env = TEMPLATES_ENV)]
    templates: Option<PathBuf>,
}

impl Cli {
    fn layout(&self) -> Layout {
        let layout = Layout::from_root(&self.root);
        match &self.templates {
            Some(templates) => layout.with_templates(templates),
            None => layout,
        }
    }

    fn invocation(&self, stage: Stage) -> Invocation {
        Invocation {
            stage,
            force: flag(self.force.as_deref()),
            dry_run: flag(self.dry_run.as_deref()),
            pending_dir: self.pending_dir.clone(),
        }
    }
}

/// Orchestrator flags arrive as `0` / `1`.
fn flag(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let stage: Stage = cli.stage.parse()?;
    let layout = cli.layout();
    let privileged = nix::unistd::geteuid().is_root();

    let outcome = hook::run(&layout, &cli.invocation(stage), privileged)
        .with_context(|| format!("{stage} stage failed"))?;
    output::print_outcome(&outcome);
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
