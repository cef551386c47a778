//! Lifecycle stages of the regeneration hook.
//!
//! The orchestrator calls the hook as `<stage> <force> <dry_run> <pending_dir>`.
//! [`run`] is the canonical entrypoint shared by the CLI and tests.
//!
//! ## `pre` protocol
//!
//! 1. No current registry: install the baseline verbatim and stop.
//! 2. Snapshot the current registry.
//! 3. Load current + baseline, reconcile, stage the result if it changed.
//! 4. Any failure in 3 (or in the swap): restore the snapshot, fail.
//! 5. Unchanged: discard the snapshot. Changed: swap the staged file in and
//!    keep the snapshot as `services.yml-old`.
//! 6. Copy the auxiliary default into `<pending_dir>/etc/etckeeper/`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use svcregen_core::layout::{self, Layout, DEFAULT_CURRENT_HOST};
use svcregen_core::{Backup, RegistryError, RegistryStore};

use crate::error::{io_err, HookError};
use crate::reconciler::{reconcile, Change, Reconciliation};

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Lifecycle stage requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Pre,
    Post,
}

impl FromStr for Stage {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Stage::Init),
            "pre" => Ok(Stage::Pre),
            "post" => Ok(Stage::Post),
            other => Err(HookError::Usage {
                stage: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::Pre => write!(f, "pre"),
            Stage::Post => write!(f, "post"),
        }
    }
}

/// Arguments handed over by the orchestrator.
///
/// `force` and `dry_run` are accepted for protocol compatibility; the
/// reconciliation does not consult them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: Stage,
    pub force: bool,
    pub dry_run: bool,
    pub pending_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            force: false,
            dry_run: false,
            pending_dir: None,
        }
    }

    pub fn with_pending_dir(mut self, pending_dir: impl Into<PathBuf>) -> Self {
        self.pending_dir = Some(pending_dir.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What `pre` did to the live registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreOutcome {
    /// No registry existed; the baseline was installed as-is.
    Installed,
    /// Reconciliation found nothing to change.
    Unchanged,
    /// The registry was replaced; the previous version is at `-old`.
    Reconciled { changes: Vec<Change> },
}

/// Result of a whole hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Files created by `init` (empty when everything already existed).
    Initialized { created: Vec<PathBuf> },
    Pre {
        registry: PreOutcome,
        staged: PathBuf,
    },
    Post,
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run one hook invocation against `layout`.
///
/// `privileged` is whether the process holds root; only `init` requires it.
pub fn run(
    layout: &Layout,
    invocation: &Invocation,
    privileged: bool,
) -> Result<HookOutcome, HookError> {
    tracing::debug!(
        "stage={} force={} dry_run={}",
        invocation.stage,
        invocation.force,
        invocation.dry_run
    );
    match invocation.stage {
        Stage::Init => Ok(HookOutcome::Initialized {
            created: init(layout, privileged)?,
        }),
        Stage::Pre => {
            let pending = invocation
                .pending_dir
                .as_deref()
                .ok_or(HookError::MissingPendingDir)?;
            let (registry, staged) = pre(layout, pending)?;
            Ok(HookOutcome::Pre { registry, staged })
        }
        Stage::Post => {
            post();
            Ok(HookOutcome::Post)
        }
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// First-time setup. Creates each default only if it is absent.
pub fn init(layout: &Layout, privileged: bool) -> Result<Vec<PathBuf>, HookError> {
    if !privileged {
        return Err(HookError::Privilege);
    }

    let mut created = Vec::new();
    let dir = layout.registry_dir();
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let host = layout.current_host_path();
    if !host.exists() {
        std::fs::write(&host, format!("{DEFAULT_CURRENT_HOST}\n"))
            .map_err(|e| io_err(&host, e))?;
        created.push(host);
    }

    let store = RegistryStore::new(layout.clone());
    if !store.exists() {
        store.install_baseline()?;
        created.push(layout.registry_path());
    }

    let firewall = layout.firewall_path();
    if !firewall.exists() {
        let src = layout.default_firewall_path();
        std::fs::copy(&src, &firewall).map_err(|e| io_err(&src, e))?;
        created.push(firewall);
    }

    let link = layout.skel_media_link();
    if link.symlink_metadata().is_err() {
        link_media_skeleton(&layout.media_dir(), &link)?;
        created.push(link);
    }

    for path in &created {
        tracing::info!("created {}", path.display());
    }
    Ok(created)
}

#[cfg(unix)]
fn link_media_skeleton(media: &Path, link: &Path) -> Result<(), HookError> {
    std::fs::create_dir_all(media).map_err(|e| io_err(media, e))?;
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::os::unix::fs::symlink(media, link).map_err(|e| io_err(link, e))
}

#[cfg(not(unix))]
fn link_media_skeleton(media: &Path, _link: &Path) -> Result<(), HookError> {
    std::fs::create_dir_all(media).map_err(|e| io_err(media, e))
}

// ---------------------------------------------------------------------------
// pre
// ---------------------------------------------------------------------------

/// Reconcile the live registry, then stage the auxiliary default into
/// `pending_dir`. Returns the registry outcome and the staged file path.
pub fn pre(layout: &Layout, pending_dir: &Path) -> Result<(PreOutcome, PathBuf), HookError> {
    let store = RegistryStore::new(layout.clone());
    let outcome = reconcile_registry(&store)?;
    let staged = stage_aux_default(layout, pending_dir)?;
    Ok((outcome, staged))
}

/// Run the snapshot / reconcile / swap-or-restore protocol on `store`.
pub fn reconcile_registry(store: &RegistryStore) -> Result<PreOutcome, HookError> {
    if !store.exists() {
        store.install_baseline()?;
        tracing::info!("installed default services registry");
        return Ok(PreOutcome::Installed);
    }

    let backup = store.snapshot()?;

    let reconciliation = match attempt(store) {
        Ok(reconciliation) => reconciliation,
        Err(e) => return Err(roll_back(store, backup, e)),
    };

    if !reconciliation.changed() {
        store.discard_staged(backup)?;
        return Ok(PreOutcome::Unchanged);
    }

    if let Err((e, backup)) = store.promote(backup) {
        return Err(roll_back(store, backup, e));
    }
    Ok(PreOutcome::Reconciled {
        changes: reconciliation.changes,
    })
}

fn attempt(store: &RegistryStore) -> Result<Reconciliation, RegistryError> {
    let current = store.load_current()?;
    let baseline = store.load_baseline()?;
    let reconciliation = reconcile(&current, &baseline);
    if reconciliation.changed() {
        store.stage_new(&reconciliation.registry)?;
    }
    Ok(reconciliation)
}

fn roll_back(store: &RegistryStore, backup: Backup, source: RegistryError) -> HookError {
    tracing::error!("{source}");
    match store.restore(backup) {
        Ok(()) => {
            tracing::error!("restored {}", store.layout().registry_path().display());
            HookError::RolledBack { source }
        }
        Err(cleanup @ RegistryError::Cleanup { .. }) => {
            tracing::error!(
                "restored {}, but {cleanup}",
                store.layout().registry_path().display()
            );
            HookError::CleanupFailed { source, cleanup }
        }
        Err(restore) => {
            tracing::error!("restore failed: {restore}");
            HookError::RestoreFailed { source, restore }
        }
    }
}

/// Copy the auxiliary default into `<pending_dir>/etc/etckeeper/`.
pub fn stage_aux_default(layout: &Layout, pending_dir: &Path) -> Result<PathBuf, HookError> {
    let dir = layout::aux_pending_dir(pending_dir);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let src = layout.aux_default_path();
    let dst = dir.join(layout::AUX_FILE);
    std::fs::copy(&src, &dst).map_err(|e| io_err(&src, e))?;
    tracing::debug!("staged {} -> {}", src.display(), dst.display());
    Ok(dst)
}

// ---------------------------------------------------------------------------
// post
// ---------------------------------------------------------------------------

/// Nothing to do after the orchestrator commits.
pub fn post() {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASELINE: &str = "nginx:\n  start: new\nmysql: null\n";

    fn setup(current: Option<&str>) -> (TempDir, Layout) {
        let root = TempDir::new().expect("tempdir");
        let layout = Layout::from_root(root.path());
        std::fs::create_dir_all(layout.templates_dir()).unwrap();
        std::fs::create_dir_all(layout.registry_dir()).unwrap();
        std::fs::write(layout.baseline_path(), BASELINE).unwrap();
        std::fs::write(layout.default_firewall_path(), "uPnP: {enabled: false}\n").unwrap();
        std::fs::write(layout.aux_default_path(), "VCS=\"git\"\n").unwrap();
        if let Some(current) = current {
            std::fs::write(layout.registry_path(), current).unwrap();
        }
        (root, layout)
    }

    #[test]
    fn stage_parse() {
        assert_eq!("pre".parse::<Stage>().unwrap(), Stage::Pre);
        let err = "bogus".parse::<Stage>().unwrap_err();
        assert!(matches!(err, HookError::Usage { ref stage } if stage == "bogus"));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn first_run_installs_baseline() {
        let (_root, layout) = setup(None);
        let store = RegistryStore::new(layout.clone());
        assert_eq!(reconcile_registry(&store).unwrap(), PreOutcome::Installed);
        assert_eq!(std::fs::read_to_string(layout.registry_path()).unwrap(), BASELINE);
        assert!(!layout.backup_path().exists());
    }

    #[test]
    fn unchanged_leaves_no_artifacts() {
        let (_root, layout) = setup(Some("nginx:\n  start: new\n"));
        let store = RegistryStore::new(layout.clone());
        assert_eq!(reconcile_registry(&store).unwrap(), PreOutcome::Unchanged);
        assert!(!layout.backup_path().exists());
        assert!(!layout.snapshot_path().exists());
        assert!(!layout.staged_path().exists());
    }

    #[test]
    fn changed_swaps_and_keeps_backup() {
        let original = "nginx:\n  start: old\nmysql:\n  start: x\n";
        let (_root, layout) = setup(Some(original));
        let store = RegistryStore::new(layout.clone());
        let outcome = reconcile_registry(&store).unwrap();
        let PreOutcome::Reconciled { changes } = &outcome else {
            panic!("expected reconciled, got {outcome:?}");
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(std::fs::read_to_string(layout.backup_path()).unwrap(), original);
        let live = store.load_current().unwrap();
        assert_eq!(live.len(), 1);
        assert!(!layout.snapshot_path().exists());
        assert!(!layout.staged_path().exists());
    }

    #[test]
    fn malformed_current_is_restored_byte_identical() {
        let broken = "nginx: [unclosed\n";
        let (_root, layout) = setup(Some(broken));
        let store = RegistryStore::new(layout.clone());
        let err = reconcile_registry(&store).unwrap_err();
        assert!(matches!(err, HookError::RolledBack { .. }), "got: {err}");
        assert!(err.registry_error().unwrap().is_read_error());
        assert_eq!(std::fs::read_to_string(layout.registry_path()).unwrap(), broken);
        assert!(!layout.snapshot_path().exists());
        assert!(!layout.staged_path().exists());
    }

    #[test]
    fn malformed_baseline_rolls_back() {
        let original = "nginx:\n  start: old\n";
        let (_root, layout) = setup(Some(original));
        std::fs::write(layout.baseline_path(), "- not\n- a mapping\n").unwrap();
        let store = RegistryStore::new(layout.clone());
        let err = reconcile_registry(&store).unwrap_err();
        assert!(matches!(err, HookError::RolledBack { .. }));
        assert_eq!(std::fs::read_to_string(layout.registry_path()).unwrap(), original);
    }

    #[test]
    fn promote_failure_rolls_back_byte_identical() {
        let original = "nginx:\n  start: old\n";
        let (_root, layout) = setup(Some(original));
        // A non-empty directory where the backup goes makes the swap fail.
        std::fs::create_dir_all(layout.backup_path().join("blocker")).unwrap();
        let store = RegistryStore::new(layout.clone());

        let err = reconcile_registry(&store).unwrap_err();
        assert!(matches!(err, HookError::RolledBack { .. }), "got: {err}");
        assert!(err.registry_error().unwrap().is_write_error());
        assert_eq!(std::fs::read_to_string(layout.registry_path()).unwrap(), original);
        assert!(!layout.snapshot_path().exists());
        assert!(!layout.staged_path().exists());
    }

    #[test]
    fn stage_failure_restores_registry_and_drops_snapshot() {
        let original = "nginx:\n  start: old\n";
        let (_root, layout) = setup(Some(original));
        // A non-empty directory at the staged path makes staging fail and
        // cannot be removed as a file during cleanup.
        std::fs::create_dir_all(layout.staged_path().join("blocker")).unwrap();
        let store = RegistryStore::new(layout.clone());

        let err = reconcile_registry(&store).unwrap_err();
        assert!(matches!(err, HookError::CleanupFailed { .. }), "got: {err}");
        assert!(err.registry_error().unwrap().is_write_error());
        assert_eq!(std::fs::read_to_string(layout.registry_path()).unwrap(), original);
        assert!(!layout.snapshot_path().exists());
        assert!(!layout.backup_path().exists());
    }

    #[test]
    fn pre_stages_aux_file() {
        let (_root, layout) = setup(Some("nginx:\n  start: new\n"));
        let pending = TempDir::new().unwrap();
        let (outcome, staged) = pre(&layout, pending.path()).unwrap();
        assert_eq!(outcome, PreOutcome::Unchanged);
        assert_eq!(staged, pending.path().join("etc/etckeeper/etckeeper.conf"));
        assert_eq!(std::fs::read_to_string(staged).unwrap(), "VCS=\"git\"\n");
    }

    #[test]
    fn run_pre_without_pending_dir_fails() {
        let (_root, layout) = setup(None);
        let err = run(&layout, &Invocation::new(Stage::Pre), true).unwrap_err();
        assert!(matches!(err, HookError::MissingPendingDir));
        assert!(!layout.registry_path().exists(), "nothing must be touched");
    }

    #[test]
    fn init_requires_privilege() {
        let (_root, layout) = setup(None);
        let err = init(&layout, false).unwrap_err();
        assert!(matches!(err, HookError::Privilege));
        assert!(!layout.current_host_path().exists());
    }

    #[test]
    fn init_is_idempotent() {
        let (_root, layout) = setup(None);
        let created = init(&layout, true).unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(
            std::fs::read_to_string(layout.current_host_path()).unwrap(),
            "yunohost.org\n"
        );
        std::fs::write(layout.current_host_path(), "example.org\n").unwrap();
        let again = init(&layout, true).unwrap();
        assert!(again.is_empty());
        assert_eq!(
            std::fs::read_to_string(layout.current_host_path()).unwrap(),
            "example.org\n"
        );
    }

    #[test]
    fn post_is_noop() {
        let (_root, layout) = setup(None);
        assert_eq!(
            run(&layout, &Invocation::new(Stage::Post), false).unwrap(),
            HookOutcome::Post
        );
    }
}
