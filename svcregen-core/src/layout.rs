//! On-disk layout of the hook.
//!
//! ```text
//! <root>/
//!   etc/yunohost/
//!     services.yml          (current registry)
//!     services.yml-old      (pre-reconciliation backup, kept for operators)
//!     services.yml-tmp      (snapshot, only during a run)
//!     services.yml-new      (staged result, only during a run)
//!     firewall.yml
//!     current_host
//!   usr/share/yunohost/templates/yunohost/
//!     services.yml          (baseline)
//!     firewall.yml
//!     etckeeper.conf
//! ```
//!
//! Every path is derived from a [`Layout`], so tests point it at a `TempDir`
//! and production uses `/`.

use std::path::{Path, PathBuf};

pub const REGISTRY_FILE: &str = "services.yml";
pub const FIREWALL_FILE: &str = "firewall.yml";
pub const CURRENT_HOST_FILE: &str = "current_host";
pub const DEFAULT_CURRENT_HOST: &str = "yunohost.org";

pub const BACKUP_SUFFIX: &str = "-old";
pub const SNAPSHOT_SUFFIX: &str = "-tmp";
pub const STAGED_SUFFIX: &str = "-new";
pub const WRITE_TMP_SUFFIX: &str = ".svcregen.tmp";

/// Auxiliary default staged into the pending directory on `pre`.
pub const AUX_FILE: &str = "etckeeper.conf";
/// Sub-path under `<pending>/etc/` receiving [`AUX_FILE`].
pub const AUX_SUBPATH: &str = "etckeeper";

/// Environment variable overriding the filesystem root.
pub const ROOT_ENV: &str = "SVCREGEN_ROOT";
/// Environment variable overriding the templates directory.
pub const TEMPLATES_ENV: &str = "SVCREGEN_TEMPLATES";

/// Resolved set of directories the hook reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    templates: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::from_root("/")
    }
}

impl Layout {
    /// Derive every path from `root`; templates live under
    /// `<root>/usr/share/yunohost/templates/yunohost`.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let templates = root
            .join("usr")
            .join("share")
            .join("yunohost")
            .join("templates")
            .join("yunohost");
        Self { root, templates }
    }

    /// Override the templates directory.
    pub fn with_templates(mut self, templates: impl Into<PathBuf>) -> Self {
        self.templates = templates.into();
        self
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates
    }

    /// `<root>/etc/yunohost/`
    pub fn registry_dir(&self) -> PathBuf {
        self.root.join("etc").join("yunohost")
    }

    /// `<root>/etc/yunohost/services.yml`
    pub fn registry_path(&self) -> PathBuf {
        self.registry_dir().join(REGISTRY_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.registry_path(), BACKUP_SUFFIX)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        sibling(&self.registry_path(), SNAPSHOT_SUFFIX)
    }

    pub fn staged_path(&self) -> PathBuf {
        sibling(&self.registry_path(), STAGED_SUFFIX)
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.templates.join(REGISTRY_FILE)
    }

    pub fn default_firewall_path(&self) -> PathBuf {
        self.templates.join(FIREWALL_FILE)
    }

    pub fn firewall_path(&self) -> PathBuf {
        self.registry_dir().join(FIREWALL_FILE)
    }

    pub fn current_host_path(&self) -> PathBuf {
        self.registry_dir().join(CURRENT_HOST_FILE)
    }

    pub fn aux_default_path(&self) -> PathBuf {
        self.templates.join(AUX_FILE)
    }

    /// `<root>/media`
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// `<root>/etc/skel/media`
    pub fn skel_media_link(&self) -> PathBuf {
        self.root.join("etc").join("skel").join("media")
    }
}

/// `<pending>/etc/etckeeper/`
pub fn aux_pending_dir(pending: &Path) -> PathBuf {
    pending.join("etc").join(AUX_SUBPATH)
}

/// Temp sibling used by the atomic write primitive.
pub fn write_tmp_path(target: &Path) -> PathBuf {
    sibling(target, WRITE_TMP_SUFFIX)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
