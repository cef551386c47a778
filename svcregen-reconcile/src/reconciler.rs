//! Reconciler — merges a baseline catalog into the live registry.
//!
//! For every service named by the baseline, in baseline order:
//!
//! 1. `null` or empty baseline entry: remove the service if present.
//! 2. Missing (or empty) in current: insert the baseline entry verbatim.
//! 3. Otherwise:
//!    a. detach `conffiles` from the current entry,
//!    b. drop `status` if the baseline no longer carries it,
//!    c. if the entry still differs from the baseline, shallow-merge the
//!       baseline fields over it,
//!    d. reattach `conffiles` unless it was empty.
//!
//! Services absent from the baseline are never looked at.

use std::fmt;

use svcregen_core::types::{
    BaselineRegistry, ServiceEntry, ServiceName, ServiceRegistry, STATUS_KEY,
};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One decision taken for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Service was missing or empty and the baseline entry was inserted.
    Added { service: ServiceName },
    /// Baseline marked the service for removal.
    Removed { service: ServiceName },
    /// Baseline no longer exposes `status`; the field was dropped.
    StatusRetracted { service: ServiceName },
    /// Entry differed from the baseline and was shallow-merged.
    ///
    /// `fields` lists the baseline fields whose value actually changed; it is
    /// empty when only administrator-added fields made the entry differ.
    Updated {
        service: ServiceName,
        fields: Vec<String>,
    },
}

impl Change {
    pub fn service(&self) -> &ServiceName {
        match self {
            Change::Added { service }
            | Change::Removed { service }
            | Change::StatusRetracted { service }
            | Change::Updated { service, .. } => service,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Added { service } => write!(f, "adding '{service}' to services"),
            Change::Removed { service } => write!(f, "removing '{service}' from services"),
            Change::StatusRetracted { service } => {
                write!(f, "update '{service}' service status access")
            }
            Change::Updated { service, fields } if fields.is_empty() => {
                write!(f, "update '{service}' service")
            }
            Change::Updated { service, fields } => {
                write!(f, "update '{service}' service ({})", fields.join(", "))
            }
        }
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The merged registry; identical to the input when nothing changed.
    pub registry: ServiceRegistry,
    /// Every decision that altered the registry, in baseline order.
    pub changes: Vec<Change>,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

/// Reconcile `current` against `baseline` without touching either input.
pub fn reconcile(current: &ServiceRegistry, baseline: &BaselineRegistry) -> Reconciliation {
    let mut registry = current.clone();
    let mut changes = Vec::new();

    for (service, conf) in baseline {
        let Some(conf) = conf.as_ref().filter(|c| !c.is_empty()) else {
            if registry.shift_remove(service).is_some() {
                tracing::info!("removing '{service}' from services");
                changes.push(Change::Removed {
                    service: service.clone(),
                });
            } else {
                tracing::debug!("'{service}' already absent");
            }
            continue;
        };

        if let Some(entry) = registry.get_mut(service).filter(|e| !e.is_empty()) {
            update_entry(service, entry, conf, &mut changes);
            continue;
        }

        tracing::info!("adding '{service}' to services");
        registry.insert(service.clone(), conf.clone());
        changes.push(Change::Added {
            service: service.clone(),
        });
    }

    Reconciliation { registry, changes }
}

fn update_entry(
    service: &ServiceName,
    entry: &mut ServiceEntry,
    conf: &ServiceEntry,
    changes: &mut Vec<Change>,
) {
    let conffiles = entry.take_conffiles();

    if !conf.contains_key(STATUS_KEY) && entry.remove(STATUS_KEY).is_some() {
        tracing::info!("update '{service}' service status access");
        changes.push(Change::StatusRetracted {
            service: service.clone(),
        });
    }

    if *entry != *conf {
        let fields = entry.differing_fields(conf);
        tracing::info!("update '{service}' service");
        entry.merge_from(conf);
        changes.push(Change::Updated {
            service: service.clone(),
            fields,
        });
    } else {
        tracing::debug!("'{service}' matches baseline");
    }

    entry.set_conffiles(conffiles);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
