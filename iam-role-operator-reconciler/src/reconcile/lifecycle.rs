//! Lifecycle of a desired-state record with respect to its remote role.

use std::fmt;

use crate::types::RoleDefinition;

/// Where a record stands in the finalizer protocol.
///
/// ```text
/// Pending --add finalizer--> Active --deletion requested--> Terminating --remote deleted,
///                                                                         finalizer removed--> Gone
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No finalizer yet; nothing remote may be touched.
    Pending,
    /// Finalizer present, record live: converge the remote role.
    Active,
    /// Deletion requested while the finalizer still guards remote cleanup.
    Terminating,
    /// Finalizer released; the record can be purged.
    Gone,
}

impl LifecycleState {
    pub fn observe(has_finalizer: bool, deletion_requested: bool) -> Self {
        match (has_finalizer, deletion_requested) {
            (false, false) => Self::Pending,
            (true, false) => Self::Active,
            (true, true) => Self::Terminating,
            (false, true) => Self::Gone,
        }
    }

    pub fn of(definition: &RoleDefinition) -> Self {
        Self::observe(definition.has_finalizer, definition.deletion_requested)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Terminating => "Terminating",
            Self::Gone => "Gone",
        };
        f.write_str(name)
    }
}
