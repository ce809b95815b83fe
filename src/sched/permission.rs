// src/sched/permission.rs

//! Batch ownership checks.
//!
//! Every batch belongs to the uid that submitted it. Mutating operations
//! are limited to that owner, plus one configured privileged uid (the
//! queue daemon). The check happens before any state is touched.

use nix::unistd::getuid;

use crate::errors::{GridError, Result};
use crate::store::Uid;

#[derive(Debug, Copy, Clone)]
pub struct PermissionGuard {
    requester: Uid,
    privileged: Option<Uid>,
}

impl PermissionGuard {
    pub fn new(requester: Uid, privileged: Option<Uid>) -> Self {
        Self {
            requester,
            privileged,
        }
    }

    /// Guard for the calling process.
    pub fn current(privileged: Option<Uid>) -> Self {
        Self::new(getuid().as_raw(), privileged)
    }

    pub fn requester(&self) -> Uid {
        self.requester
    }

    pub fn check(&self, owner: Uid) -> Result<()> {
        if self.requester == owner || self.privileged == Some(self.requester) {
            return Ok(());
        }
        Err(GridError::InsufficientPermission(format!(
            "uid {} may not manage a batch owned by uid {owner}",
            self.requester
        )))
    }
}
