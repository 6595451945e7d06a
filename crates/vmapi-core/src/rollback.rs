//! Compensating actions for a partially completed create.
//!
//! A [`Rollback`] that is dropped without [`Rollback::commit`] still runs its
//! pending actions, on a background task, so an abandoned create does not
//! leave a disk or a defined domain behind.

use crate::vm::VmId;
use std::path::PathBuf;
use std::sync::Arc;
use vmapi_virt::{Domain, HypervisorGateway};

/// Undo step recorded after a create step succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    /// Delete the cloned disk image.
    RemoveDisk(PathBuf),
    /// Power off and undefine a defined domain.
    Undefine(Domain),
}

/// Stack of compensations, unwound newest first.
pub(crate) struct Rollback {
    vm_id: VmId,
    gateway: Arc<dyn HypervisorGateway>,
    actions: Vec<Compensation>,
}

impl Rollback {
    pub(crate) fn new(vm_id: VmId, gateway: Arc<dyn HypervisorGateway>) -> Self {
        Self {
            vm_id,
            gateway,
            actions: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    /// Forget the recorded actions; the create went through.
    pub(crate) fn commit(mut self) {
        self.actions.clear();
    }

    /// Run every recorded action in reverse order. Failures are logged and
    /// do not stop the remaining actions.
    pub(crate) async fn unwind(mut self) {
        // Actions still on the stack when this future is dropped are picked
        // up by `Drop`.
        while let Some(action) = self.actions.pop() {
            compensate(self.vm_id, self.gateway.as_ref(), action).await;
        }
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        let actions = std::mem::take(&mut self.actions);
        let vm_id = self.vm_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                vm_id = %vm_id,
                pending = actions.len(),
                "Create abandoned outside a runtime, rollback skipped"
            );
            return;
        };

        tracing::warn!(
            vm_id = %vm_id,
            pending = actions.len(),
            "Create abandoned, rolling back in background"
        );
        let gateway = Arc::clone(&self.gateway);
        runtime.spawn(async move {
            for action in actions.into_iter().rev() {
                compensate(vm_id, gateway.as_ref(), action).await;
            }
        });
    }
}

async fn compensate(vm_id: VmId, gateway: &dyn HypervisorGateway, action: Compensation) {
    tracing::debug!(vm_id = %vm_id, ?action, "Rolling back");
    match action {
        Compensation::Undefine(domain) => {
            if let Err(e) = gateway.force_stop(&domain).await {
                tracing::warn!(vm_id = %vm_id, error = %e, "Rollback: force stop failed");
            }
            if let Err(e) = gateway.undefine(&domain).await {
                tracing::warn!(vm_id = %vm_id, error = %e, "Rollback: undefine failed");
            }
        }
        Compensation::RemoveDisk(path) => {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    vm_id = %vm_id,
                    path = %path.display(),
                    error = %e,
                    "Rollback: disk removal failed"
                );
            }
        }
    }
}
