//! Observer hooks around table store calls.

use std::fmt;

use crate::error::HookError;
use crate::tenant::TenantId;
use crate::types::StorableObject;

/// The store operation a hook is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOperation {
    /// Single create.
    Create,
    /// Single partial update.
    Update,
    /// Single full replace.
    Overwrite,
    /// Single delete.
    Delete,
    /// Batch create.
    CreateAll,
    /// Batch update.
    UpdateAll,
    /// Batch delete.
    DeleteAll,
}

impl IoOperation {
    /// Returns the operation name as passed to listeners.
    pub fn as_str(&self) -> &'static str {
        match self {
            IoOperation::Create => "create",
            IoOperation::Update => "update",
            IoOperation::Overwrite => "overwrite",
            IoOperation::Delete => "delete",
            IoOperation::CreateAll => "createAll",
            IoOperation::UpdateAll => "updateAll",
            IoOperation::DeleteAll => "deleteAll",
        }
    }

    /// Returns `true` for batch operations.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            IoOperation::CreateAll | IoOperation::UpdateAll | IoOperation::DeleteAll
        )
    }
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The arguments of one store call.
#[derive(Debug, Clone, Copy)]
pub struct IoInvocation<'a> {
    /// The invoked operation.
    pub operation: IoOperation,
    /// The tenant the call is scoped to.
    pub tenant: &'a TenantId,
    /// The objects passed to the store.
    pub objects: &'a [StorableObject],
}

/// Observer of table store calls.
///
/// `on_pre_invoke` runs immediately before the store call and
/// `on_post_invoke` immediately after it, with the written objects as the
/// result. Listeners are best-effort: errors are logged and swallowed.
pub trait IoListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called before the store call.
    fn on_pre_invoke(&self, _invocation: &IoInvocation<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after the store call with its result.
    fn on_post_invoke(
        &self,
        _invocation: &IoInvocation<'_>,
        _result: &[StorableObject],
    ) -> Result<(), HookError> {
        Ok(())
    }
}
