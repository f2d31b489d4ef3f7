//! Listener registration and best-effort dispatch.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::core::{IoInvocation, IoListener};
use crate::types::StorableObject;

/// Listeners invoked around table store writes, in registration order.
///
/// Listener errors are logged and never reach the caller.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn IoListener>>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .listeners
            .read()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &names)
            .finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn register(&self, listener: Arc<dyn IoListener>) {
        self.listeners.write().push(listener);
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn IoListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn pre_invoke(&self, invocation: &IoInvocation<'_>) {
        for listener in self.snapshot() {
            if let Err(e) = listener.on_pre_invoke(invocation) {
                warn!(
                    listener = listener.name(),
                    operation = %invocation.operation,
                    error = %e,
                    "pre-invoke listener failed"
                );
            }
        }
    }

    pub(crate) fn post_invoke(&self, invocation: &IoInvocation<'_>, result: &[StorableObject]) {
        for listener in self.snapshot() {
            if let Err(e) = listener.on_post_invoke(invocation, result) {
                warn!(
                    listener = listener.name(),
                    operation = %invocation.operation,
                    error = %e,
                    "post-invoke listener failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::IoOperation;
    use crate::error::HookError;
    use crate::tenant::TenantId;

    struct Failing;

    impl IoListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_pre_invoke(&self, invocation: &IoInvocation<'_>) -> Result<(), HookError> {
            Err(HookError::Failed {
                listener: "failing".to_string(),
                operation: invocation.operation.to_string(),
                message: "boom".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Counting {
        pre: AtomicUsize,
        post: AtomicUsize,
    }

    impl IoListener for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_pre_invoke(&self, _invocation: &IoInvocation<'_>) -> Result<(), HookError> {
            self.pre.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_post_invoke(
            &self,
            _invocation: &IoInvocation<'_>,
            result: &[StorableObject],
        ) -> Result<(), HookError> {
            self.post.fetch_add(result.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let registry = ListenerRegistry::new();
        let counting = Arc::new(Counting::default());
        registry.register(Arc::new(Failing));
        registry.register(counting.clone());

        let tenant = TenantId::new("acme");
        let objects = vec![StorableObject::new("user", "u1")];
        let invocation = IoInvocation {
            operation: IoOperation::Create,
            tenant: &tenant,
            objects: &objects,
        };
        registry.pre_invoke(&invocation);
        registry.post_invoke(&invocation, &objects);

        assert_eq!(registry.len(), 2);
        assert_eq!(counting.pre.load(Ordering::SeqCst), 1);
        assert_eq!(counting.post.load(Ordering::SeqCst), 1);
    }
}
