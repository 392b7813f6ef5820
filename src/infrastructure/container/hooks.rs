use super::types::Instance;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Initialization callback: receives the definition name and the instance,
/// returns the instance to continue with (possibly a replacement).
pub type HookFn = Arc<dyn Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync>;

/// A pair of optional interceptors run around every construction.
#[derive(Clone, Default)]
pub struct Hook {
    on_pre_initialization: Option<HookFn>,
    on_post_initialization: Option<HookFn>,
}

impl Hook {
    pub fn new<P, Q>(pre: P, post: Q) -> Self
    where
        P: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
        Q: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            on_pre_initialization: Some(Arc::new(pre)),
            on_post_initialization: Some(Arc::new(post)),
        }
    }

    /// Hook that only runs before self-initialization.
    pub fn pre_initialization<F>(hook: F) -> Self
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            on_pre_initialization: Some(Arc::new(hook)),
            on_post_initialization: None,
        }
    }

    /// Hook that only runs after self-initialization.
    pub fn post_initialization<F>(hook: F) -> Self
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            on_pre_initialization: None,
            on_post_initialization: Some(Arc::new(hook)),
        }
    }

    pub fn on_pre_initialization(&self) -> Option<&HookFn> {
        self.on_pre_initialization.as_ref()
    }

    pub fn on_post_initialization(&self) -> Option<&HookFn> {
        self.on_post_initialization.as_ref()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("pre", &self.on_pre_initialization.is_some())
            .field("post", &self.on_post_initialization.is_some())
            .finish()
    }
}

/// Ordered interceptor chain. Invocation order is registration order.
#[derive(Default)]
pub struct Hooks {
    hooks: RwLock<Vec<Hook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hook: Hook) {
        self.hooks.write().push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Copy of the chain, so a pipeline run never holds the lock while
    /// calling out.
    pub fn snapshot(&self) -> Vec<Hook> {
        self.hooks.read().clone()
    }
}
