use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};
use venvwrap_domain::{EnvironmentDelta, VirtualenvDescriptor};

use super::create::create_if_missing;
use super::differ::EnvironmentDiffer;
use super::resolver::VirtualenvResolver;
use crate::context::ExecutionContext;
use crate::error::VenvError;

/// Activation deltas keyed by the raw identifier they were computed for.
///
/// Entries are never invalidated: the first delta computed for an identifier
/// is served for the rest of the cache's life, even if the virtualenv changes
/// on disk afterwards. Build one per process and share it.
#[derive(Debug, Default)]
pub struct EnvCache {
    entries: Mutex<HashMap<String, EnvironmentDelta>>,
}

impl EnvCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<EnvironmentDelta> {
        self.lock().get(identifier).cloned()
    }

    /// Stores `delta` unless another caller got there first; returns whichever
    /// delta is cached afterwards.
    pub fn insert_first(&self, identifier: &str, delta: EnvironmentDelta) -> EnvironmentDelta {
        self.lock()
            .entry(identifier.to_string())
            .or_insert(delta)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, EnvironmentDelta>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolve → ensure exists → diff, memoised per identifier.
///
/// The cache lock is never held across external commands, so two callers
/// asking for the same new identifier at once may both create and diff; the
/// first to finish wins the cache slot.
#[derive(Debug, Clone)]
pub struct VirtualenvManager {
    resolver: VirtualenvResolver,
    differ: EnvironmentDiffer,
    cache: Arc<EnvCache>,
}

impl VirtualenvManager {
    pub fn new(cache: Arc<EnvCache>) -> Self {
        Self::with_resolver(VirtualenvResolver::default(), cache)
    }

    pub fn with_resolver(resolver: VirtualenvResolver, cache: Arc<EnvCache>) -> Self {
        Self {
            resolver,
            differ: EnvironmentDiffer,
            cache,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &EnvCache {
        &self.cache
    }

    /// Resolves `identifier` without touching the filesystem beyond the
    /// strategy checks.
    ///
    /// # Errors
    /// See [`VirtualenvResolver::resolve`].
    pub fn describe(
        &self,
        identifier: &str,
        ctx: &ExecutionContext,
    ) -> Result<VirtualenvDescriptor, VenvError> {
        self.resolver.resolve(identifier, ctx)
    }

    /// The variables a wrapped unit of work needs to run inside the
    /// virtualenv named by `identifier`.
    ///
    /// # Errors
    /// Propagates resolution, creation, capture, PATH and cancellation
    /// failures unchanged; nothing is retried and failures are not cached.
    pub fn environment_for(
        &self,
        identifier: &str,
        ctx: &ExecutionContext,
    ) -> Result<EnvironmentDelta, VenvError> {
        if let Some(cached) = self.cache.get(identifier) {
            debug!(%identifier, "reusing cached activation delta");
            return Ok(cached);
        }
        let descriptor = self.resolver.resolve(identifier, ctx)?;
        if create_if_missing(&descriptor, ctx)? {
            info!(path = %descriptor.virtualenv_path(), "virtualenv ready");
        }
        let delta = self.differ.diff(&descriptor, ctx)?;
        Ok(self.cache.insert_first(identifier, delta))
    }
}
