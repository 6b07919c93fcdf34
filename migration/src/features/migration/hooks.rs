//! Per-item hooks run by the pipeline
//!
//! Filters decide before the pull whether an item migrates at all. Mappings
//! and then transformers rewrite the pulled item before it is published,
//! each list in registration order.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::mapping::DestinationFinder;
use crate::services::content::ContentType;
use crate::services::errors::MigrationResult;

/// What a hook can see besides the item
pub struct HookContext<'a> {
    pub content_type: ContentType,
    pub finder: &'a dyn DestinationFinder,
    pub cancel: &'a CancellationToken,
}

#[async_trait]
pub trait ContentFilter<I>: Send + Sync {
    /// `false` skips the item
    async fn include(&self, item: &I, context: &HookContext<'_>) -> MigrationResult<bool>;
}

#[async_trait]
pub trait ContentMapping<P>: Send + Sync {
    async fn map(&self, item: &mut P, context: &HookContext<'_>) -> MigrationResult<()>;
}

#[async_trait]
pub trait ContentTransformer<P>: Send + Sync {
    async fn transform(&self, item: &mut P, context: &HookContext<'_>) -> MigrationResult<()>;
}

/// Filter from a plain predicate
pub struct FnFilter<F> {
    predicate: F,
}

impl<F> FnFilter<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<I, F> ContentFilter<I> for FnFilter<F>
where
    I: Sync,
    F: Fn(&I) -> bool + Send + Sync,
{
    async fn include(&self, item: &I, _context: &HookContext<'_>) -> MigrationResult<bool> {
        Ok((self.predicate)(item))
    }
}

/// Hooks of one content type; `I` is the listed item, `P` the pulled one
pub struct ContentHooks<I, P> {
    filters: Vec<Arc<dyn ContentFilter<I>>>,
    mappings: Vec<Arc<dyn ContentMapping<P>>>,
    transformers: Vec<Arc<dyn ContentTransformer<P>>>,
}

impl<I, P> Default for ContentHooks<I, P> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            mappings: Vec::new(),
            transformers: Vec::new(),
        }
    }
}

impl<I, P> Clone for ContentHooks<I, P> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            mappings: self.mappings.clone(),
            transformers: self.transformers.clone(),
        }
    }
}

impl<I, P> ContentHooks<I, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: impl ContentFilter<I> + 'static) -> &mut Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn add_mapping(&mut self, mapping: impl ContentMapping<P> + 'static) -> &mut Self {
        self.mappings.push(Arc::new(mapping));
        self
    }

    pub fn add_transformer(&mut self, transformer: impl ContentTransformer<P> + 'static) -> &mut Self {
        self.transformers.push(Arc::new(transformer));
        self
    }

    /// Every filter must accept the item; stops at the first rejection
    pub async fn include(&self, item: &I, context: &HookContext<'_>) -> MigrationResult<bool> {
        for filter in &self.filters {
            if !filter.include(item, context).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Mappings, then transformers
    pub async fn apply(&self, item: &mut P, context: &HookContext<'_>) -> MigrationResult<()> {
        for mapping in &self.mappings {
            mapping.map(item, context).await?;
        }
        for transformer in &self.transformers {
            transformer.transform(item, context).await?;
        }
        Ok(())
    }
}
