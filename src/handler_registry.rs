//! Maps the handler identifiers used in a package manifest's `[extensions]` table to concrete
//! [`ExtensionHandler`] implementations.
//!
//! The actual source-to-output transforms (a LESS compiler, a CoffeeScript compiler, ...) are
//! plugins supplied by the embedding application; this crate ships only the handful of built-ins
//! that make sense with no transform at all.

use crate::extension::{ExtensionHandler, PassthroughCssHandler, PassthroughJsHandler, StaticFileHandler};
use std::{collections::BTreeMap, sync::Arc};

/// Resolves a handler id (as written in a package manifest) to an [`ExtensionHandler`].
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ExtensionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// A registry seeded with the built-in, transform-free handlers.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.insert("passthrough-js", Arc::new(PassthroughJsHandler));
        reg.insert("passthrough-css", Arc::new(PassthroughCssHandler));
        reg.insert("static", Arc::new(StaticFileHandler));
        reg
    }

    pub fn insert(&mut self, id: impl Into<String>, handler: Arc<dyn ExtensionHandler>) {
        self.handlers.insert(id.into(), handler);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ExtensionHandler>> {
        self.handlers.get(id).cloned()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
