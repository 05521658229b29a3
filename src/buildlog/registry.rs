// src/buildlog/registry.rs

//! Handler registry
//!
//! A [`HandlerRegistry`] is an ordered list of handler types. Registering a
//! type twice is allowed and produces two independent dispatches.
//!
//! A process-wide registry exists for callers that do not thread one
//! through. It is populated with the default handlers on first use.
//! [`ScopedRegistry`] swaps its contents and restores them on drop so tests
//! stay isolated.

use super::{Handler, HandlerKind};
use std::sync::{LazyLock, PoisonError, RwLock};

/// Ordered collection of handler types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerKind>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler
    pub fn with_default_handlers() -> Self {
        Self {
            handlers: vec![HandlerKind::Yum, HandlerKind::Pip3, HandlerKind::Dnf],
        }
    }

    /// Append a handler type; duplicates are kept
    pub fn register(&mut self, kind: HandlerKind) {
        self.handlers.push(kind);
    }

    /// Display names in registration order
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(HandlerKind::name).collect()
    }

    /// One fresh handler per registered entry
    pub fn instantiate_all(&self) -> Vec<Handler> {
        self.handlers.iter().map(HandlerKind::instantiate).collect()
    }

    pub fn kinds(&self) -> &[HandlerKind] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

static GLOBAL: LazyLock<RwLock<HandlerRegistry>> =
    LazyLock::new(|| RwLock::new(HandlerRegistry::with_default_handlers()));

/// Snapshot of the process-wide registry
pub fn global_registry() -> HandlerRegistry {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Register a handler type in the process-wide registry
pub fn register_global(kind: HandlerKind) {
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(kind);
}

/// Replace the process-wide registry, returning the previous contents
pub fn replace_global(registry: HandlerRegistry) -> HandlerRegistry {
    let mut guard = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *guard, registry)
}

/// Swaps the process-wide registry for the guard's lifetime
#[derive(Debug)]
pub struct ScopedRegistry {
    saved: Option<HandlerRegistry>,
}

impl ScopedRegistry {
    /// Install `registry` globally until the guard is dropped
    pub fn install(registry: HandlerRegistry) -> Self {
        Self {
            saved: Some(replace_global(registry)),
        }
    }

    /// Install an empty registry until the guard is dropped
    pub fn empty() -> Self {
        Self::install(HandlerRegistry::new())
    }
}

impl Drop for ScopedRegistry {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            replace_global(saved);
        }
    }
}
