// src/buildlog/mod.rs

//! Build log parsers
//!
//! A container build log is free text. Each handler knows one package
//! manager's output format and turns matching lines into package records,
//! skipping (and logging) anything it does not understand. Handlers never
//! fail on bad input.
//!
//! The set of handlers is closed: [`HandlerKind`] enumerates them and
//! [`Handler`] dispatches to the concrete parser. Which handlers run for an
//! extraction is decided by a [`HandlerRegistry`].

pub mod dnf;
pub mod pip3;
pub mod registry;
pub mod yum;

pub use dnf::DnfHandler;
pub use pip3::{Pip3Handler, PipRequirement, VersionSpecifier};
pub use registry::HandlerRegistry;
pub use yum::{YumHandler, YumPackage};

use serde::Serialize;
use tracing::debug;

/// Capability shared by every build log handler
pub trait LogHandler {
    /// Parse packages installed according to the log text
    fn run(&self, input: &str) -> HandlerResult;
}

/// Known handler types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Yum,
    Pip3,
    Dnf,
}

/// Display name lookup for each handler type
const HANDLER_TABLE: &[(HandlerKind, &str)] = &[
    (HandlerKind::Yum, "yum"),
    (HandlerKind::Pip3, "pip3"),
    (HandlerKind::Dnf, "dnf"),
];

impl HandlerKind {
    /// Lower-cased display name used in extraction output
    pub fn name(&self) -> &'static str {
        HANDLER_TABLE
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Look a handler type up by its display name
    pub fn from_name(name: &str) -> Option<Self> {
        HANDLER_TABLE
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(kind, _)| *kind)
    }

    /// Create a fresh handler instance
    pub fn instantiate(&self) -> Handler {
        match self {
            Self::Yum => Handler::Yum(YumHandler),
            Self::Pip3 => Handler::Pip3(Pip3Handler),
            Self::Dnf => Handler::Dnf(DnfHandler),
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A handler instance, one per extraction run
#[derive(Debug, Clone)]
pub enum Handler {
    Yum(YumHandler),
    Pip3(Pip3Handler),
    Dnf(DnfHandler),
}

impl Handler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Yum(_) => HandlerKind::Yum,
            Self::Pip3(_) => HandlerKind::Pip3,
            Self::Dnf(_) => HandlerKind::Dnf,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

impl LogHandler for Handler {
    fn run(&self, input: &str) -> HandlerResult {
        match self {
            Self::Yum(h) => h.run(input),
            Self::Pip3(h) => h.run(input),
            Self::Dnf(h) => h.run(input),
        }
    }
}

/// Records produced by one handler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HandlerResult {
    Yum(Vec<YumPackage>),
    Pip3(Vec<PipRequirement>),
    /// Serialized as `{}` so the output shape stays stable
    Empty {},
}

impl HandlerResult {
    pub fn len(&self) -> usize {
        match self {
            Self::Yum(packages) => packages.len(),
            Self::Pip3(requirements) => requirements.len(),
            Self::Empty {} => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of one handler in a build log extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerReport {
    pub handler: String,
    pub result: HandlerResult,
}

/// Run every handler in `registry` against the log text
///
/// Each registered entry gets its own instance and its own report, in
/// registration order.
pub fn extract_buildlog(input: &str, registry: &HandlerRegistry) -> Vec<HandlerReport> {
    registry
        .instantiate_all()
        .into_iter()
        .map(|handler| {
            let result = handler.run(input);
            debug!("Handler {} found {} records", handler.name(), result.len());
            HandlerReport {
                handler: handler.name().to_string(),
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(HandlerKind::Yum.name(), "yum");
        assert_eq!(HandlerKind::Pip3.to_string(), "pip3");
        assert_eq!(HandlerKind::from_name("DNF"), Some(HandlerKind::Dnf));
        assert_eq!(HandlerKind::from_name("apt"), None);
    }

    #[test]
    fn test_instantiate_matches_kind() {
        for (kind, _) in HANDLER_TABLE {
            assert_eq!(kind.instantiate().kind(), *kind);
        }
    }

    #[test]
    fn test_empty_result_serializes_as_object() {
        let json = serde_json::to_string(&HandlerResult::Empty {}).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_extract_buildlog_reports_in_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerKind::Pip3);
        registry.register(HandlerKind::Dnf);

        let reports = extract_buildlog("Collecting six==1.16.0\n", &registry);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].handler, "pip3");
        assert_eq!(reports[0].result.len(), 1);
        assert_eq!(reports[1].handler, "dnf");
        assert!(reports[1].result.is_empty());
    }
}
