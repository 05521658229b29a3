// src/buildlog/dnf.rs

//! dnf build output handler
//!
//! Not parsed yet. The handler is registered so every extraction reports a
//! `dnf` entry, empty when nothing was found.

use super::{HandlerResult, LogHandler};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct DnfHandler;

impl LogHandler for DnfHandler {
    fn run(&self, _input: &str) -> HandlerResult {
        debug!("dnf output parsing is not implemented, reporting no packages");
        HandlerResult::Empty {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_empty() {
        let result = DnfHandler.run("Installed:\n  bash-5.1.8-6.el9.x86_64\n");
        assert_eq!(result, HandlerResult::Empty {});
        assert!(result.is_empty());
    }
}
