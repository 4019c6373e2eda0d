//! Operator-visible warnings.
//!
//! Lookups that degrade instead of failing (an unknown flag category, a flag
//! pattern that matches nothing) report here. The sink is injected into the
//! engines so the transport is the embedding's choice.

use std::fmt;
use std::sync::Mutex;

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    UnknownCategory { category: String, known: Vec<String> },
    UnmatchedPattern { term: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::UnknownCategory { category, known } => {
                write!(f, "{} is not a valid category, use one of [{}]", category, known.join(", "))
            }
            Diagnostic::UnmatchedPattern { term } => write!(f, "no match for pattern {}", term),
        }
    }
}

pub trait Diagnostics {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::UnknownCategory { category, .. } => {
                warn!(%category, "{}", diagnostic)
            }
            Diagnostic::UnmatchedPattern { term } => warn!(%term, "{}", diagnostic),
        }
    }
}

/// Keeps diagnostics in memory so they can be inspected afterwards.
#[derive(Debug, Default)]
pub struct CollectedDiagnostics {
    collected: Mutex<Vec<Diagnostic>>,
}

impl CollectedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn take(&self) -> Vec<Diagnostic> {
        match self.collected.lock() {
            Ok(mut collected) => std::mem::take(&mut *collected),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
    pub fn len(&self) -> usize {
        self.collected.lock().map(|c| c.len()).unwrap_or_else(|p| p.into_inner().len())
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Diagnostics for CollectedDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match self.collected.lock() {
            Ok(mut collected) => collected.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
