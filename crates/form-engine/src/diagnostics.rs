//! Developer-facing diagnostics.
//!
//! Configuration problems never fail the pipeline. They are reported to a
//! [`DiagnosticsSink`] injected into the engine and resolved by a fallback
//! (claim dropped, zero rows, default expression value).

use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Claim,
    RowBinding,
    Expression,
    UnknownComponent,
    NonConvergence,
    DataPath,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub page: Option<String>,
    pub component: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            page: None,
            component: None,
            message: message.into(),
        }
    }

    pub fn on_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn on_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}]", self.kind)?;
        if let Some(page) = &self.page {
            write!(f, " page '{page}'")?;
        }
        if let Some(component) = &self.component {
            write!(f, " component '{component}'")?;
        }
        write!(f, ": {}", self.message)
    }
}

pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `log::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        log::warn!(target: "form_engine::diagnostics", "{diagnostic}");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Keeps diagnostics in memory, also logging them at debug level.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|diagnostic| diagnostic.kind == kind)
            .collect()
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        log::debug!(target: "form_engine::diagnostics", "{diagnostic}");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for std::sync::Arc<T> {
    fn report(&self, diagnostic: Diagnostic) {
        (**self).report(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_and_drains() {
        let sink = CollectingSink::new();
        sink.report(Diagnostic::new(DiagnosticKind::Claim, "child 'x' not found").on_page("P1"));
        sink.report(Diagnostic::new(DiagnosticKind::Expression, "bad").on_component("a"));
        assert_eq!(sink.of_kind(DiagnosticKind::Claim).len(), 1);
        assert_eq!(
            sink.entries()[0].to_string(),
            "[Claim] page 'P1': child 'x' not found"
        );
        assert_eq!(sink.take().len(), 2);
        assert!(sink.entries().is_empty());
    }
}
