//! Reporting of non-fatal problems found while loading or adjusting archives

use std::fmt;

use tracing::warn;

/// Category of a reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// An entry could not be decompressed or decoded and was loaded without a payload
    CorruptEntry,
    /// An entry has no matching slot in the pointer table
    UnindexedEntry,
    /// A remap targets a container name that is not known
    UnsupportedContainerKind,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::CorruptEntry => "corrupt entry",
            DiagnosticKind::UnindexedEntry => "unindexed entry",
            DiagnosticKind::UnsupportedContainerKind => "unsupported container kind",
        };
        f.write_str(name)
    }
}

/// Receiver for problems that do not abort the current operation
pub trait DiagnosticSink {
    /// Record a problem
    fn report(&mut self, kind: DiagnosticKind, message: &str);
}

/// Forwards every report to [`tracing::warn!`]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&mut self, kind: DiagnosticKind, message: &str) {
        warn!(%kind, "{message}");
    }
}

/// Collects reports in order
impl DiagnosticSink for Vec<(DiagnosticKind, String)> {
    fn report(&mut self, kind: DiagnosticKind, message: &str) {
        self.push((kind, message.to_owned()));
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn report(&mut self, kind: DiagnosticKind, message: &str) {
        (**self).report(kind, message);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::diagnostics::{DiagnosticKind, DiagnosticSink, TracingDiagnostics};

    fn forward(mut sink: impl DiagnosticSink, message: &str) {
        sink.report(DiagnosticKind::UnindexedEntry, message);
    }

    #[test]
    fn collect_reports() {
        let mut reports: Vec<(DiagnosticKind, String)> = Vec::new();
        reports.report(DiagnosticKind::CorruptEntry, "entry 3");
        forward(&mut reports, "entry 4");

        assert_eq!(
            reports,
            vec![
                (DiagnosticKind::CorruptEntry, "entry 3".to_owned()),
                (DiagnosticKind::UnindexedEntry, "entry 4".to_owned()),
            ]
        );
    }

    #[traced_test]
    #[test]
    fn tracing_reports() {
        TracingDiagnostics.report(DiagnosticKind::UnsupportedContainerKind, "abc.bin");
        assert!(logs_contain("unsupported container kind"));
        assert!(logs_contain("abc.bin"));
    }
}
