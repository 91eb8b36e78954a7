//! Diagnostics collection for importing and cracking runs.
//!
//! This module provides types for collecting and reporting non-fatal
//! findings during a run: ambiguous package discovery, type lookups that
//! found nothing, degraded optimization data. The pipeline never prints;
//! a [`Diagnostics`] value is handed to the cracker and importer and the
//! caller decides what to do with the entries afterwards.
//!
//! # Architecture
//!
//! The [`Diagnostics`] container uses `boxcar::Vec` for lock-free,
//! append-only storage. A single cracking run is strictly sequential, but
//! independent runs in one process may share a sink, so appends stay safe
//! without coordination.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Append-only container for diagnostic entries
//! - [`Diagnostic`] - Individual entry with severity and context
//! - [`DiagnosticSeverity`] - Severity level (Info, Warning, Error)
//! - [`DiagnosticCategory`] - Category of the diagnostic source
//!
//! # Usage Examples
//!
//! ```rust
//! use depscope::diagnostics::{Diagnostics, DiagnosticCategory};
//!
//! let diagnostics = Diagnostics::new();
//!
//! diagnostics.warning(
//!     DiagnosticCategory::Package,
//!     "Multiple .nuspec candidates under /pkg/root, treating as binary dependency",
//! );
//!
//! if diagnostics.has_warnings() {
//!     for entry in diagnostics.iter() {
//!         eprintln!("{}", entry);
//!     }
//! }
//! ```

use std::fmt;

/// Severity level of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSeverity {
    /// Informational message, not indicating a problem.
    ///
    /// Used for noting unusual but valid configurations.
    Info,

    /// Warning about a degraded or ambiguous situation.
    ///
    /// The run continues, but a feature may be unavailable or a fallback
    /// was taken (e.g. a library package demoted to a binary dependency).
    Warning,

    /// Error recorded in a context where the run still continues.
    ///
    /// Fatal conditions surface as [`crate::Error`] instead; this level is
    /// for findings the caller should treat as failures of a sub-step.
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
            DiagnosticSeverity::Error => write!(f, "ERROR"),
        }
    }
}

/// Category indicating the source or type of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// Issues with binary artifact containers.
    ///
    /// Examples: unexpected resource names, degraded optimization data.
    Artifact,

    /// Issues during compilation-unit import or fixup.
    Import,

    /// Issues with cross-unit type lookup.
    ///
    /// Examples: a non-mandatory type search that found nothing.
    Lookup,

    /// Issues while cracking project files.
    ///
    /// Examples: glob patterns matching nothing, stripped host flags.
    Project,

    /// Issues during package discovery and resolution.
    ///
    /// Examples: ambiguous manifest candidates, unresolved dependency ids.
    Package,

    /// Issues with the per-project cache directory.
    Cache,

    /// General findings not fitting other categories.
    General,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Artifact => write!(f, "Artifact"),
            DiagnosticCategory::Import => write!(f, "Import"),
            DiagnosticCategory::Lookup => write!(f, "Lookup"),
            DiagnosticCategory::Project => write!(f, "Project"),
            DiagnosticCategory::Package => write!(f, "Package"),
            DiagnosticCategory::Cache => write!(f, "Cache"),
            DiagnosticCategory::General => write!(f, "General"),
        }
    }
}

/// A single diagnostic entry with context information.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level of this diagnostic.
    pub severity: DiagnosticSeverity,

    /// Category indicating the source of this diagnostic.
    pub category: DiagnosticCategory,

    /// Human-readable description of the finding.
    pub message: String,

    /// Optional path of the file or directory involved.
    pub path: Option<String>,
}

impl Diagnostic {
    /// Creates a new diagnostic entry.
    ///
    /// # Arguments
    ///
    /// * `severity` - Severity level of the diagnostic
    /// * `category` - Category of the diagnostic source
    /// * `message` - Human-readable description
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            path: None,
        }
    }

    /// Adds path information to the diagnostic.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;

        if let Some(path) = &self.path {
            write!(f, " ({})", path)?;
        }

        Ok(())
    }
}

/// Append-only container for collecting diagnostic entries.
///
/// Uses `boxcar::Vec` internally, so entries can be appended through a
/// shared reference and the container can be shared between independent
/// runs without locking.
///
/// # Example
///
/// ```rust
/// use depscope::diagnostics::{Diagnostics, DiagnosticCategory};
///
/// let diagnostics = Diagnostics::new();
/// diagnostics.info(DiagnosticCategory::Project, "glob 'Gen/*.fs' matched nothing");
/// assert_eq!(diagnostics.count(), 1);
/// ```
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Creates a new empty diagnostics container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Adds an informational diagnostic.
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, category, message));
    }

    /// Adds a warning diagnostic.
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Warning,
            category,
            message,
        ));
    }

    /// Adds an error diagnostic.
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Error,
            category,
            message,
        ));
    }

    /// Adds a diagnostic entry directly.
    ///
    /// Use this for diagnostics that need path context.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Returns true if any diagnostics have been collected.
    pub fn has_any(&self) -> bool {
        self.entries.count() > 0
    }

    /// Returns true if any warning-level diagnostics have been collected.
    pub fn has_warnings(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.severity == DiagnosticSeverity::Warning)
    }

    /// Returns true if any error-level diagnostics have been collected.
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns the total number of diagnostics.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Iterates over all collected diagnostics in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.entries.iter().map(|(_, d)| d)
    }
}
