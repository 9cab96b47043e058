use std::{
    fmt,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Represents a byte span within a source file, with the line and column
/// of its first character. A line of zero means the position is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn to(self, other: SourceSpan) -> Self {
        Self {
            end: other.end,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    SyntaxError,
    NameError,
    TypeError,
    ArityError,
    RangeError,
    AccessError,
    ConstError,
    ImportError,
    ArithmeticError,
    Thrown,
    Runtime,
    Interrupted,
}

impl DiagnosticKind {
    /// Whether a `try/catch` block may intercept this kind.
    pub fn is_catchable(self) -> bool {
        !matches!(self, DiagnosticKind::Interrupted)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::SyntaxError => "SyntaxError",
            DiagnosticKind::NameError => "NameError",
            DiagnosticKind::TypeError => "TypeError",
            DiagnosticKind::ArityError => "ArityError",
            DiagnosticKind::RangeError => "RangeError",
            DiagnosticKind::AccessError => "AccessError",
            DiagnosticKind::ConstError => "ConstError",
            DiagnosticKind::ImportError => "ImportError",
            DiagnosticKind::ArithmeticError => "ArithmeticError",
            DiagnosticKind::Thrown => "Exception",
            DiagnosticKind::Runtime => "RuntimeError",
            DiagnosticKind::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    /// Source file the span points into, when it is not the entry script.
    pub file: Option<PathBuf>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            file: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Attaches `span` unless a more precise one is already recorded.
    pub fn or_span(mut self, span: SourceSpan) -> Self {
        if self.span.map_or(true, |existing| existing.line == 0) {
            self.span = Some(span);
        }
        self
    }

    /// Records the file the error was raised in. The innermost file wins.
    pub fn in_file(mut self, file: &Path) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_path_buf());
        }
        self
    }

    pub fn line(&self) -> u32 {
        self.span.map_or(0, |span| span.line)
    }

    pub fn column(&self) -> u32 {
        self.span.map_or(0, |span| span.column)
    }

    /// Multi-line report used by the CLI and the REPL. `file` names the
    /// entry script and is overridden by a recorded file.
    pub fn render(&self, file: Option<&Path>) -> String {
        let file = self.file.as_deref().or(file);
        let mut out = format!("VG Error: {}", self.kind);
        if self.line() > 0 {
            out.push_str(&format!(" at line {}:{}", self.line(), self.column()));
        }
        if let Some(file) = file {
            out.push_str(&format!(" in file '{}'", file.display()));
        }
        out.push_str(&format!("\n  -> {}", self.message));
        for note in &self.notes {
            out.push_str(&format!("\n  note: {note}"));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if self.line() > 0 {
            write!(f, " (line {}, column {})", self.line(), self.column())?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

#[derive(Debug, Error)]
pub enum VgError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VgError {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        VgError::Diagnostic(Diagnostic::new(kind, message))
    }

    pub fn kind(&self) -> DiagnosticKind {
        match self {
            VgError::Diagnostic(diag) => diag.kind,
            VgError::Io(_) => DiagnosticKind::Runtime,
        }
    }

    pub fn message(&self) -> String {
        match self {
            VgError::Diagnostic(diag) => diag.message.clone(),
            VgError::Io(err) => err.to_string(),
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            VgError::Diagnostic(diag) => diag.line(),
            VgError::Io(_) => 0,
        }
    }

    pub fn column(&self) -> u32 {
        match self {
            VgError::Diagnostic(diag) => diag.column(),
            VgError::Io(_) => 0,
        }
    }

    pub fn with_span(self, span: SourceSpan) -> Self {
        match self {
            VgError::Diagnostic(diag) => VgError::Diagnostic(diag.or_span(span)),
            other => other,
        }
    }

    pub fn in_file(self, file: &Path) -> Self {
        match self {
            VgError::Diagnostic(diag) => VgError::Diagnostic(diag.in_file(file)),
            other => other,
        }
    }

    pub fn with_note(self, note: impl Into<String>) -> Self {
        match self {
            VgError::Diagnostic(diag) => VgError::Diagnostic(diag.with_note(note)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, VgError>;

pub fn error_at(kind: DiagnosticKind, message: impl Into<String>, span: SourceSpan) -> VgError {
    VgError::Diagnostic(Diagnostic::new(kind, message).with_span(span))
}
