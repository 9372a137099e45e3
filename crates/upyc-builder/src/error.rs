use std::fmt;

use thiserror::Error;
use upyc_common::SourceLocation;
use upyc_ir::LayoutError;

/// Category of build failure.
#[derive(Debug)]
#[non_exhaustive]
pub enum BuildErrorKind {
    /// Source contains syntax the subset rejects.
    UnsupportedConstruct { what: String, suggestion: Option<String> },
    /// An annotation references an unknown type, or inference failed under
    /// strict mode.
    TypeError(String),
    /// Reference to an undefined symbol within the module.
    NameError(String),
    /// Impossible class layout.
    Layout(#[allow(dead_code)] String),
    /// Invariant violation in the compiler itself.
    Internal(String),
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedConstruct { what, suggestion } => {
                write!(f, "unsupported construct: {what}")?;
                if let Some(s) = suggestion {
                    write!(f, " (hint: {s})")?;
                }
                Ok(())
            }
            Self::TypeError(msg) => write!(f, "type error: {msg}"),
            Self::NameError(msg) => write!(f, "name error: {msg}"),
            Self::Layout(msg) => write!(f, "layout error: {msg}"),
            Self::Internal(msg) => write!(f, "internal compiler error: {msg}"),
        }
    }
}

/// A single build diagnostic.
#[derive(Debug, Error)]
pub struct BuildError {
    pub location: Option<SourceLocation>,
    pub kind: BuildErrorKind,
    pub source_path: String,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{}:{}:{}: {}",
                self.source_path,
                loc.line,
                loc.character_offset.get(),
                self.kind
            ),
            None => write!(f, "{}: {}", self.source_path, self.kind),
        }
    }
}

impl BuildError {
    pub fn unsupported(
        source_path: &str,
        location: Option<SourceLocation>,
        what: impl Into<String>,
    ) -> Self {
        Self {
            location,
            kind: BuildErrorKind::UnsupportedConstruct { what: what.into(), suggestion: None },
            source_path: source_path.to_string(),
        }
    }

    pub fn unsupported_with_hint(
        source_path: &str,
        location: Option<SourceLocation>,
        what: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            location,
            kind: BuildErrorKind::UnsupportedConstruct {
                what: what.into(),
                suggestion: Some(suggestion.into()),
            },
            source_path: source_path.to_string(),
        }
    }

    pub fn type_error(
        source_path: &str,
        location: Option<SourceLocation>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            location,
            kind: BuildErrorKind::TypeError(msg.into()),
            source_path: source_path.to_string(),
        }
    }

    pub fn name_error(
        source_path: &str,
        location: Option<SourceLocation>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            location,
            kind: BuildErrorKind::NameError(msg.into()),
            source_path: source_path.to_string(),
        }
    }

    pub fn from_layout(source_path: &str, err: LayoutError) -> Self {
        Self {
            location: None,
            kind: BuildErrorKind::Layout(err.to_string()),
            source_path: source_path.to_string(),
        }
    }
}

/// Accumulates diagnostics for one compilation unit.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<BuildError>,
}

impl Diagnostics {
    pub fn push(&mut self, err: BuildError) {
        self.errors.push(err);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<BuildError> {
        self.errors
    }
}
