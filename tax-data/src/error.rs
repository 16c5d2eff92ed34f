use std::fmt;
use std::path::PathBuf;

use tax_core::models::ScaleVariant;
use tax_core::SourceError;
use thiserror::Error;

/// Errors that can occur when reading export dumps.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dump does not have the shape its loader expects.
    #[error("row {row}: {reason}")]
    Layout { row: usize, reason: String },

    /// No scale layout accepted the dump.
    #[error("no scale layout matches: {}", Attempts(.attempts))]
    UnrecognizedLayout {
        attempts: Vec<(ScaleVariant, String)>,
    },

    #[error("no {what} export found for {from_year} down to {floor_year}")]
    MissingData {
        what: String,
        from_year: i32,
        floor_year: i32,
    },

    /// Any of the above, tagged with the file it came from.
    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<ExportError>,
    },
}

struct Attempts<'a>(&'a [(ScaleVariant, String)]);

impl fmt::Display for Attempts<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, (variant, reason)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{variant}: {reason}")?;
        }
        Ok(())
    }
}

impl ExportError {
    pub(crate) fn in_file(
        self,
        path: impl Into<PathBuf>,
    ) -> Self {
        ExportError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }

    fn is_read_failure(&self) -> bool {
        match self {
            ExportError::Io(_) | ExportError::Csv(_) => true,
            ExportError::File { source, .. } => source.is_read_failure(),
            _ => false,
        }
    }
}

impl From<ExportError> for SourceError {
    fn from(err: ExportError) -> Self {
        let (location, inner) = match err {
            ExportError::File { path, source } => (path.display().to_string(), *source),
            other => ("<stream>".to_string(), other),
        };
        let reason = inner.to_string();

        if inner.is_read_failure() {
            SourceError::Unreadable { location, reason }
        } else {
            SourceError::Malformed { location, reason }
        }
    }
}
