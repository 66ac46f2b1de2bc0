//! Error types for the import/export pipeline.
//!
//! Block-level constraint failures are `ValidationError`s carrying the field
//! they apply to; the tree builder attaches the originating row number and
//! everything surfaces to callers as an `ImportError`.

use thiserror::Error;

/// A single block or cell constraint failure, attributed to a field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach the 1-based data-row number this failure originated from.
    pub fn at_row(self, row_num: usize) -> ImportError {
        ImportError::RowValidation {
            row_num,
            field: self.field,
            message: self.message,
        }
    }
}

/// Import operation errors.
///
/// Any of these aborts the whole import; the surrounding transaction rolls
/// the store back to its pre-import state. Row numbers are 1-based data-row
/// positions matching the source file (the header row is not counted).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// File structurally unreadable: bad encoding, corrupt workbook, missing
    /// header row.
    #[error("failed to parse file: {0}")]
    Parse(String),

    /// A single row failed a schema or codec constraint.
    #[error("row {row_num}: {field}: {message}")]
    RowValidation {
        row_num: usize,
        field: String,
        message: String,
    },

    /// A parent, related page, translation counterpart or button target
    /// could not be resolved.
    #[error("row {row_num}: {message}")]
    Reference { row_num: usize, message: String },

    /// The store rejected an operation.
    #[error("store error: {0}")]
    Store(String),
}

impl ImportError {
    pub fn reference(row_num: usize, message: impl Into<String>) -> Self {
        ImportError::Reference {
            row_num,
            message: message.into(),
        }
    }

    /// The data-row number this error is attributed to, where applicable.
    pub fn row_num(&self) -> Option<usize> {
        match self {
            ImportError::Parse(_) | ImportError::Store(_) => None,
            ImportError::RowValidation { row_num, .. }
            | ImportError::Reference { row_num, .. } => Some(*row_num),
        }
    }

    /// Whether the failure is attributable to the uploaded file rather than
    /// the store.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, ImportError::Store(_))
    }
}

/// Export operation errors. Exports never fail on valid store input; these
/// only carry writer-side failures.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
