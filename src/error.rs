use thiserror::Error;

/// Structural failures raised while loading a single source.
///
/// These isolate to the source that produced them: the loader records the
/// message and keeps going with whatever else parsed. Cell-level problems
/// (bad numbers, bad dates, unmatched join keys) are recovered in place and
/// never surface here.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A required column is absent from the extract.
    #[error("required column '{column}' missing in {dataset}")]
    MissingColumn { dataset: String, column: String },

    /// Delimiter, header or footer of the source could not be determined.
    #[error("unrecognized layout in {dataset}: {reason}")]
    Format { dataset: String, reason: String },

    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        cause: std::io::Error,
    },

    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("malformed delimited data in {dataset}")]
    Csv {
        dataset: String,
        #[source]
        cause: csv::Error,
    },
}
