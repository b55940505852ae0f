use thiserror::Error;

/// Failures while reading site tables or building and writing EcoSIM datasets.
///
/// Field-level parse problems never surface here: parsers return `Option` and loaders
/// drop unusable rows. These variants cover source-level failures, dataset shape problems
/// and the array-file backend.
#[derive(Error, Debug)]
pub enum EcosimError {
    /// Reanalysis fields that cannot be converted or warmed
    #[error("Reanalysis data unusable: {0}")]
    Reanalysis(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The delimited table itself is malformed, as opposed to a single unusable row
    #[error("Could not read tabular source: {0}")]
    Csv(#[from] csv::Error),
    #[error("Variable {variable} has shape {actual:?} but dimensions {dimensions:?} require {expected:?}")]
    Shape {
        variable: String,
        dimensions: Vec<String>,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Variable {variable} refers to unknown dimension {dimension}")]
    UnknownDimension { variable: String, dimension: String },
    #[error("A {kind} named {name} already exists in the dataset")]
    DuplicateName { kind: &'static str, name: String },
    #[error("Soil profile for {site} has no layers")]
    EmptyProfile { site: String },
    #[error("Soil layer depths must be strictly increasing, layer {index} is at {depth} m")]
    NonIncreasingDepth { index: usize, depth: f64 },
    /// The requested writer backend was not compiled in
    #[error("Array-file backend `{0}` is not available in this build. Rebuild with the `{0}` feature enabled")]
    BackendUnavailable(String),
    #[error("Array-file backend error: {0}")]
    Backend(String),
    /// A finished dataset is missing a variable, dimension, unit or fill value its file kind requires
    #[error("Dataset does not satisfy the {schema} schema: {details}")]
    SchemaViolation { schema: String, details: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result of table loading, dataset assembly and file writing.
pub type EcosimResult<T> = Result<T, EcosimError>;
