use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, covering every failure this library can return.
///
/// The variants map onto the failure policies of the import/cracking
/// pipeline: configuration problems and corrupt artifacts are always fatal,
/// transient file-lock contention is retried before surfacing, and expected
/// negative outcomes ("not a library package", "type not present") are
/// modeled as normal return values rather than errors.
///
/// # Error Categories
///
/// ## Configuration and Input Errors
/// - [`Error::Configuration`] - Bad project extension, missing file, invalid options
/// - [`Error::TransientIo`] - File-lock contention that outlasted the retry budget
///
/// ## Artifact Parsing Errors
/// - [`Error::Malformed`] - Corrupted or truncated binary artifact
/// - [`Error::OutOfBounds`] - Attempted to read beyond artifact boundaries
/// - [`Error::DuplicateResource`] - More than one signature resource in one artifact
///
/// ## Resolution Errors
/// - [`Error::UnresolvedReference`] - A fixup named a unit absent from the batch
/// - [`Error::TypeNotFound`] - A mandatory anchor type could not be located
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::XmlError`] - Manifest parsing errors from the quick-xml layer
///
/// # Examples
///
/// ```rust,ignore
/// use depscope::{module::BinaryModule, Error};
///
/// match BinaryModule::from_file("lib/net6.0/MyLib.dll".as_ref()) {
///     Ok(module) => println!("loaded {}", module.name()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("corrupt artifact: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration or input.
    ///
    /// Covers unsupported project extensions, missing root files, duplicate
    /// unit registrations and other caller mistakes. Always fatal and never
    /// retried.
    #[error("Configuration error - {0}")]
    Configuration(String),

    /// The binary artifact is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected,
    /// for debugging of corrupt or hand-crafted artifacts.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing an artifact.
    ///
    /// Safety check preventing buffer overruns when reading truncated or
    /// malformed containers.
    #[error("Out of bound read would have occurred!")]
    OutOfBounds,

    /// File-lock contention on the root project file outlasted the retry budget.
    ///
    /// The only designed-for transient failure: reading the main project
    /// file is retried with fixed backoff before this error surfaces.
    #[error("File '{path}' remained locked after {attempts} attempts")]
    TransientIo {
        /// Path of the file that could not be read
        path: String,
        /// Number of read attempts made before giving up
        attempts: u32,
    },

    /// An artifact carries more than one signature-data resource.
    ///
    /// Multiple same-prefixed signature resources are a packaging error;
    /// the importer refuses to disambiguate them.
    #[error("Artifact '{0}' carries more than one signature-data resource")]
    DuplicateResource(String),

    /// A deserialized payload referenced a compilation unit absent from the batch.
    ///
    /// Fixup resolution never substitutes an empty or default reference; a
    /// dangling name is always fatal.
    #[error("Unit '{unit}' references '{referenced}', which is not part of the import batch")]
    UnresolvedReference {
        /// The unit whose payload carried the dangling reference
        unit: String,
        /// The referenced assembly name that could not be resolved
        referenced: String,
    },

    /// A mandatory anchor type was not found in any imported unit.
    ///
    /// Only the fixed anchor set makes a lookup miss fatal; all other
    /// searches report absence through `Option`.
    #[error("Mandatory anchor type '{0}' was not found in any imported unit")]
    TypeNotFound(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors from reading artifacts, manifests, project
    /// files and the cache directory.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the quick-xml crate while parsing a package manifest.
    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
