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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Lookup misses and integrity mismatches are not errors: they surface as `Ok(None)` and `false`
/// respectively. Contract violations by the caller (indexing past a stored count, asking for an
/// absent section, querying the record index for a class that did not come from the archive)
/// panic instead of returning one of these variants.
///
/// # Error Categories
///
/// ## Image Errors
/// - [`Error::InvalidOffset`] - A stored offset does not point into the image
/// - [`Error::Malformed`] - Corrupted or inconsistent archive structure
/// - [`Error::OutOfBounds`] - Attempted to read or write beyond the image
/// - [`Error::NotSupported`] - Wrong magic, version or word size
/// - [`Error::Empty`] - Empty input provided
///
/// ## Build Errors
/// - [`Error::ImageTooLarge`] - The buffer outgrew the configured limit
/// - [`Error::DuplicateClass`] - Two records share a name inside one dictionary
/// - [`Error::UnknownClass`] - A record refers to a class that was never added
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust
/// use classarchive::{Error, SharedArchive};
///
/// match SharedArchive::from_mem(vec![0u8; 8]) {
///     Ok(_) => println!("mapped"),
///     Err(Error::NotSupported) => eprintln!("not an archive"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed archive: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Encountered an offset which does not resolve to a location inside the archive.
    ///
    /// Offsets are relative to the archive base; this is returned when one is past the end of the
    /// image or when an address handed to the translation layer lies outside the mapping.
    #[error("Offset does not resolve inside the archive image")]
    InvalidOffset,

    /// The archive is damaged and could not be interpreted.
    ///
    /// The error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// What was found to be inconsistent
        message: String,
        /// Source file of the check that failed
        file: &'static str,
        /// Source line of the check that failed
        line: u32,
    },

    /// An out of bound access was attempted while reading or writing the image.
    #[error("Access past the end of the archive image")]
    OutOfBounds,

    /// This image is not supported.
    ///
    /// The magic number, format version or machine word size recorded in the header does not
    /// match what this build expects.
    #[error("This archive is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Archive image is empty")]
    Empty,

    /// The archive under construction grew beyond the configured maximum image size.
    ///
    /// The associated value is the size that was requested.
    #[error("Archive image would exceed the maximum size - {0} bytes")]
    ImageTooLarge(usize),

    /// A second record with the same class name was added to one dictionary.
    #[error("Duplicate class in shared dictionary - {0}")]
    DuplicateClass(String),

    /// A record refers to a class offset which does not hold a class descriptor.
    #[error("No archived class at offset - {0}")]
    UnknownClass(u32),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while opening or mapping an archive file.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
