use thiserror::Error;

macro_rules! structural_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Structural {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Structural {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the failure modes of SSA construction over a procedure's control flow
/// graph. There is no local recovery for any of them: the driver that owns the procedure
/// decides whether to rebuild the analysis state and restart from the dominator pass (for
/// example after switch recovery mutates the CFG).
///
/// # Error Categories
///
/// - [`Error::Structural`] - The CFG violates a structural assumption (most commonly a
///   predecessor or successor block that the block indexer has never seen)
/// - [`Error::Invariant`] - An internal engine invariant was violated (most commonly a
///   definition-stack pop with no matching push)
/// - [`Error::Empty`] - An empty CFG was handed to the engine
///
/// # Examples
///
/// ```rust,ignore
/// use retroscope::{analysis::DataFlow, Error};
///
/// let mut df = DataFlow::new();
/// match df.dominators(&proc) {
///     Ok(()) => {}
///     Err(Error::Structural { message, file, line }) => {
///         eprintln!("bad CFG: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("analysis failed: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The control flow graph violates a structural assumption.
    ///
    /// This error occurs when a block referenced by an edge has no index in the
    /// block indexer, which indicates the CFG was mutated after indexing (or was
    /// never indexed). The message names the offending block. The error includes
    /// the source location where the violation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was violated
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Structural - {file}:{line}: {message}")]
    Structural {
        /// The message to be printed for the Structural error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An internal engine invariant was violated.
    ///
    /// The canonical case is popping a definition stack that has no entry for the
    /// defined location, which means a prior push was missed and the rename state
    /// is unbalanced. The pass is aborted; the partially renamed procedure must be
    /// rebuilt from the dominator pass.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invariant - {file}:{line}: {message}")]
    Invariant {
        /// The message to be printed for the Invariant error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided CFG was empty.
    ///
    /// This error occurs when a procedure with no basic blocks (or no designated
    /// entry block) is handed to the engine.
    #[error("Provided CFG was empty")]
    Empty,

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories.
    #[error("{0}")]
    Error(String),
}
