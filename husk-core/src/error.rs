//! Error types for the interpreter.

use std::path::PathBuf;

/// Unified error type for this crate; wraps an [`ErrorKind`].
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the kind of this error.
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the exit code this error surfaces as when it reaches a command
    /// boundary.
    pub const fn exit_code(&self) -> u8 {
        match &self.kind {
            ErrorKind::CommandNotFound(_) => 127,
            ErrorKind::CommandNotExecutable(_) => 126,
            ErrorKind::SyntaxError(..) | ErrorKind::InvalidUsage(_) => 2,
            _ => 1,
        }
    }
}

impl<T> From<T> for Error
where
    ErrorKind: From<T>,
{
    fn from(kind: T) -> Self {
        Self { kind: kind.into() }
    }
}

/// The set of errors produced by the interpreter.
#[derive(thiserror::Error, Debug)]
pub enum ErrorKind {
    /// A script failed to parse.
    #[error("{1}: {0}")]
    SyntaxError(husk_parser::ParseError, String),

    /// A word failed to parse during expansion.
    #[error(transparent)]
    WordParseError(#[from] husk_parser::WordParseError),

    /// A test-command expression failed to parse.
    #[error(transparent)]
    TestCommandParseError(#[from] husk_parser::TestCommandParseError),

    /// The named command could not be found.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// The named command was found but cannot be executed.
    #[error("{0}: permission denied")]
    CommandNotExecutable(String),

    /// A built-in was invoked with invalid arguments.
    #[error("{0}")]
    InvalidUsage(String),

    /// The named function is not defined.
    #[error("{0}: function not found")]
    FunctionNotFound(String),

    /// An unset variable was expanded under `set -u`.
    #[error("{0}: unbound variable")]
    UnboundVariable(String),

    /// A malformed substitution was encountered.
    #[error("{0}: bad substitution")]
    BadSubstitution(String),

    /// A nameref chain exceeded the resolution bound or referenced itself.
    #[error("{0}: circular name reference")]
    NamerefCycle(String),

    /// A nameref holds an invalid variable name.
    #[error("{0}: invalid variable name for name reference")]
    InvalidNamerefTarget(String),

    /// An attempt was made to modify a readonly variable.
    #[error("{0}: readonly variable")]
    ReadonlyVariable(String),

    /// An attempt was made to index a non-array variable.
    #[error("{0}: not an array")]
    NotAnArray(String),

    /// An array was assigned to an array element.
    #[error("cannot assign list to array member")]
    AssigningListToArrayMember,

    /// An associative array was converted to an indexed array (or vice versa).
    #[error("cannot convert array type for {0}")]
    ArrayConversion(String),

    /// An arithmetic expression failed to evaluate.
    #[error("arithmetic error: {0}")]
    EvalError(#[from] crate::arithmetic::EvalError),

    /// A checked expansion (`${name:?msg}`) failed.
    #[error("{0}")]
    CheckedExpansionError(String),

    /// A tilde expression was used without a usable HOME.
    #[error("cannot expand tilde with HOME unset")]
    TildeWithoutHome,

    /// An assignment targeted an unassignable parameter.
    #[error("cannot assign to special parameter")]
    CannotAssignToSpecialParameter,

    /// The given path is not a directory.
    #[error("{0}: not a directory")]
    NotADirectory(PathBuf),

    /// A redirection was malformed or could not be applied.
    #[error("invalid redirection")]
    InvalidRedirection,

    /// A redirection target could not be opened.
    #[error("{0}: {1}")]
    RedirectionFailure(String, std::io::Error),

    /// A redirection would clobber an existing file under `noclobber`.
    #[error("{0}: cannot overwrite existing file")]
    WouldClobber(String),

    /// The referenced file descriptor is not open.
    #[error("{0}: bad file descriptor")]
    BadFileDescriptor(u32),

    /// An invalid signal name or number was referenced.
    #[error("{0}: invalid signal specification")]
    InvalidSignal(String),

    /// The referenced job does not exist.
    #[error("{0}: no such job")]
    NoSuchJob(String),

    /// A file could not be sourced.
    #[error("{0}: {1}")]
    FailedSourcingFile(PathBuf, std::io::Error),

    /// A child process could not be created.
    #[error("failed to create child process")]
    ChildCreationFailure,

    /// An external command failed to launch.
    #[error("failed to execute `{0}': {1}")]
    FailedToExecuteCommand(String, std::io::Error),

    /// A signal could not be delivered.
    #[error("failed to send signal to process")]
    FailedToSendSignal,

    /// The referenced history entry does not exist.
    #[error("history position out of range")]
    HistoryItemNotFound,

    /// The given string is not a valid integer.
    #[error("failed to parse integer")]
    IntParseError(#[from] std::num::ParseIntError),

    /// Integer conversion failure.
    #[error("failed to convert integer")]
    TryFromIntError(#[from] std::num::TryFromIntError),

    /// A byte sequence was not valid UTF-8.
    #[error("failed to decode UTF-8")]
    FromUtf8Error(#[from] std::string::FromUtf8Error),

    /// An invalid glob pattern was used.
    #[error("invalid pattern: `{0}'")]
    InvalidPattern(String),

    /// A regular expression failed to compile or match.
    #[error("regex error: {0}")]
    RegexError(#[from] fancy_regex::Error),

    /// An I/O error occurred.
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),

    /// A string-formatting error occurred.
    #[error(transparent)]
    FormattingError(#[from] std::fmt::Error),

    /// An asynchronous task failed to join.
    #[error("task join error")]
    JoinError(#[from] tokio::task::JoinError),

    /// A platform call failed.
    #[error("system error: {0}")]
    Errno(#[from] nix::errno::Errno),

    /// A system-time computation failed.
    #[error("system time error: {0}")]
    TimeError(#[from] std::time::SystemTimeError),

    /// An array index was out of range.
    #[error("array index out of range: {0}")]
    ArrayIndexOutOfRange(i64),

    /// An invalid umask value was provided.
    #[error("invalid umask value")]
    InvalidUmask,

    /// The maximum function call depth was exceeded.
    #[error("maximum function call depth exceeded")]
    MaxCallDepthExceeded,

    /// The requested functionality is intentionally not supported.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

/// Convenience helper for unsupported functionality.
#[allow(dead_code)]
pub fn not_supported<T>(msg: &'static str) -> Result<T, Error> {
    Err(ErrorKind::NotSupported(msg).into())
}
