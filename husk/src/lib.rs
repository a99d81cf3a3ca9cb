//! husk: an embeddable bash-compatible shell interpreter.
//!
//! A [`Session`] carries variables, functions, aliases, options, the
//! directory stack, jobs, open file descriptors, traps, and history across
//! invocations; [`run`] executes a script against it and returns the exit
//! status along with captured output.
//!
//! ```no_run
//! # async fn demo() -> Result<(), husk::Error> {
//! let mut session = husk::Session::new()?;
//!
//! let result = husk::run("greeting=hello", &mut session).await?;
//! assert_eq!(result.exit_code, 0);
//!
//! let result = husk::run("echo $greeting, world", &mut session).await?;
//! assert_eq!(result.stdout_str(), "hello, world\n");
//! # Ok(())
//! # }
//! ```

pub use husk_core::{
    BuiltinCommand, BuiltinContext, BuiltinExitCode, BuiltinRegistration, BuiltinResult, Error,
    ErrorKind, RunKind, RunOutcome, Session, SessionState, StateDelta, builtin,
};
pub use husk_parser::{ParserOptions, ast, parse_program};

/// Runs a script against the given session, capturing standard output and
/// error. The session's state reflects the script's effects afterward.
pub async fn run(script: &str, session: &mut Session) -> Result<RunOutcome, Error> {
    session.run_script(script).await
}
