//! Execution results and the control-flow unwind signals that travel with
//! them. Control flow (`break`, `continue`, `return`, `exit`, `exec`) is
//! expressed as data, never as panics or errors.

/// A control-flow signal propagating out of a statement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Unwind {
    /// Normal flow.
    #[default]
    None,
    /// Break out of the given number of enclosing loops (1-based).
    Break(u8),
    /// Continue the loop at the given enclosing depth (1-based).
    Continue(u8),
    /// Return from the nearest function or sourced script.
    Return,
    /// Exit the session's current run.
    Exit,
    /// The execution context was replaced via `exec`; nothing further runs.
    ExecReplace,
}

/// The outcome of evaluating a statement: an exit code plus an optional
/// unwind signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatementOutcome {
    /// The numeric exit code.
    pub exit_code: u8,
    /// The unwind signal accompanying the exit code, if any.
    pub unwind: Unwind,
}

impl StatementOutcome {
    /// Returns an outcome with the given exit code and normal flow.
    pub fn new(exit_code: u8) -> Self {
        Self {
            exit_code,
            unwind: Unwind::None,
        }
    }

    /// Returns a successful outcome.
    pub fn success() -> Self {
        Self::new(0)
    }

    /// Returns an outcome carrying an unwind signal.
    pub const fn unwinding(exit_code: u8, unwind: Unwind) -> Self {
        Self { exit_code, unwind }
    }

    /// Returns whether the exit code indicates success.
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns whether the outcome carries no unwind signal.
    pub const fn is_normal_flow(&self) -> bool {
        matches!(self.unwind, Unwind::None)
    }

    /// Returns whether execution of the enclosing construct should stop
    /// because of a non-loop unwind.
    pub const fn stops_execution(&self) -> bool {
        matches!(
            self.unwind,
            Unwind::Return | Unwind::Exit | Unwind::ExecReplace
        )
    }
}

impl From<std::process::Output> for StatementOutcome {
    fn from(output: std::process::Output) -> Self {
        Self::from(output.status)
    }
}

impl From<std::process::ExitStatus> for StatementOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(code) = status.code() {
            #[allow(clippy::cast_sign_loss)]
            return Self::new((code & 0xFF) as u8);
        }

        if let Some(signal) = status.signal() {
            #[allow(clippy::cast_sign_loss)]
            return Self::new(128 + (signal & 0xFF) as u8);
        }

        tracing::error!("child exited without status or signal");
        Self::new(127)
    }
}

/// The exit disposition of a built-in command.
#[derive(Clone, Copy, Debug)]
pub enum BuiltinExitCode {
    /// Exit code 0.
    Success,
    /// Exit code 2 with a usage diagnostic already written.
    InvalidUsage,
    /// An arbitrary exit code.
    Custom(u8),
    /// The session's current run should exit with the given code.
    ExitSession(u8),
    /// Return from the enclosing function or sourced script.
    ReturnFromFunctionOrScript(u8),
    /// Break out of N enclosing loops.
    BreakLoop(u8),
    /// Continue the Nth enclosing loop.
    ContinueLoop(u8),
    /// The execution context was replaced (`exec` with a command).
    ExecReplaced(u8),
}

impl From<BuiltinExitCode> for StatementOutcome {
    fn from(code: BuiltinExitCode) -> Self {
        match code {
            BuiltinExitCode::Success => Self::success(),
            BuiltinExitCode::InvalidUsage => Self::new(2),
            BuiltinExitCode::Custom(code) => Self::new(code),
            BuiltinExitCode::ExitSession(code) => Self::unwinding(code, Unwind::Exit),
            BuiltinExitCode::ReturnFromFunctionOrScript(code) => {
                Self::unwinding(code, Unwind::Return)
            }
            BuiltinExitCode::BreakLoop(n) => Self::unwinding(0, Unwind::Break(n)),
            BuiltinExitCode::ContinueLoop(n) => Self::unwinding(0, Unwind::Continue(n)),
            BuiltinExitCode::ExecReplaced(code) => Self::unwinding(code, Unwind::ExecReplace),
        }
    }
}

impl From<u8> for BuiltinExitCode {
    fn from(code: u8) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::Custom(code)
        }
    }
}

/// How a run of a script concluded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunKind {
    /// The script ran to completion.
    Completed,
    /// The script called `exit` (or an errexit-triggered equivalent).
    Exited,
    /// The script replaced its execution context via `exec`.
    ExecReplaced,
}

/// The result of running a script against a session: exit status plus
/// captured output streams.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The exit code of the last command executed.
    pub exit_code: u8,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
    /// How the run concluded.
    pub kind: RunKind,
}

impl RunOutcome {
    /// Returns captured stdout as a lossily-decoded string.
    pub fn stdout_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Returns captured stderr as a lossily-decoded string.
    pub fn stderr_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_exit_codes_map_to_outcomes() {
        let outcome: StatementOutcome = BuiltinExitCode::Success.into();
        assert!(outcome.is_success());
        assert!(outcome.is_normal_flow());

        let outcome: StatementOutcome = BuiltinExitCode::BreakLoop(2).into();
        assert_eq!(outcome.unwind, Unwind::Break(2));

        let outcome: StatementOutcome = BuiltinExitCode::ExitSession(3).into();
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.stops_execution());
    }
}
