//! The built-in command registry and the uniform contract built-ins
//! implement: parse argv with clap, execute against a context, and return an
//! exit disposition plus a [`StateDelta`] of session mutations.

use std::io::Write;

use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::commands::CommandArg;
use crate::delta::StateDelta;
use crate::error::Error;
use crate::interp::ExecutionParameters;
use crate::openfiles::OpenFile;
use crate::results::BuiltinExitCode;
use crate::session::Session;

mod alias;
mod bg;
mod break_;
mod builtin_;
mod caller;
mod cd;
mod colon;
mod command;
mod continue_;
mod coproc;
mod declare;
mod dirs;
mod disown;
mod echo;
mod enable;
mod eval;
mod exec;
mod exit;
mod export;
mod false_;
mod fc;
mod fg;
mod getopts;
mod hash;
mod help;
mod history;
mod jobs;
mod kill;
mod let_;
mod mapfile;
mod popd;
mod printf;
mod pushd;
mod pwd;
mod read;
mod return_;
mod set;
mod shift;
mod shopt;
mod source;
mod test;
mod times;
mod trap;
mod true_;
mod type_;
mod ulimit;
mod umask;
mod unalias;
mod unset;
mod wait;

/// The result of executing a built-in: its exit disposition plus the batch of
/// session mutations to merge.
pub struct BuiltinResult {
    /// The exit disposition (possibly carrying an unwind).
    pub exit: BuiltinExitCode,
    /// The state mutations to apply atomically.
    pub delta: StateDelta,
}

impl BuiltinResult {
    /// A successful result with no state changes.
    pub fn success() -> Self {
        Self {
            exit: BuiltinExitCode::Success,
            delta: StateDelta::new(),
        }
    }

    /// A result with the given exit disposition and no state changes.
    pub fn exit(exit: BuiltinExitCode) -> Self {
        Self {
            exit: exit.into(),
            delta: StateDelta::new(),
        }
    }

    /// A successful result carrying the given state changes.
    pub fn with_delta(delta: StateDelta) -> Self {
        Self {
            exit: BuiltinExitCode::Success,
            delta,
        }
    }
}

impl From<BuiltinExitCode> for BuiltinResult {
    fn from(exit: BuiltinExitCode) -> Self {
        Self::exit(exit)
    }
}

/// Converts a statement outcome (e.g. from `eval`) back into a built-in exit
/// disposition, preserving any unwind it carries.
pub(crate) fn outcome_to_exit(outcome: crate::results::StatementOutcome) -> BuiltinExitCode {
    use crate::results::Unwind;

    match outcome.unwind {
        Unwind::None => outcome.exit_code.into(),
        Unwind::Break(n) => BuiltinExitCode::BreakLoop(n),
        Unwind::Continue(n) => BuiltinExitCode::ContinueLoop(n),
        Unwind::Return => BuiltinExitCode::ReturnFromFunctionOrScript(outcome.exit_code),
        Unwind::Exit => BuiltinExitCode::ExitSession(outcome.exit_code),
        Unwind::ExecReplace => BuiltinExitCode::ExecReplaced(outcome.exit_code),
    }
}

/// The context a built-in executes in.
pub struct BuiltinContext<'a> {
    /// The session, readable for resolving state; mutations should travel in
    /// the returned delta. Built-ins whose essence is running code (`eval`,
    /// `source`) re-enter the executor through this reference.
    pub session: &'a mut Session,
    /// The name the built-in was invoked as.
    pub command_name: String,
    /// The execution parameters (FD view) for this invocation.
    pub params: ExecutionParameters,
}

impl BuiltinContext<'_> {
    /// Returns the context's standard input.
    pub fn stdin(&self) -> OpenFile {
        self.params.stdin()
    }

    /// Returns the context's standard output.
    pub fn stdout(&self) -> OpenFile {
        self.params.stdout()
    }

    /// Returns the context's standard error.
    pub fn stderr(&self) -> OpenFile {
        self.params.stderr()
    }
}

/// The uniform trait built-in commands implement.
pub trait BuiltinCommand: clap::Parser + Send + Sync {
    /// Whether the command accepts `+x`-style options (rewritten to `--+x`
    /// before clap parsing).
    fn takes_plus_options() -> bool {
        false
    }

    /// Executes the command.
    fn execute(
        &self,
        context: &mut BuiltinContext<'_>,
    ) -> impl std::future::Future<Output = Result<BuiltinResult, Error>> + Send;
}

/// Implemented by built-ins that receive parsed assignments (`declare`,
/// `export`, `readonly`, `local`).
pub trait BuiltinDeclarationCommand: BuiltinCommand {
    /// Hands the command its non-option arguments, assignments included.
    fn set_declarations(&mut self, declarations: Vec<CommandArg>);
}

/// The function type stored in the registry.
pub type BuiltinExecuteFn =
    fn(BuiltinContext<'_>, Vec<CommandArg>) -> BoxFuture<'_, Result<BuiltinResult, Error>>;

/// A registry entry for one built-in.
#[derive(Clone)]
pub struct BuiltinRegistration {
    /// Executes the built-in.
    pub(crate) execute_fn: BuiltinExecuteFn,
    /// Whether the entry has been disabled (`enable -n`).
    pub disabled: bool,
    /// Whether the built-in is a POSIX special built-in (resolved before
    /// functions).
    pub special_builtin: bool,
    /// Whether the built-in receives declarations.
    pub declaration_builtin: bool,
    /// One-line description shown by `help`.
    pub short_description: &'static str,
}

/// Builds a registration for an ordinary built-in.
pub fn builtin<T: BuiltinCommand>(short_description: &'static str) -> BuiltinRegistration {
    BuiltinRegistration {
        execute_fn: exec_builtin::<T>,
        disabled: false,
        special_builtin: false,
        declaration_builtin: false,
        short_description,
    }
}

/// Builds a registration for a special built-in.
pub fn special_builtin<T: BuiltinCommand>(short_description: &'static str) -> BuiltinRegistration {
    BuiltinRegistration {
        special_builtin: true,
        ..builtin::<T>(short_description)
    }
}

/// Builds a registration for a declaration built-in.
pub fn declaration_builtin<T: BuiltinDeclarationCommand + Default>(
    short_description: &'static str,
    special: bool,
) -> BuiltinRegistration {
    BuiltinRegistration {
        execute_fn: exec_declaration_builtin::<T>,
        disabled: false,
        special_builtin: special,
        declaration_builtin: true,
        short_description,
    }
}

fn parse_args<T: BuiltinCommand>(
    command_name: &str,
    args: &[CommandArg],
) -> Result<T, clap::Error> {
    let mut plain: Vec<String> = vec![command_name.to_owned()];

    for arg in args.iter().skip(1) {
        let arg = arg.to_string();
        if T::takes_plus_options() && arg.len() > 1 && arg.starts_with('+') {
            for c in arg.chars().skip(1) {
                plain.push(format!("--+{c}"));
            }
        } else {
            plain.push(arg);
        }
    }

    T::try_parse_from(plain)
}

fn exec_builtin<T: BuiltinCommand>(
    context: BuiltinContext<'_>,
    args: Vec<CommandArg>,
) -> BoxFuture<'_, Result<BuiltinResult, Error>> {
    Box::pin(async move {
        let mut context = context;

        let command = match parse_args::<T>(context.command_name.as_str(), args.as_slice()) {
            Ok(command) => command,
            Err(e) => {
                let mut stderr = context.stderr();
                let _ = writeln!(stderr, "{e}");
                return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
            }
        };

        command.execute(&mut context).await
    })
}

fn exec_declaration_builtin<T: BuiltinDeclarationCommand + Default>(
    context: BuiltinContext<'_>,
    args: Vec<CommandArg>,
) -> BoxFuture<'_, Result<BuiltinResult, Error>> {
    Box::pin(async move {
        let mut context = context;

        // Leading options go to clap; everything else (assignments included)
        // is handed over as declarations.
        let mut options = vec![];
        let mut declarations = vec![];

        for (i, arg) in args.into_iter().enumerate() {
            match arg {
                CommandArg::String(s)
                    if i == 0
                        || (declarations.is_empty()
                            && s.len() > 1
                            && (s.starts_with('-') || s.starts_with('+'))) =>
                {
                    options.push(CommandArg::String(s));
                }
                other => declarations.push(other),
            }
        }

        let mut command =
            match parse_args::<T>(context.command_name.as_str(), options.as_slice()) {
                Ok(command) => command,
                Err(e) => {
                    let mut stderr = context.stderr();
                    let _ = writeln!(stderr, "{e}");
                    return Ok(BuiltinResult::exit(BuiltinExitCode::InvalidUsage));
                }
            };

        command.set_declarations(declarations);

        command.execute(&mut context).await
    })
}

/// Builds the default registry of built-ins.
pub(crate) fn default_registry() -> IndexMap<String, BuiltinRegistration> {
    let mut registry: IndexMap<String, BuiltinRegistration> = IndexMap::new();

    let mut insert = |name: &str, registration: BuiltinRegistration| {
        registry.insert(name.to_owned(), registration);
    };

    // Special built-ins (found before functions during resolution).
    insert(":", special_builtin::<colon::ColonCommand>("do nothing, successfully"));
    insert(".", special_builtin::<source::SourceCommand>("read and execute a file in the current session"));
    insert("source", special_builtin::<source::SourceCommand>("read and execute a file in the current session"));
    insert("break", special_builtin::<break_::BreakCommand>("exit for, while, or until loops"));
    insert("continue", special_builtin::<continue_::ContinueCommand>("resume for, while, or until loops"));
    insert("eval", special_builtin::<eval::EvalCommand>("execute arguments as a shell command"));
    insert("exec", special_builtin::<exec::ExecCommand>("replace the execution context with a command"));
    insert("exit", special_builtin::<exit::ExitCommand>("exit the current run"));
    insert("return", special_builtin::<return_::ReturnCommand>("return from a function or sourced script"));
    insert("set", special_builtin::<set::SetCommand>("set option flags and positional parameters"));
    insert("shift", special_builtin::<shift::ShiftCommand>("shift positional parameters"));
    insert("trap", special_builtin::<trap::TrapCommand>("trap signals and other events"));
    insert("unset", special_builtin::<unset::UnsetCommand>("unset variables and functions"));
    insert(
        "export",
        declaration_builtin::<export::ExportCommand>("mark variables for export", true),
    );
    insert(
        "readonly",
        declaration_builtin::<declare::ReadonlyCommand>("mark variables read-only", true),
    );

    // Declaration built-ins.
    insert(
        "declare",
        declaration_builtin::<declare::DeclareCommand>("declare variables and attributes", false),
    );
    insert(
        "typeset",
        declaration_builtin::<declare::DeclareCommand>("declare variables and attributes", false),
    );
    insert(
        "local",
        declaration_builtin::<declare::LocalCommand>("declare function-local variables", false),
    );

    // Ordinary built-ins.
    insert("alias", builtin::<alias::AliasCommand>("define or display aliases"));
    insert("bg", builtin::<bg::BgCommand>("resume a job in the background"));
    insert("builtin", builtin::<builtin_::BuiltinCommandCommand>("run a shell built-in directly"));
    insert("caller", builtin::<caller::CallerCommand>("report the context of the current call"));
    insert("cd", builtin::<cd::CdCommand>("change the working directory"));
    insert("command", builtin::<command::CommandCommand>("run a command bypassing functions"));
    insert("coproc", builtin::<coproc::CoprocCommand>("run a command with connected pipes"));
    insert("dirs", builtin::<dirs::DirsCommand>("display the directory stack"));
    insert("disown", builtin::<disown::DisownCommand>("detach jobs from the session"));
    insert("echo", builtin::<echo::EchoCommand>("write arguments to standard output"));
    insert("enable", builtin::<enable::EnableCommand>("enable or disable built-ins"));
    insert("false", builtin::<false_::FalseCommand>("return an unsuccessful status"));
    insert("fc", builtin::<fc::FcCommand>("list or re-execute history entries"));
    insert("fg", builtin::<fg::FgCommand>("resume a job in the foreground"));
    insert("getopts", builtin::<getopts::GetoptsCommand>("parse positional parameters as options"));
    insert("hash", builtin::<hash::HashCommand>("manage the command location cache"));
    insert("help", builtin::<help::HelpCommand>("display information about built-ins"));
    insert("history", builtin::<history::HistoryCommand>("display or edit the command history"));
    insert("jobs", builtin::<jobs::JobsCommand>("list tracked jobs"));
    insert("kill", builtin::<kill::KillCommand>("send a signal to a process or job"));
    insert("let", builtin::<let_::LetCommand>("evaluate arithmetic expressions"));
    insert("mapfile", builtin::<mapfile::MapfileCommand>("read lines into an array"));
    insert("readarray", builtin::<mapfile::MapfileCommand>("read lines into an array"));
    insert("popd", builtin::<popd::PopdCommand>("pop the directory stack"));
    insert("printf", builtin::<printf::PrintfCommand>("format and print arguments"));
    insert("pushd", builtin::<pushd::PushdCommand>("push onto the directory stack"));
    insert("pwd", builtin::<pwd::PwdCommand>("print the working directory"));
    insert("read", builtin::<read::ReadCommand>("read a line into variables"));
    insert("shopt", builtin::<shopt::ShoptCommand>("set and unset shell options"));
    insert("test", builtin::<test::TestCommand>("evaluate a conditional expression"));
    insert("[", builtin::<test::TestCommand>("evaluate a conditional expression"));
    insert("times", builtin::<times::TimesCommand>("report process times"));
    insert("true", builtin::<true_::TrueCommand>("return a successful status"));
    insert("type", builtin::<type_::TypeCommand>("describe how a name would be interpreted"));
    insert("ulimit", builtin::<ulimit::UlimitCommand>("get or set resource limits"));
    insert("umask", builtin::<umask::UmaskCommand>("get or set the file creation mask"));
    insert("unalias", builtin::<unalias::UnaliasCommand>("remove aliases"));
    insert("wait", builtin::<wait::WaitCommand>("wait for jobs to complete"));

    registry
}
