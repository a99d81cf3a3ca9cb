//! Core interpreter of the husk embeddable shell: word expansion, execution,
//! built-in commands, process/FD plumbing, and session state. The library is
//! Unix-only and exposes no interactive surfaces; embedders drive it through
//! [`Session`].

pub mod arithmetic;
mod builtins;
mod callstack;
mod commands;
mod delta;
mod env;
mod error;
mod escape;
mod expansion;
mod functions;
mod history;
mod interp;
mod jobs;
mod openfiles;
mod options;
mod orphans;
mod pathcache;
mod pathsearch;
mod patterns;
mod processes;
mod regexes;
mod results;
mod session;
mod sys;
mod testexpr;
mod traps;
mod variables;
mod wellknownvars;

pub use builtins::{
    BuiltinCommand, BuiltinContext, BuiltinDeclarationCommand, BuiltinRegistration,
    BuiltinResult, builtin, declaration_builtin, special_builtin,
};
pub use callstack::{CallStack, Frame, FrameKind};
pub use commands::CommandArg;
pub use delta::{
    AliasUpdate, EnvUpdate, FdUpdate, FunctionUpdate, HistoryUpdate, JobUpdate, OptionSetKind,
    OptionUpdate, StateDelta, TrapUpdate, VarAttribute, VarScope, VarUpdate,
};
pub use env::{Environment, EnvironmentLookup, EnvironmentScope, valid_variable_name};
pub use error::{Error, ErrorKind};
pub use expansion::assign_to_named_parameter;
pub use functions::{FunctionEnv, FunctionRegistration};
pub use history::History;
pub use interp::{Execute, ExecutionParameters};
pub use jobs::{Job, JobManager, JobState};
pub use openfiles::{OpenFile, OpenFiles};
pub use options::SessionOptions;
pub use patterns::Pattern;
pub use results::{BuiltinExitCode, RunKind, RunOutcome, StatementOutcome, Unwind};
pub use session::{Session, SessionState};
pub use traps::TrapCondition;
pub use variables::{ArrayLiteral, ValueLiteral, Variable, VariableValue};
