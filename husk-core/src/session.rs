//! The session: the single authoritative store of shell state, plus the
//! `run` entry point that parses and executes scripts against it.

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::builtins::{self, BuiltinRegistration};
use crate::callstack::{CallStack, Frame, FrameKind};
use crate::delta::StateDelta;
use crate::env::{Environment, EnvironmentLookup, EnvironmentScope};
use crate::error::{Error, ErrorKind};
use crate::functions::FunctionEnv;
use crate::history::History;
use crate::interp::{Execute, ExecutionParameters};
use crate::jobs::JobManager;
use crate::openfiles::{OpenFile, OpenFiles};
use crate::options::SessionOptions;
use crate::pathcache::PathCache;
use crate::results::{RunKind, RunOutcome, StatementOutcome, Unwind};
use crate::sys;
use crate::traps::{TrapCondition, TrapHandlers};
use crate::variables::ValueLiteral;
use crate::wellknownvars;

/// A registered coprocess: its id plus the session FDs wired to it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CoprocRegistration {
    /// The child's process id.
    pub pid: i32,
    /// The FD reading from the child's stdout.
    pub read_fd: u32,
    /// The FD writing to the child's stdin.
    pub write_fd: u32,
}

/// A long-lived shell session. All state a script can observe or mutate
/// lives here; `run` invocations execute against it and leave their effects
/// behind.
///
/// A `run` requires `&mut Session`, so concurrent runs on one session are
/// serialised by construction.
pub struct Session {
    /// Shell variables, in scoped form.
    pub(crate) env: Environment,
    /// Defined functions.
    pub(crate) funcs: FunctionEnv,
    /// Aliases, in definition order.
    pub(crate) aliases: IndexMap<String, String>,
    /// Option flags.
    pub(crate) options: SessionOptions,
    /// Positional parameters (`$1` onward).
    pub(crate) positional_params: Vec<String>,
    /// The working directory.
    pub(crate) working_dir: PathBuf,
    /// The directory stack (`pushd`/`popd`); front is most recent.
    pub(crate) dir_stack: Vec<PathBuf>,
    /// Tracked background jobs.
    pub(crate) jobs: JobManager,
    /// The session's FD table.
    pub(crate) open_files: OpenFiles,
    /// Registered trap handlers.
    pub(crate) traps: TrapHandlers,
    /// Command history.
    pub(crate) history: History,
    /// The function/source call stack.
    pub(crate) call_stack: CallStack,
    /// Registered built-ins.
    pub(crate) builtins: IndexMap<String, BuiltinRegistration>,
    /// Cached command locations (`hash`).
    pub(crate) program_location_cache: PathCache,
    /// `$?`.
    pub(crate) last_exit_status: u8,
    /// Per-stage statuses of the last pipeline (`PIPESTATUS`).
    pub(crate) last_pipeline_statuses: Vec<u8>,
    /// Current loop nesting depth within the active frame.
    pub(crate) loop_depth: u8,
    /// Subshell depth (0 for the root session).
    pub(crate) depth: usize,
    /// `$0`.
    pub(crate) session_name: Option<String>,
    /// `$!`.
    pub(crate) last_bg_pid: Option<i32>,
    /// Registered coprocesses.
    pub(crate) coprocs: Vec<CoprocRegistration>,
    /// The line number of the command currently executing.
    pub(crate) current_line: u32,
    /// When the session was created (`SECONDS`).
    pub(crate) started_at: std::time::SystemTime,
    /// Signals received but not yet dispatched to their trap handlers.
    pub(crate) pending_signals: Arc<Mutex<VecDeque<TrapCondition>>>,
    /// Signals for which a listener task is running.
    signal_listeners: HashSet<i32>,
    /// Handles for the listener tasks, aborted on close.
    listener_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Session {
    /// Creates a new session, inheriting exported variables from the process
    /// environment and seeding the well-known shell variables.
    pub fn new() -> Result<Self, Error> {
        let mut session = Self {
            env: Environment::new(),
            funcs: FunctionEnv::default(),
            aliases: IndexMap::new(),
            options: SessionOptions::defaults(),
            positional_params: vec![],
            working_dir: std::env::current_dir()?,
            dir_stack: vec![],
            jobs: JobManager::new(),
            open_files: OpenFiles::new(),
            traps: TrapHandlers::default(),
            history: History::new(),
            call_stack: CallStack::new(),
            builtins: builtins::default_registry(),
            program_location_cache: PathCache::default(),
            last_exit_status: 0,
            last_pipeline_statuses: vec![],
            loop_depth: 0,
            depth: 0,
            session_name: None,
            last_bg_pid: None,
            coprocs: vec![],
            current_line: 0,
            started_at: std::time::SystemTime::now(),
            pending_signals: Arc::new(Mutex::new(VecDeque::new())),
            signal_listeners: HashSet::new(),
            listener_tasks: vec![],
        };

        wellknownvars::inherit_process_env(&mut session)?;
        wellknownvars::init_well_known_vars(&mut session)?;

        Ok(session)
    }

    /// Clones the session into a subshell child: same state, fresh job table
    /// and signal plumbing, one level deeper.
    pub fn clone_as_subshell(&self) -> Self {
        Self {
            env: self.env.clone(),
            funcs: self.funcs.clone(),
            aliases: self.aliases.clone(),
            options: self.options.clone(),
            positional_params: self.positional_params.clone(),
            working_dir: self.working_dir.clone(),
            dir_stack: self.dir_stack.clone(),
            jobs: JobManager::new(),
            open_files: self.open_files.clone(),
            traps: self.traps.clone(),
            history: self.history.clone(),
            call_stack: self.call_stack.clone(),
            builtins: self.builtins.clone(),
            program_location_cache: self.program_location_cache.clone(),
            last_exit_status: self.last_exit_status,
            last_pipeline_statuses: self.last_pipeline_statuses.clone(),
            loop_depth: self.loop_depth,
            depth: self.depth + 1,
            session_name: self.session_name.clone(),
            last_bg_pid: self.last_bg_pid,
            coprocs: self.coprocs.clone(),
            current_line: self.current_line,
            started_at: self.started_at,
            pending_signals: Arc::new(Mutex::new(VecDeque::new())),
            signal_listeners: HashSet::new(),
            listener_tasks: vec![],
        }
    }

    /// Returns whether this session is a subshell.
    pub fn is_subshell(&self) -> bool {
        self.depth > 0
    }

    /// Returns the exit status of the most recent command.
    pub fn last_exit_status(&self) -> u8 {
        self.last_exit_status
    }

    /// Returns the session's working directory.
    pub fn working_dir(&self) -> &Path {
        self.working_dir.as_path()
    }

    /// Returns the value of the named variable, if set.
    pub fn get_var(&self, name: &str) -> Option<String> {
        self.env.get_str(name).map(|v| v.into_owned())
    }

    /// Sets (or creates) a variable with the given scalar value.
    pub fn set_var(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.env.set_global(name, value)
    }

    /// Sets an exported variable (visible to spawned commands).
    pub fn set_env(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.env.update_or_add(
            name,
            ValueLiteral::Scalar(value.to_owned()),
            |var| {
                var.export();
                Ok(())
            },
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )
    }

    /// Registers a host-defined built-in under the given name.
    pub fn register_builtin(&mut self, name: &str, registration: BuiltinRegistration) {
        self.builtins.insert(name.to_owned(), registration);
    }

    /// Returns a serialisable snapshot of the session's observable state.
    pub fn state_snapshot(&self) -> SessionState {
        SessionState {
            variables: self
                .env
                .iter()
                .filter(|(_, var)| !var.is_hidden())
                .map(|(name, var)| (name.clone(), var.value().as_str().into_owned()))
                .collect(),
            functions: self.funcs.iter().map(|(name, _)| name.clone()).collect(),
            aliases: self
                .aliases
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            options: self.options.clone(),
            working_dir: self.working_dir.clone(),
            dir_stack: self.dir_stack.clone(),
            last_exit_status: self.last_exit_status,
        }
    }

    /// Runs a script against the session, capturing its standard output and
    /// error streams.
    pub async fn run_script(&mut self, script: &str) -> Result<RunOutcome, Error> {
        let mut params = self.default_exec_params();

        // Capture FDs 1 and 2 through pipes with concurrent drains, unless a
        // prior `exec` pointed them elsewhere.
        let stdout_capture = self.install_capture(&mut params, 1)?;
        let stderr_capture = self.install_capture(&mut params, 2)?;

        let outcome = self.run_string_for_outcome(script, &params).await;

        // The EXIT trap observes the final session state and its output is
        // captured with everything else.
        let outcome = match outcome {
            Ok(outcome) => {
                if !matches!(outcome.unwind, Unwind::ExecReplace) {
                    crate::interp::fire_exit_trap(self, &params).await?;
                }
                outcome
            }
            Err(e) => {
                let mut stderr = params.stderr();
                let _ = writeln!(stderr, "husk: {e}");
                StatementOutcome::new(e.exit_code())
            }
        };

        if self.options.history {
            let trimmed = script.trim();
            if !trimmed.is_empty() {
                self.history.add(trimmed.to_owned());
            }
        }

        drop(params);

        let stdout = match stdout_capture {
            Some(task) => task.await??,
            None => vec![],
        };
        let stderr = match stderr_capture {
            Some(task) => task.await??,
            None => vec![],
        };

        self.last_exit_status = outcome.exit_code;

        Ok(RunOutcome {
            exit_code: outcome.exit_code,
            stdout,
            stderr,
            kind: match outcome.unwind {
                Unwind::Exit => RunKind::Exited,
                Unwind::ExecReplace => RunKind::ExecReplaced,
                _ => RunKind::Completed,
            },
        })
    }

    /// Tears the session down: delivers SIGTERM to remaining jobs, reaps
    /// them, stops signal listeners, and drops the FD table.
    pub async fn close(&mut self) -> Result<(), Error> {
        for job in &self.jobs.jobs {
            let _ = job.kill(TrapCondition::Signal(crate::traps::Signal::SIGTERM));
        }
        let _ = self.jobs.wait_all().await;

        for task in self.listener_tasks.drain(..) {
            task.abort();
        }

        for coproc in &self.coprocs {
            tracing::debug!("releasing coproc (pid {})", coproc.pid);
        }
        self.coprocs.clear();
        self.open_files = OpenFiles::empty();

        // Disowned children stay with the orphan supervisor past teardown.
        let orphans = crate::orphans::adopted_count();
        if orphans > 0 {
            tracing::debug!("{orphans} disowned children outlive the session");
        }

        Ok(())
    }

    fn install_capture(
        &self,
        params: &mut ExecutionParameters,
        fd: u32,
    ) -> Result<Option<tokio::task::JoinHandle<std::io::Result<Vec<u8>>>>, Error> {
        // Only the process's own stdio gets captured; files installed via
        // `exec N>file` stay as they are.
        let is_process_stdio = matches!(
            params.open_files.get(fd),
            Some(OpenFile::Stdout(_) | OpenFile::Stderr(_)) | None
        );

        if !is_process_stdio {
            return Ok(None);
        }

        let (reader, writer) = crate::openfiles::pipe()?;
        params.open_files.set(fd, writer.into());

        let task = tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut reader, &mut buf).map(|_| buf)
        });

        Ok(Some(task))
    }

    /// Parses and executes a script string in the current session with the
    /// given parameters.
    pub(crate) async fn run_string(
        &mut self,
        script: &str,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        self.run_string_for_outcome(script, params).await
    }

    async fn run_string_for_outcome(
        &mut self,
        script: &str,
        params: &ExecutionParameters,
    ) -> Result<StatementOutcome, Error> {
        let program = husk_parser::parse_program(script, &self.parser_options())
            .map_err(|e| ErrorKind::SyntaxError(e, first_line_of(script)))?;

        if self.options.verbose {
            let mut stderr = params.stderr();
            let _ = write!(stderr, "{script}");
            if !script.ends_with('\n') {
                let _ = writeln!(stderr);
            }
        }

        program.execute(self, params).await
    }

    /// Returns execution parameters whose stdout/stderr come from the
    /// session's own FD table rather than any per-run capture pipes. Used
    /// for children that may outlive the current run (background jobs,
    /// coprocesses, process substitutions); otherwise a lingering writer
    /// would keep the run's capture drain from ever seeing EOF.
    pub(crate) fn detach_capture_params(
        &self,
        params: &ExecutionParameters,
    ) -> ExecutionParameters {
        let mut detached = params.clone();

        for fd in [1u32, 2u32] {
            match self.open_files.get(fd).and_then(|f| f.try_dup().ok()) {
                Some(file) => {
                    detached.open_files.set(fd, file);
                }
                None => {
                    detached.open_files.remove(fd);
                }
            }
        }

        detached
    }

    /// Returns the default execution parameters: the session's FD view.
    pub fn default_exec_params(&self) -> ExecutionParameters {
        ExecutionParameters {
            open_files: self.open_files.try_clone().unwrap_or_default(),
            modified_fds: vec![],
            in_condition_context: false,
        }
    }

    /// Returns the parser options implied by the session's option flags.
    pub fn parser_options(&self) -> husk_parser::ParserOptions {
        husk_parser::ParserOptions {
            enable_extended_globbing: self.options.extglob,
            tilde_expansion: true,
        }
    }

    /// Returns the field-splitting characters.
    pub(crate) fn ifs(&self) -> String {
        self.env
            .get_str("IFS")
            .map_or_else(|| String::from(" \t\n"), |v| v.into_owned())
    }

    /// Returns the join character used by `"$*"`.
    pub(crate) fn ifs_first_char(&self) -> char {
        self.ifs().chars().next().unwrap_or(' ')
    }

    /// Applies a state delta atomically; returns per-name rejection
    /// diagnostics.
    pub fn apply_delta(&mut self, delta: StateDelta) -> Result<Vec<String>, Error> {
        // Signal-named traps need their listeners running before the handler
        // can ever fire.
        for update in &delta.traps {
            if let crate::delta::TrapUpdate::Register(condition, command) = update {
                if !command.is_empty() {
                    self.ensure_signal_listener(*condition);
                }
            }
        }

        crate::delta::apply(self, delta)
    }

    /// Changes the working directory, maintaining `PWD` and `OLDPWD`.
    pub(crate) fn set_working_dir_internal(&mut self, new_dir: PathBuf) -> Result<(), Error> {
        if !new_dir.is_dir() {
            return Err(ErrorKind::NotADirectory(new_dir).into());
        }

        let old = std::mem::replace(&mut self.working_dir, new_dir);

        self.env
            .set_global("OLDPWD", old.to_string_lossy().as_ref())?;
        let pwd = self.working_dir.to_string_lossy().to_string();
        self.env.set_global("PWD", pwd.as_str())?;

        Ok(())
    }

    /// Writes an `xtrace` line for the given (already-expanded) command.
    pub(crate) fn trace_command(
        &self,
        params: &ExecutionParameters,
        command: String,
    ) -> std::io::Result<()> {
        let prefix = self
            .env
            .get_str("PS4")
            .map_or_else(|| String::from("+ "), |v| v.into_owned());

        let mut stderr = params.stderr();
        writeln!(stderr, "{prefix}{command}")
    }

    //
    // Function and source frames.
    //

    pub(crate) fn enter_function(
        &mut self,
        name: &str,
        definition: &Arc<husk_parser::ast::FunctionDefinition>,
        positional: Vec<String>,
    ) -> Result<(), Error> {
        const MAX_CALL_DEPTH: usize = 200;

        if self.call_stack.depth() >= MAX_CALL_DEPTH {
            return Err(ErrorKind::MaxCallDepthExceeded.into());
        }

        let saved_positional = std::mem::replace(&mut self.positional_params, positional);

        self.call_stack.push(Frame {
            name: name.to_owned(),
            kind: FrameKind::Function(definition.clone()),
            call_line: self.current_line,
            saved_positional,
        });

        self.env.push_scope(EnvironmentScope::Local);

        // Loop control does not cross function boundaries.
        self.loop_depth = 0;

        Ok(())
    }

    pub(crate) async fn leave_function(
        &mut self,
        params: &ExecutionParameters,
    ) -> Result<(), Error> {
        self.env.pop_scope(EnvironmentScope::Local)?;

        if let Some(frame) = self.call_stack.pop() {
            self.positional_params = frame.saved_positional;
        }

        self.run_return_trap(params).await?;

        Ok(())
    }

    pub(crate) fn enter_sourced_script(
        &mut self,
        path: PathBuf,
        positional: Option<Vec<String>>,
    ) {
        let saved_positional = match positional {
            Some(new_positional) => {
                std::mem::replace(&mut self.positional_params, new_positional)
            }
            None => self.positional_params.clone(),
        };

        self.call_stack.push(Frame {
            name: path.to_string_lossy().to_string(),
            kind: FrameKind::Source(path),
            call_line: self.current_line,
            saved_positional,
        });
    }

    pub(crate) async fn leave_sourced_script(
        &mut self,
        params: &ExecutionParameters,
    ) -> Result<(), Error> {
        if let Some(frame) = self.call_stack.pop() {
            self.positional_params = frame.saved_positional;
        }

        self.run_return_trap(params).await?;

        Ok(())
    }

    async fn run_return_trap(&mut self, params: &ExecutionParameters) -> Result<(), Error> {
        if self.traps.handler_depth > 0 {
            return Ok(());
        }

        let Some(handler) = self
            .traps
            .get_handler(TrapCondition::Return)
            .filter(|h| !h.is_empty())
            .map(|h| h.to_owned())
        else {
            return Ok(());
        };

        self.traps.handler_depth += 1;
        let result = self.run_string(handler.as_str(), params).await;
        self.traps.handler_depth -= 1;
        result.map(|_| ())
    }

    //
    // Trap plumbing.
    //

    /// Applies `errexit`: a failed command outside any condition context
    /// becomes an `Exit` unwind.
    pub(crate) fn apply_errexit_if_applicable(
        &self,
        params: &ExecutionParameters,
        outcome: &mut StatementOutcome,
    ) {
        if self.options.errexit
            && !params.in_condition_context
            && !outcome.is_success()
            && outcome.is_normal_flow()
        {
            outcome.unwind = Unwind::Exit;
        }
    }

    /// Fires the ERR trap if one is set and the context allows it.
    pub(crate) async fn fire_err_trap_if_applicable(
        &mut self,
        params: &ExecutionParameters,
        exit_code: u8,
    ) -> Result<(), Error> {
        if params.in_condition_context || self.traps.handler_depth > 0 {
            return Ok(());
        }

        let Some(handler) = self
            .traps
            .get_handler(TrapCondition::Err)
            .filter(|h| !h.is_empty())
            .map(|h| h.to_owned())
        else {
            return Ok(());
        };

        let saved_status = exit_code;
        self.traps.handler_depth += 1;
        let result = self.run_string(handler.as_str(), params).await;
        self.traps.handler_depth -= 1;
        self.last_exit_status = saved_status;

        result.map(|_| ())
    }

    /// Fires the DEBUG trap (at handler depth zero only) before a simple
    /// command, with `BASH_COMMAND` set to the command's source text.
    pub(crate) async fn fire_debug_trap_if_applicable(
        &mut self,
        params: &ExecutionParameters,
        command_text: &str,
    ) -> Result<(), Error> {
        if self.traps.handler_depth > 0 {
            return Ok(());
        }

        let Some(handler) = self
            .traps
            .get_handler(TrapCondition::Debug)
            .filter(|h| !h.is_empty())
            .map(|h| h.to_owned())
        else {
            return Ok(());
        };

        self.env.update_or_add(
            "BASH_COMMAND",
            ValueLiteral::Scalar(command_text.to_owned()),
            |_| Ok(()),
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )?;

        let saved_status = self.last_exit_status;
        self.traps.handler_depth += 1;
        let result = self.run_string(handler.as_str(), params).await;
        self.traps.handler_depth -= 1;
        self.last_exit_status = saved_status;

        result.map(|_| ())
    }

    /// Runs any trap handlers whose signals arrived since the last statement.
    pub(crate) async fn drain_pending_traps(
        &mut self,
        params: &ExecutionParameters,
    ) -> Result<(), Error> {
        loop {
            let condition = {
                #[allow(clippy::unwrap_used)]
                let mut queue = self.pending_signals.lock().unwrap();
                queue.pop_front()
            };

            let Some(condition) = condition else {
                return Ok(());
            };

            let Some(handler) = self
                .traps
                .get_handler(condition)
                .filter(|h| !h.is_empty())
                .map(|h| h.to_owned())
            else {
                continue;
            };

            self.traps.handler_depth += 1;
            let result = self.run_string(handler.as_str(), params).await;
            self.traps.handler_depth -= 1;
            result?;
        }
    }

    /// Ensures a listener task is forwarding the given signal into the
    /// pending queue.
    pub(crate) fn ensure_signal_listener(&mut self, condition: TrapCondition) {
        let TrapCondition::Signal(signal) = condition else {
            return;
        };

        let signal_number = signal as i32;
        if !self.signal_listeners.insert(signal_number) {
            return;
        }

        let queue = Arc::clone(&self.pending_signals);
        match sys::signal_listener(signal) {
            Ok(mut listener) => {
                let task = tokio::spawn(async move {
                    while listener.recv().await.is_some() {
                        #[allow(clippy::unwrap_used)]
                        queue.lock().unwrap().push_back(condition);
                    }
                });
                self.listener_tasks.push(task);
            }
            Err(e) => {
                tracing::warn!("failed to install listener for {condition}: {e}");
            }
        }
    }

    /// Drops the registration for any coprocess whose FDs have all been
    /// closed.
    pub(crate) fn coproc_fd_closed(&mut self, fd: u32) {
        self.coprocs.retain(|coproc| {
            if coproc.read_fd != fd && coproc.write_fd != fd {
                return true;
            }

            // Keep the registration while its other FD remains open.
            let other = if coproc.read_fd == fd {
                coproc.write_fd
            } else {
                coproc.read_fd
            };
            self.open_files.contains(other)
        });
    }
}

fn first_line_of(script: &str) -> String {
    script.lines().next().unwrap_or("").to_owned()
}

/// A serialisable snapshot of a session's observable state.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionState {
    /// Variable names and their (stringified) values.
    pub variables: std::collections::BTreeMap<String, String>,
    /// Names of defined functions.
    pub functions: Vec<String>,
    /// Defined aliases.
    pub aliases: Vec<(String, String)>,
    /// Option flags.
    pub options: SessionOptions,
    /// The working directory.
    pub working_dir: PathBuf,
    /// The directory stack.
    pub dir_stack: Vec<PathBuf>,
    /// The last exit status.
    pub last_exit_status: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn run_simple_command() -> Result<()> {
        let mut session = Session::new()?;
        let outcome = session.run_script("echo hello").await?;

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout_str(), "hello\n");
        assert_eq!(outcome.kind, RunKind::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn state_persists_across_runs() -> Result<()> {
        let mut session = Session::new()?;

        session.run_script("x=42").await?;
        let outcome = session.run_script("echo $x").await?;
        assert_eq!(outcome.stdout_str(), "42\n");

        Ok(())
    }

    #[tokio::test]
    async fn exit_sets_run_kind() -> Result<()> {
        let mut session = Session::new()?;
        let outcome = session.run_script("exit 7; echo unreachable").await?;

        assert_eq!(outcome.exit_code, 7);
        assert_eq!(outcome.kind, RunKind::Exited);
        assert_eq!(outcome.stdout_str(), "");

        Ok(())
    }

    #[tokio::test]
    async fn syntax_errors_exit_2() -> Result<()> {
        let mut session = Session::new()?;
        let outcome = session.run_script("if then fi").await?;

        assert_eq!(outcome.exit_code, 2);
        assert!(outcome.stderr_str().contains("syntax error"));

        Ok(())
    }

    #[tokio::test]
    async fn subshell_does_not_leak_state() -> Result<()> {
        let mut session = Session::new()?;

        session.run_script("x=outer; (x=inner; echo $x)").await?;
        let outcome = session.run_script("echo $x").await?;
        assert_eq!(outcome.stdout_str(), "outer\n");

        Ok(())
    }

    #[tokio::test]
    async fn group_mutates_state() -> Result<()> {
        let mut session = Session::new()?;

        session.run_script("{ x=groupval; }").await?;
        let outcome = session.run_script("echo $x").await?;
        assert_eq!(outcome.stdout_str(), "groupval\n");

        Ok(())
    }
}
