//! Batched session mutations. Built-in commands describe their state changes
//! as a [`StateDelta`]; the executor merges each batch into the session
//! atomically at statement granularity. Readonly violations reject the
//! offending name (with a diagnostic) without blocking the rest of the batch.

use std::path::PathBuf;
use std::sync::Arc;

use husk_parser::ast;

use crate::env::{EnvironmentLookup, EnvironmentScope};
use crate::error::{Error, ErrorKind};
use crate::openfiles::OpenFile;
use crate::session::Session;
use crate::traps::TrapCondition;
use crate::variables::{UnsetKind, ValueLiteral, Variable, VariableValue};

/// The scope a variable update applies to.
#[derive(Clone, Copy, Debug, Default)]
pub enum VarScope {
    /// The global scope.
    #[default]
    Global,
    /// The innermost function-local scope.
    Local,
}

/// A single attribute of a variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VarAttribute {
    /// `-x`
    Exported,
    /// `-r`
    Readonly,
    /// `-i`
    Integer,
    /// `-l`
    Lowercase,
    /// `-u`
    Uppercase,
    /// `-n`
    Nameref,
}

/// A pending variable mutation.
#[derive(Clone, Debug)]
pub enum VarUpdate {
    /// Assign and/or re-attribute a variable.
    Set {
        /// The variable name (nameref chains are followed on apply).
        name: String,
        /// The value to assign, if any.
        value: Option<ValueLiteral>,
        /// Whether to append (`+=`).
        append: bool,
        /// The target scope.
        scope: VarScope,
        /// Attributes to set.
        add_attrs: Vec<VarAttribute>,
        /// Attributes to clear.
        remove_attrs: Vec<VarAttribute>,
        /// Declare as an indexed array (`-a`).
        make_indexed: bool,
        /// Declare as an associative array (`-A`).
        make_associative: bool,
    },
    /// Assign to one element of an array variable.
    SetIndex {
        /// The variable name.
        name: String,
        /// The element index/key.
        index: String,
        /// The value.
        value: String,
        /// Whether to append.
        append: bool,
    },
    /// Unset a variable (following namerefs).
    Unset {
        /// The variable name.
        name: String,
    },
    /// Unset a nameref itself rather than its target (`unset -n`).
    UnsetNameref {
        /// The nameref name.
        name: String,
    },
    /// Unset one element of an array variable.
    UnsetIndex {
        /// The variable name.
        name: String,
        /// The element index/key.
        index: String,
    },
}

impl VarUpdate {
    /// Returns a plain scalar global assignment.
    pub fn scalar<N: Into<String>, V: Into<ValueLiteral>>(name: N, value: V) -> Self {
        Self::Set {
            name: name.into(),
            value: Some(value.into()),
            append: false,
            scope: VarScope::Global,
            add_attrs: vec![],
            remove_attrs: vec![],
            make_indexed: false,
            make_associative: false,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Set { name, .. }
            | Self::SetIndex { name, .. }
            | Self::Unset { name }
            | Self::UnsetNameref { name }
            | Self::UnsetIndex { name, .. } => name,
        }
    }
}

/// A pending function-table mutation.
#[derive(Clone)]
pub enum FunctionUpdate {
    /// Define (or replace) a function.
    Define {
        /// The function name.
        name: String,
        /// The function definition.
        definition: Arc<ast::FunctionDefinition>,
    },
    /// Remove a function.
    Remove {
        /// The function name.
        name: String,
    },
    /// Mark a function's export disposition.
    SetExported {
        /// The function name.
        name: String,
        /// Whether the function is exported.
        exported: bool,
    },
}

/// A pending export-environment mutation.
#[derive(Clone, Debug)]
pub enum EnvUpdate {
    /// Mark a variable exported, optionally assigning it first.
    Export(String, Option<String>),
    /// Clear a variable's export attribute.
    Unexport(String),
}

/// The option table an option update targets.
#[derive(Clone, Copy, Debug)]
pub enum OptionSetKind {
    /// `set -o` (and single-character flags).
    Set,
    /// `shopt`.
    Shopt,
}

/// A pending option flip.
#[derive(Clone, Debug)]
pub struct OptionUpdate {
    /// Which table the option lives in.
    pub kind: OptionSetKind,
    /// The option name.
    pub name: String,
    /// The new value.
    pub value: bool,
}

/// A pending job-table mutation.
#[derive(Clone, Copy, Debug)]
pub enum JobUpdate {
    /// Remove a job whose children have been reaped.
    Remove(usize),
    /// Remove a job and hand its children to the orphan supervisor.
    Disown(usize),
}

/// A pending FD-table mutation.
pub enum FdUpdate {
    /// Install a file at the given descriptor.
    Set(u32, OpenFile),
    /// Close the given descriptor.
    Close(u32),
}

/// A pending history mutation.
#[derive(Clone, Debug)]
pub enum HistoryUpdate {
    /// Clear all entries.
    Clear,
    /// Delete the entry at the given offset (negative counts from the end).
    Delete(i64),
    /// Append a new entry.
    Append(String),
}

/// A pending trap-table mutation.
#[derive(Clone, Debug)]
pub enum TrapUpdate {
    /// Install a handler (empty string ignores the condition).
    Register(TrapCondition, String),
    /// Restore the default disposition.
    Reset(TrapCondition),
}

/// A pending alias mutation.
#[derive(Clone, Debug)]
pub enum AliasUpdate {
    /// Define (or replace) an alias.
    Set(String, String),
    /// Remove an alias.
    Remove(String),
    /// Remove all aliases.
    Clear,
}

/// A batch of pending session mutations, applied atomically per statement.
#[derive(Default)]
pub struct StateDelta {
    /// Variable updates.
    pub vars: Vec<VarUpdate>,
    /// Function updates.
    pub functions: Vec<FunctionUpdate>,
    /// Export-environment updates.
    pub env: Vec<EnvUpdate>,
    /// Option flips.
    pub options: Vec<OptionUpdate>,
    /// A new working directory (with `OLDPWD`/`PWD` maintenance).
    pub working_dir: Option<PathBuf>,
    /// A replacement directory stack.
    pub dir_stack: Option<Vec<PathBuf>>,
    /// Replacement positional parameters.
    pub positional: Option<Vec<String>>,
    /// Job-table updates.
    pub jobs: Vec<JobUpdate>,
    /// FD-table updates.
    pub fds: Vec<FdUpdate>,
    /// History updates.
    pub history: Vec<HistoryUpdate>,
    /// Trap updates.
    pub traps: Vec<TrapUpdate>,
    /// Alias updates.
    pub aliases: Vec<AliasUpdate>,
}

impl StateDelta {
    /// Returns an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the batch contains no mutations.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
            && self.functions.is_empty()
            && self.env.is_empty()
            && self.options.is_empty()
            && self.working_dir.is_none()
            && self.dir_stack.is_none()
            && self.positional.is_none()
            && self.jobs.is_empty()
            && self.fds.is_empty()
            && self.history.is_empty()
            && self.traps.is_empty()
            && self.aliases.is_empty()
    }
}

/// Applies a delta to the session. Returns the diagnostics for any per-name
/// rejections (readonly violations and the like); an empty list means every
/// mutation applied.
pub(crate) fn apply(session: &mut Session, delta: StateDelta) -> Result<Vec<String>, Error> {
    let mut diagnostics = vec![];

    for update in delta.vars {
        if let Err(e) = apply_var_update(session, &update) {
            match e.kind() {
                ErrorKind::ReadonlyVariable(_) | ErrorKind::NotAnArray(_) => {
                    diagnostics.push(format!("{}: {e}", update.name()));
                }
                _ => return Err(e),
            }
        }
    }

    for update in delta.functions {
        match update {
            FunctionUpdate::Define { name, definition } => {
                session.funcs.define(name, definition);
            }
            FunctionUpdate::Remove { name } => {
                session.funcs.remove(name.as_str());
            }
            FunctionUpdate::SetExported { name, exported } => {
                session.funcs.set_exported(name.as_str(), exported);
            }
        }
    }

    for update in delta.env {
        match update {
            EnvUpdate::Export(name, value) => {
                if let Some(value) = value {
                    let result = session.env.update_or_add(
                        name.as_str(),
                        value.into(),
                        |var| {
                            var.export();
                            Ok(())
                        },
                        EnvironmentLookup::Anywhere,
                        EnvironmentScope::Global,
                    );
                    if let Err(e) = result {
                        diagnostics.push(format!("{name}: {e}"));
                    }
                } else if let Some((_, var)) = session.env.get_mut(name.as_str()) {
                    var.export();
                } else {
                    let mut var = Variable::new(VariableValue::Unset(UnsetKind::Untyped));
                    var.export();
                    session.env.add(name, var, EnvironmentScope::Global)?;
                }
            }
            EnvUpdate::Unexport(name) => {
                if let Some((_, var)) = session.env.get_mut(name.as_str()) {
                    var.unexport();
                }
            }
        }
    }

    for update in delta.options {
        let def = match update.kind {
            OptionSetKind::Set => {
                crate::options::namedoptions::find_set_option(update.name.as_str())
            }
            OptionSetKind::Shopt => {
                crate::options::namedoptions::find_shopt_option(update.name.as_str())
            }
        };

        match def {
            Some(def) => (def.set)(&mut session.options, update.value),
            None => diagnostics.push(format!("{}: invalid option name", update.name)),
        }
    }

    if let Some(new_dir) = delta.working_dir {
        session.set_working_dir_internal(new_dir)?;
    }

    if let Some(stack) = delta.dir_stack {
        session.dir_stack = stack;
    }

    if let Some(positional) = delta.positional {
        session.positional_params = positional;
    }

    for update in delta.jobs {
        match update {
            JobUpdate::Remove(id) => {
                session.jobs.remove(id);
            }
            JobUpdate::Disown(id) => {
                if let Some(job) = session.jobs.remove(id) {
                    crate::orphans::adopt(job);
                }
            }
        }
    }

    for update in delta.fds {
        match update {
            FdUpdate::Set(fd, file) => {
                session.open_files.set(fd, file);
            }
            FdUpdate::Close(fd) => {
                session.open_files.remove(fd);
                session.coproc_fd_closed(fd);
            }
        }
    }

    for update in delta.history {
        match update {
            HistoryUpdate::Clear => session.history.clear(),
            HistoryUpdate::Delete(offset) => {
                if session.history.delete_at_offset(offset).is_err() {
                    diagnostics.push(format!("history position out of range: {offset}"));
                }
            }
            HistoryUpdate::Append(line) => session.history.add(line),
        }
    }

    for update in delta.traps {
        match update {
            TrapUpdate::Register(condition, command) => {
                session.traps.register_handler(condition, command);
            }
            TrapUpdate::Reset(condition) => {
                session.traps.remove_handler(condition);
            }
        }
    }

    for update in delta.aliases {
        match update {
            AliasUpdate::Set(name, replacement) => {
                session.aliases.insert(name, replacement);
            }
            AliasUpdate::Remove(name) => {
                session.aliases.shift_remove(name.as_str());
            }
            AliasUpdate::Clear => session.aliases.clear(),
        }
    }

    Ok(diagnostics)
}

fn apply_var_update(session: &mut Session, update: &VarUpdate) -> Result<(), Error> {
    match update {
        VarUpdate::Set {
            name,
            value,
            append,
            scope,
            add_attrs,
            remove_attrs,
            make_indexed,
            make_associative,
        } => {
            let resolved = if add_attrs.contains(&VarAttribute::Nameref) {
                name.clone()
            } else {
                session.env.resolve_name(name.as_str())?
            };

            let target_scope = match scope {
                VarScope::Global => EnvironmentScope::Global,
                VarScope::Local => EnvironmentScope::Local,
            };

            let existing_matches = session
                .env
                .get(resolved.as_str())
                .is_some_and(|(found_scope, _)| match scope {
                    VarScope::Global => true,
                    VarScope::Local => found_scope == EnvironmentScope::Local,
                });

            if !existing_matches {
                let initial = if *make_associative {
                    VariableValue::Unset(UnsetKind::AssociativeArray)
                } else if *make_indexed {
                    VariableValue::Unset(UnsetKind::IndexedArray)
                } else {
                    VariableValue::Unset(UnsetKind::Untyped)
                };
                session
                    .env
                    .add(resolved.clone(), Variable::new(initial), target_scope)?;
            }

            let Some((_, var)) = session.env.get_mut(resolved.as_str()) else {
                return Ok(());
            };

            if var.is_readonly() && (value.is_some() || remove_attrs.contains(&VarAttribute::Readonly))
            {
                return Err(ErrorKind::ReadonlyVariable(resolved).into());
            }

            if *make_associative {
                var.convert_to_associative_array()?;
            } else if *make_indexed {
                var.convert_to_indexed_array()?;
            }

            // Attribute changes apply before the assignment so value
            // transforms (integer, case) take effect.
            for attr in add_attrs {
                match attr {
                    VarAttribute::Exported => {
                        var.export();
                    }
                    VarAttribute::Readonly => (),
                    VarAttribute::Integer => {
                        var.set_integer(true);
                    }
                    VarAttribute::Lowercase => {
                        var.set_lowercase(true);
                    }
                    VarAttribute::Uppercase => {
                        var.set_uppercase(true);
                    }
                    VarAttribute::Nameref => {
                        var.set_nameref(true);
                    }
                }
            }
            for attr in remove_attrs {
                match attr {
                    VarAttribute::Exported => {
                        var.unexport();
                    }
                    VarAttribute::Readonly => (),
                    VarAttribute::Integer => {
                        var.set_integer(false);
                    }
                    VarAttribute::Lowercase => {
                        var.set_lowercase(false);
                    }
                    VarAttribute::Uppercase => {
                        var.set_uppercase(false);
                    }
                    VarAttribute::Nameref => {
                        var.set_nameref(false);
                    }
                }
            }

            if let Some(value) = value {
                var.assign(value.clone(), *append)?;
            }

            // Readonly is applied last so the assignment above still lands.
            if add_attrs.contains(&VarAttribute::Readonly) {
                var.set_readonly();
            }

            Ok(())
        }
        VarUpdate::SetIndex {
            name,
            index,
            value,
            append,
        } => session.env.update_or_add_array_element(
            name.as_str(),
            index.clone(),
            value.clone(),
            *append,
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        ),
        VarUpdate::Unset { name } => {
            session.env.unset(name.as_str(), false)?;
            Ok(())
        }
        VarUpdate::UnsetNameref { name } => {
            session.env.unset(name.as_str(), true)?;
            Ok(())
        }
        VarUpdate::UnsetIndex { name, index } => {
            session.env.unset_index(name.as_str(), index.as_str())?;
            Ok(())
        }
    }
}
