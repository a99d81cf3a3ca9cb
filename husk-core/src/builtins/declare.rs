use std::io::Write;

use clap::Parser;

use crate::builtins::{
    BuiltinCommand, BuiltinContext, BuiltinDeclarationCommand, BuiltinResult,
};
use crate::commands::CommandArg;
use crate::delta::{StateDelta, VarAttribute, VarScope, VarUpdate};
use crate::error::Error;
use crate::results::BuiltinExitCode;
use crate::variables::{ArrayLiteral, ValueLiteral, Variable};
use husk_parser::ast;

/// Declares variables and applies attributes.
#[derive(Default, Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct DeclareCommand {
    /// Declare indexed arrays.
    #[arg(short = 'a')]
    make_indexed: bool,

    /// Declare associative arrays.
    #[arg(short = 'A')]
    make_associative: bool,

    /// Operate on functions instead of variables.
    #[arg(short = 'f')]
    functions: bool,

    /// Print function names only.
    #[arg(short = 'F')]
    function_names_only: bool,

    /// Declare at global scope even inside a function.
    #[arg(short = 'g')]
    create_global: bool,

    /// Apply the integer attribute.
    #[arg(short = 'i')]
    make_integer: bool,

    /// Apply the lowercase attribute.
    #[arg(short = 'l')]
    make_lowercase: bool,

    /// Apply the nameref attribute.
    #[arg(short = 'n')]
    make_nameref: bool,

    /// Print declarations rather than setting them.
    #[arg(short = 'p')]
    print: bool,

    /// Apply the readonly attribute.
    #[arg(short = 'r')]
    make_readonly: bool,

    /// Apply the uppercase attribute.
    #[arg(short = 'u')]
    make_uppercase: bool,

    /// Apply the export attribute.
    #[arg(short = 'x')]
    make_exported: bool,

    /// Clear the integer attribute.
    #[arg(long = "+i", hide = true)]
    clear_integer: bool,

    /// Clear the lowercase attribute.
    #[arg(long = "+l", hide = true)]
    clear_lowercase: bool,

    /// Clear the nameref attribute.
    #[arg(long = "+n", hide = true)]
    clear_nameref: bool,

    /// Clear the uppercase attribute.
    #[arg(long = "+u", hide = true)]
    clear_uppercase: bool,

    /// Clear the export attribute.
    #[arg(long = "+x", hide = true)]
    clear_exported: bool,

    #[clap(skip)]
    declarations: Vec<CommandArg>,

    #[clap(skip)]
    force_readonly: bool,
}

impl BuiltinDeclarationCommand for DeclareCommand {
    fn set_declarations(&mut self, declarations: Vec<CommandArg>) {
        self.declarations = declarations;
    }
}

impl BuiltinCommand for DeclareCommand {
    fn takes_plus_options() -> bool {
        true
    }

    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let make_readonly = self.make_readonly || self.force_readonly;

        if self.functions || self.function_names_only {
            return self.execute_for_functions(context);
        }

        // With no declarations, declare/declare -p list everything; a bare
        // `readonly` lists only readonly variables.
        if self.declarations.is_empty() {
            self.print_matching_variables(context, self.force_readonly)?;
            return Ok(BuiltinResult::success());
        }

        if self.print {
            let mut any_missing = false;
            for declaration in &self.declarations {
                let name = declaration.to_string();
                if !print_variable(context, name.as_str())? {
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: declare: {name}: not found")?;
                    any_missing = true;
                }
            }
            let exit = if any_missing {
                BuiltinExitCode::Custom(1)
            } else {
                BuiltinExitCode::Success
            };
            return Ok(BuiltinResult::exit(exit));
        }

        let scope = self.resolve_scope(context);

        let mut delta = StateDelta::new();
        let mut add_attrs = vec![];
        let mut remove_attrs = vec![];

        if self.make_exported {
            add_attrs.push(VarAttribute::Exported);
        }
        if make_readonly {
            add_attrs.push(VarAttribute::Readonly);
        }
        if self.make_integer {
            add_attrs.push(VarAttribute::Integer);
        }
        if self.make_lowercase {
            add_attrs.push(VarAttribute::Lowercase);
        }
        if self.make_uppercase {
            add_attrs.push(VarAttribute::Uppercase);
        }
        if self.make_nameref {
            add_attrs.push(VarAttribute::Nameref);
        }

        if self.clear_exported {
            remove_attrs.push(VarAttribute::Exported);
        }
        if self.clear_integer {
            remove_attrs.push(VarAttribute::Integer);
        }
        if self.clear_lowercase {
            remove_attrs.push(VarAttribute::Lowercase);
        }
        if self.clear_uppercase {
            remove_attrs.push(VarAttribute::Uppercase);
        }
        if self.clear_nameref {
            remove_attrs.push(VarAttribute::Nameref);
        }

        for declaration in &self.declarations {
            match declaration {
                CommandArg::Assignment(assignment) => {
                    push_assignment_update(
                        &mut delta,
                        assignment,
                        scope,
                        add_attrs.clone(),
                        remove_attrs.clone(),
                        self.make_indexed,
                        self.make_associative,
                    );
                }
                CommandArg::String(s) => {
                    // A plain string may still carry an assignment (e.g. when
                    // re-invoked through `builtin` or `eval`); otherwise it
                    // declares (or re-attributes) a bare name.
                    let (name, value) = match s.split_once('=') {
                        Some((name, value)) => {
                            (name.to_owned(), Some(ValueLiteral::Scalar(value.to_owned())))
                        }
                        None => (s.clone(), None),
                    };

                    delta.vars.push(VarUpdate::Set {
                        name,
                        value,
                        append: false,
                        scope,
                        add_attrs: add_attrs.clone(),
                        remove_attrs: remove_attrs.clone(),
                        make_indexed: self.make_indexed,
                        make_associative: self.make_associative,
                    });
                }
            }
        }

        Ok(BuiltinResult::with_delta(delta))
    }
}

impl DeclareCommand {
    fn resolve_scope(&self, context: &BuiltinContext<'_>) -> VarScope {
        if self.create_global {
            VarScope::Global
        } else if context.command_name == "local"
            || (context.command_name == "declare" && context.session.env.in_local_scope())
            || (context.command_name == "typeset" && context.session.env.in_local_scope())
        {
            VarScope::Local
        } else {
            VarScope::Global
        }
    }

    fn execute_for_functions(
        &self,
        context: &mut BuiltinContext<'_>,
    ) -> Result<BuiltinResult, Error> {
        let mut stdout = context.stdout();

        if self.declarations.is_empty() {
            let mut names: Vec<_> = context
                .session
                .funcs
                .iter()
                .map(|(name, registration)| (name.clone(), registration.definition.clone()))
                .collect();
            names.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, definition) in names {
                if self.function_names_only {
                    writeln!(stdout, "declare -f {name}")?;
                } else {
                    writeln!(stdout, "{definition}")?;
                }
            }
            return Ok(BuiltinResult::success());
        }

        let mut any_missing = false;
        for declaration in &self.declarations {
            let name = declaration.to_string();
            match context.session.funcs.get(name.as_str()) {
                Some(registration) => {
                    if self.function_names_only {
                        writeln!(stdout, "declare -f {name}")?;
                    } else {
                        writeln!(stdout, "{}", registration.definition())?;
                    }
                }
                None => any_missing = true,
            }
        }

        let exit = if any_missing {
            BuiltinExitCode::Custom(1)
        } else {
            BuiltinExitCode::Success
        };
        Ok(BuiltinResult::exit(exit))
    }

    fn print_matching_variables(
        &self,
        context: &mut BuiltinContext<'_>,
        readonly_only: bool,
    ) -> Result<(), Error> {
        let mut entries: Vec<(String, &Variable)> = context
            .session
            .env
            .iter()
            .filter(|(_, var)| !var.is_hidden())
            .filter(|(_, var)| !readonly_only || var.is_readonly())
            .map(|(name, var)| (name.clone(), var))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut stdout = context.stdout();
        for (name, var) in entries {
            writeln!(stdout, "{}", format_declaration(name.as_str(), var)?)?;
        }

        Ok(())
    }
}

fn print_variable(context: &mut BuiltinContext<'_>, name: &str) -> Result<bool, Error> {
    let Some((_, var)) = context.session.env.get(name) else {
        return Ok(false);
    };

    let line = format_declaration(name, var)?;
    let mut stdout = context.stdout();
    writeln!(stdout, "{line}")?;
    Ok(true)
}

/// Formats a variable as a re-evaluable `declare` command.
pub(crate) fn format_declaration(name: &str, var: &Variable) -> Result<String, Error> {
    let mut flags = var.attribute_flags();
    if flags.is_empty() {
        flags.push('-');
    }

    let value = var.value().format_for_declare()?;
    if value.is_empty() {
        Ok(format!("declare -{flags} {name}"))
    } else {
        Ok(format!("declare -{flags} {name}={value}"))
    }
}

pub(super) fn push_assignment_update(
    delta: &mut StateDelta,
    assignment: &ast::Assignment,
    scope: VarScope,
    add_attrs: Vec<VarAttribute>,
    remove_attrs: Vec<VarAttribute>,
    make_indexed: bool,
    make_associative: bool,
) {
    match &assignment.target {
        ast::AssignmentTarget::Variable(name) => {
            let value = match &assignment.value {
                ast::AssignmentValue::Scalar(word) => ValueLiteral::Scalar(word.text.clone()),
                ast::AssignmentValue::Array(elements) => ValueLiteral::Array(ArrayLiteral(
                    elements
                        .iter()
                        .map(|(key, value)| {
                            (key.as_ref().map(|k| k.text.clone()), value.text.clone())
                        })
                        .collect(),
                )),
            };

            delta.vars.push(VarUpdate::Set {
                name: name.clone(),
                value: Some(value),
                append: assignment.append,
                scope,
                add_attrs,
                remove_attrs,
                make_indexed,
                make_associative,
            });
        }
        ast::AssignmentTarget::ArrayElement(name, index) => {
            let value = match &assignment.value {
                ast::AssignmentValue::Scalar(word) => word.text.clone(),
                ast::AssignmentValue::Array(_) => String::new(),
            };

            delta.vars.push(VarUpdate::SetIndex {
                name: name.clone(),
                index: index.clone(),
                value,
                append: assignment.append,
            });
        }
    }
}

/// `readonly`: declare with the readonly attribute forced on.
#[derive(Default, Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct ReadonlyCommand {
    /// Operate on functions.
    #[arg(short = 'f')]
    functions: bool,

    /// Print readonly declarations.
    #[arg(short = 'p')]
    print: bool,

    /// Declare indexed arrays.
    #[arg(short = 'a')]
    make_indexed: bool,

    /// Declare associative arrays.
    #[arg(short = 'A')]
    make_associative: bool,

    #[clap(skip)]
    declarations: Vec<CommandArg>,
}

impl BuiltinDeclarationCommand for ReadonlyCommand {
    fn set_declarations(&mut self, declarations: Vec<CommandArg>) {
        self.declarations = declarations;
    }
}

impl BuiltinCommand for ReadonlyCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let inner = DeclareCommand {
            make_indexed: self.make_indexed,
            make_associative: self.make_associative,
            functions: false,
            print: self.print,
            force_readonly: true,
            declarations: self.declarations.clone(),
            ..DeclareCommand::default()
        };

        inner.execute(context).await
    }
}

/// `local`: declare in the current function scope.
#[derive(Default, Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct LocalCommand {
    /// Declare indexed arrays.
    #[arg(short = 'a')]
    make_indexed: bool,

    /// Declare associative arrays.
    #[arg(short = 'A')]
    make_associative: bool,

    /// Apply the integer attribute.
    #[arg(short = 'i')]
    make_integer: bool,

    /// Apply the nameref attribute.
    #[arg(short = 'n')]
    make_nameref: bool,

    /// Apply the readonly attribute.
    #[arg(short = 'r')]
    make_readonly: bool,

    /// Apply the export attribute.
    #[arg(short = 'x')]
    make_exported: bool,

    #[clap(skip)]
    declarations: Vec<CommandArg>,
}

impl BuiltinDeclarationCommand for LocalCommand {
    fn set_declarations(&mut self, declarations: Vec<CommandArg>) {
        self.declarations = declarations;
    }
}

impl BuiltinCommand for LocalCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if !context.session.env.in_local_scope() {
            let mut stderr = context.stderr();
            writeln!(stderr, "husk: local: can only be used in a function")?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        }

        let inner = DeclareCommand {
            make_indexed: self.make_indexed,
            make_associative: self.make_associative,
            make_integer: self.make_integer,
            make_nameref: self.make_nameref,
            make_readonly: self.make_readonly,
            make_exported: self.make_exported,
            declarations: self.declarations.clone(),
            ..DeclareCommand::default()
        };

        inner.execute(context).await
    }
}
