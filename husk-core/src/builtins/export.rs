use std::io::Write;

use clap::Parser;

use crate::builtins::{
    BuiltinCommand, BuiltinContext, BuiltinDeclarationCommand, BuiltinResult, declare,
};
use crate::commands::CommandArg;
use crate::delta::{EnvUpdate, FunctionUpdate, StateDelta, VarAttribute, VarScope};
use crate::error::Error;
use crate::escape;

/// Marks variables (or functions) for export.
#[derive(Default, Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct ExportCommand {
    /// Operate on functions.
    #[arg(short = 'f')]
    functions: bool,

    /// Remove the export attribute instead of adding it.
    #[arg(short = 'n')]
    unexport: bool,

    /// Print exported names in a re-evaluable form.
    #[arg(short = 'p')]
    print: bool,

    #[clap(skip)]
    declarations: Vec<CommandArg>,
}

impl BuiltinDeclarationCommand for ExportCommand {
    fn set_declarations(&mut self, declarations: Vec<CommandArg>) {
        self.declarations = declarations;
    }
}

impl BuiltinCommand for ExportCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        if self.print || self.declarations.is_empty() {
            let mut entries: Vec<(String, String)> = context
                .session
                .env
                .iter_exported()
                .map(|(name, var)| (name.clone(), var.value().as_str().into_owned()))
                .collect();
            entries.sort();

            let mut stdout = context.stdout();
            for (name, value) in entries {
                writeln!(
                    stdout,
                    "export {name}={}",
                    escape::force_quote(value.as_str(), escape::QuoteMode::DoubleQuote)
                )?;
            }

            return Ok(BuiltinResult::success());
        }

        let mut delta = StateDelta::new();

        for declaration in &self.declarations {
            match declaration {
                CommandArg::Assignment(assignment) => {
                    let (add, remove) = if self.unexport {
                        (vec![], vec![VarAttribute::Exported])
                    } else {
                        (vec![VarAttribute::Exported], vec![])
                    };
                    declare::push_assignment_update(
                        &mut delta,
                        assignment,
                        VarScope::Global,
                        add,
                        remove,
                        false,
                        false,
                    );
                }
                CommandArg::String(name) => {
                    if self.functions {
                        delta.functions.push(FunctionUpdate::SetExported {
                            name: name.clone(),
                            exported: !self.unexport,
                        });
                    } else if self.unexport {
                        delta.env.push(EnvUpdate::Unexport(name.clone()));
                    } else {
                        delta.env.push(EnvUpdate::Export(name.clone(), None));
                    }
                }
            }
        }

        Ok(BuiltinResult::with_delta(delta))
    }
}
