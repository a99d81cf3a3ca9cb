use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{FunctionUpdate, StateDelta, VarUpdate};
use crate::error::Error;

/// Unsets variables and functions.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct UnsetCommand {
    /// Only unset functions.
    #[arg(short = 'f')]
    functions: bool,

    /// Only unset variables (the default when unambiguous).
    #[arg(short = 'v')]
    variables: bool,

    /// Unset namerefs themselves rather than their targets.
    #[arg(short = 'n')]
    namerefs: bool,

    names: Vec<String>,
}

impl BuiltinCommand for UnsetCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut delta = StateDelta::new();

        for name in &self.names {
            if self.functions {
                delta
                    .functions
                    .push(FunctionUpdate::Remove { name: name.clone() });
                continue;
            }

            // An indexed reference unsets one element.
            if let Some((base, index)) = split_array_reference(name.as_str()) {
                delta.vars.push(VarUpdate::UnsetIndex {
                    name: base.to_owned(),
                    index: index.to_owned(),
                });
                continue;
            }

            if self.namerefs {
                delta
                    .vars
                    .push(VarUpdate::UnsetNameref { name: name.clone() });
                continue;
            }

            // Without -v/-f, a variable is preferred; a function of the same
            // name goes away only if no variable exists.
            let variable_exists = context.session.env.get(name.as_str()).is_some();
            if variable_exists || self.variables {
                delta.vars.push(VarUpdate::Unset { name: name.clone() });
            } else if context.session.funcs.contains(name.as_str()) {
                delta
                    .functions
                    .push(FunctionUpdate::Remove { name: name.clone() });
            }
        }

        Ok(BuiltinResult::with_delta(delta))
    }
}

fn split_array_reference(name: &str) -> Option<(&str, &str)> {
    let open = name.find('[')?;
    let close = name.strip_suffix(']')?;
    Some((&name[..open], &close[open + 1..]))
}
