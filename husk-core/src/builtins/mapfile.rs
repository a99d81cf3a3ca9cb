use std::io::{Read as _, Write};

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::delta::{StateDelta, VarUpdate};
use crate::error::Error;
use crate::results::BuiltinExitCode;
use crate::variables::{ArrayLiteral, ValueLiteral};

/// Reads lines from input into an indexed array.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct MapfileCommand {
    /// Strip the trailing delimiter from each line.
    #[arg(short = 't')]
    strip_delimiter: bool,

    /// Read at most this many lines (0 = all).
    #[arg(short = 'n', value_name = "COUNT", default_value = "0")]
    max_count: usize,

    /// Skip this many lines before storing.
    #[arg(short = 's', value_name = "COUNT", default_value = "0")]
    skip: usize,

    /// Begin storing at this array index.
    #[arg(short = 'O', value_name = "ORIGIN", default_value = "0")]
    origin: u64,

    /// Use this delimiter instead of newline.
    #[arg(short = 'd', value_name = "DELIM")]
    delimiter: Option<String>,

    /// Invoke the callback every QUANTUM lines.
    #[arg(short = 'c', value_name = "QUANTUM", default_value = "5000")]
    quantum: usize,

    /// Shell code run before each QUANTUM boundary, passed the next index.
    #[arg(short = 'C', value_name = "CALLBACK")]
    callback: Option<String>,

    /// Read from this file descriptor.
    #[arg(short = 'u', value_name = "FD")]
    fd: Option<u32>,

    /// The target array; defaults to MAPFILE.
    array_name: Option<String>,
}

impl BuiltinCommand for MapfileCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let fd = self.fd.unwrap_or(0);
        let input = context.params.fd(fd).or_else(|| {
            context
                .session
                .open_files
                .get(fd)
                .and_then(|f| f.try_dup().ok())
        });
        let Some(mut input) = input else {
            let mut stderr = context.stderr();
            writeln!(
                stderr,
                "husk: {}: {fd}: invalid file descriptor",
                context.command_name
            )?;
            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
        };

        let delimiter = self
            .delimiter
            .as_ref()
            .and_then(|d| d.bytes().next())
            .unwrap_or(b'\n');

        let mut contents = Vec::new();
        input.read_to_end(&mut contents)?;

        let mut lines: Vec<String> = vec![];
        for chunk in contents.split_inclusive(|b| *b == delimiter) {
            let mut line = String::from_utf8_lossy(chunk).into_owned();
            if self.strip_delimiter && line.as_bytes().last() == Some(&delimiter) {
                line.pop();
            }
            lines.push(line);
        }

        let lines: Vec<String> = lines
            .into_iter()
            .skip(self.skip)
            .take(if self.max_count == 0 {
                usize::MAX
            } else {
                self.max_count
            })
            .collect();

        // Fire the callback at quantum boundaries before storing.
        if let Some(callback) = &self.callback {
            let params = context.params.clone();
            for (i, line) in lines.iter().enumerate() {
                if self.quantum > 0 && i % self.quantum == 0 && i > 0 {
                    let script = format!(
                        "{callback} {} {}",
                        self.origin + i as u64,
                        crate::escape::force_quote(
                            line.as_str(),
                            crate::escape::QuoteMode::SingleQuote
                        )
                    );
                    context.session.run_string(script.as_str(), &params).await?;
                }
            }
        }

        let array_name = self
            .array_name
            .clone()
            .unwrap_or_else(|| String::from("MAPFILE"));

        let elements: Vec<(Option<String>, String)> = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| (Some((self.origin + i as u64).to_string()), line))
            .collect();

        let mut delta = StateDelta::new();
        delta.vars.push(VarUpdate::Set {
            name: array_name,
            value: Some(ValueLiteral::Array(ArrayLiteral(elements))),
            append: false,
            scope: crate::delta::VarScope::Global,
            add_attrs: vec![],
            remove_attrs: vec![],
            make_indexed: true,
            make_associative: false,
        });

        Ok(BuiltinResult::with_delta(delta))
    }
}
