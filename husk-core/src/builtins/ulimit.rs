use std::io::Write;

use clap::Parser;

use crate::builtins::{BuiltinCommand, BuiltinContext, BuiltinResult};
use crate::error::Error;
use crate::results::BuiltinExitCode;

/// Gets or sets resource limits.
#[derive(Parser)]
#[clap(disable_help_flag = true, disable_version_flag = true)]
pub(crate) struct UlimitCommand {
    /// Report all limits.
    #[arg(short = 'a')]
    all: bool,

    /// Core file size (blocks).
    #[arg(short = 'c')]
    core: bool,

    /// File size (blocks).
    #[arg(short = 'f')]
    fsize: bool,

    /// Open file descriptors.
    #[arg(short = 'n')]
    nofile: bool,

    /// Stack size (kbytes).
    #[arg(short = 's')]
    stack: bool,

    /// CPU time (seconds).
    #[arg(short = 't')]
    cpu: bool,

    /// Processes.
    #[arg(short = 'u')]
    nproc: bool,

    /// Virtual memory (kbytes).
    #[arg(short = 'v')]
    vmem: bool,

    /// A new (soft) limit value, or `unlimited`.
    value: Option<String>,
}

struct LimitSpec {
    resource: rlimit::Resource,
    description: &'static str,
    flag: char,
    divisor: u64,
}

const LIMITS: &[LimitSpec] = &[
    LimitSpec {
        resource: rlimit::Resource::CORE,
        description: "core file size (blocks)",
        flag: 'c',
        divisor: 512,
    },
    LimitSpec {
        resource: rlimit::Resource::FSIZE,
        description: "file size (blocks)",
        flag: 'f',
        divisor: 512,
    },
    LimitSpec {
        resource: rlimit::Resource::NOFILE,
        description: "open files",
        flag: 'n',
        divisor: 1,
    },
    LimitSpec {
        resource: rlimit::Resource::STACK,
        description: "stack size (kbytes)",
        flag: 's',
        divisor: 1024,
    },
    LimitSpec {
        resource: rlimit::Resource::CPU,
        description: "cpu time (seconds)",
        flag: 't',
        divisor: 1,
    },
    LimitSpec {
        resource: rlimit::Resource::NPROC,
        description: "max user processes",
        flag: 'u',
        divisor: 1,
    },
    LimitSpec {
        resource: rlimit::Resource::AS,
        description: "virtual memory (kbytes)",
        flag: 'v',
        divisor: 1024,
    },
];

impl UlimitCommand {
    fn selected(&self) -> Vec<&'static LimitSpec> {
        let mut selected = vec![];
        for spec in LIMITS {
            let requested = match spec.flag {
                'c' => self.core,
                'f' => self.fsize,
                'n' => self.nofile,
                's' => self.stack,
                't' => self.cpu,
                'u' => self.nproc,
                'v' => self.vmem,
                _ => false,
            };
            if requested {
                selected.push(spec);
            }
        }
        selected
    }
}

impl BuiltinCommand for UlimitCommand {
    async fn execute(&self, context: &mut BuiltinContext<'_>) -> Result<BuiltinResult, Error> {
        let mut stdout = context.stdout();

        if self.all {
            for spec in LIMITS {
                let (soft, _) = spec.resource.get()?;
                writeln!(
                    stdout,
                    "{:<28}(-{})  {}",
                    spec.description,
                    spec.flag,
                    format_limit(soft, spec.divisor)
                )?;
            }
            return Ok(BuiltinResult::success());
        }

        let selected = self.selected();

        // With no flags, -f is implied.
        let spec = selected.first().copied().unwrap_or(&LIMITS[1]);

        match &self.value {
            None => {
                let (soft, _) = spec.resource.get()?;
                writeln!(stdout, "{}", format_limit(soft, spec.divisor))?;
                Ok(BuiltinResult::success())
            }
            Some(value) => {
                let new_soft = if value == "unlimited" {
                    rlimit::INFINITY
                } else {
                    match value.parse::<u64>() {
                        Ok(n) => n.saturating_mul(spec.divisor),
                        Err(_) => {
                            drop(stdout);
                            let mut stderr = context.stderr();
                            writeln!(stderr, "husk: ulimit: {value}: invalid number")?;
                            return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                        }
                    }
                };

                let (_, hard) = spec.resource.get()?;
                if spec.resource.set(new_soft, hard).is_err() {
                    drop(stdout);
                    let mut stderr = context.stderr();
                    writeln!(stderr, "husk: ulimit: cannot modify limit")?;
                    return Ok(BuiltinResult::exit(BuiltinExitCode::Custom(1)));
                }

                Ok(BuiltinResult::success())
            }
        }
    }
}

fn format_limit(value: u64, divisor: u64) -> String {
    if value == rlimit::INFINITY {
        String::from("unlimited")
    } else {
        (value / divisor).to_string()
    }
}
