//! Seeding of well-known shell variables at session creation.

use crate::env::EnvironmentScope;
use crate::error::Error;
use crate::session::Session;
use crate::variables::{Variable, VariableValue};

/// Imports the process environment as exported scalar variables.
pub(crate) fn inherit_process_env(session: &mut Session) -> Result<(), Error> {
    for (name, value) in std::env::vars() {
        if !crate::env::valid_variable_name(name.as_str()) {
            continue;
        }

        let mut var = Variable::new(value);
        var.export();
        session
            .env
            .add(name, var, EnvironmentScope::Global)?;
    }

    Ok(())
}

/// Seeds the well-known variables a script expects to find.
pub(crate) fn init_well_known_vars(session: &mut Session) -> Result<(), Error> {
    let set_if_unset = |session: &mut Session, name: &str, value: &str| -> Result<(), Error> {
        if session.env.get(name).is_none() {
            session.env.set_global(name, value)?;
        }
        Ok(())
    };

    set_if_unset(session, "PATH", "/usr/local/bin:/usr/bin:/bin")?;
    set_if_unset(session, "IFS", " \t\n")?;
    set_if_unset(session, "PS1", "$ ")?;
    set_if_unset(session, "PS2", "> ")?;
    set_if_unset(session, "PS4", "+ ")?;
    set_if_unset(session, "OPTIND", "1")?;
    set_if_unset(session, "OPTERR", "1")?;

    let pwd = session.working_dir.to_string_lossy().to_string();
    session.env.set_global("PWD", pwd.as_str())?;
    set_if_unset(session, "OLDPWD", pwd.as_str())?;

    if session.env.get("HOSTNAME").is_none() {
        if let Ok(hostname) = hostname::get() {
            session
                .env
                .set_global("HOSTNAME", hostname.to_string_lossy().as_ref())?;
        }
    }

    if session.env.get("HOME").is_none() {
        if let Some(home) = crate::sys::current_user_home_dir() {
            session
                .env
                .set_global("HOME", home.to_string_lossy().as_ref())?;
        }
    }

    set_dynamic(session, "RANDOM", |_session| {
        VariableValue::Scalar((rand::random::<u32>() % 32768).to_string())
    })?;

    set_dynamic(session, "SECONDS", |session| {
        let elapsed = session
            .started_at
            .elapsed()
            .map_or(0, |elapsed| elapsed.as_secs());
        VariableValue::Scalar(elapsed.to_string())
    })?;

    set_dynamic(session, "LINENO", |session| {
        VariableValue::Scalar(session.current_line.to_string())
    })?;

    set_dynamic(session, "FUNCNAME", |session| {
        VariableValue::indexed_from_strings(session.call_stack.function_names())
    })?;

    set_dynamic(session, "BASH_LINENO", |session| {
        VariableValue::indexed_from_strings(
            session
                .call_stack
                .iter()
                .map(|frame| frame.call_line.to_string()),
        )
    })?;

    set_dynamic(session, "PIPESTATUS", |session| {
        VariableValue::indexed_from_strings(
            session
                .last_pipeline_statuses
                .iter()
                .map(|code| code.to_string()),
        )
    })?;

    set_dynamic(session, "UID", |_session| {
        VariableValue::Scalar(nix::unistd::getuid().as_raw().to_string())
    })?;

    set_dynamic(session, "EUID", |_session| {
        VariableValue::Scalar(nix::unistd::geteuid().as_raw().to_string())
    })?;

    Ok(())
}

fn set_dynamic(
    session: &mut Session,
    name: &str,
    getter: fn(&Session) -> VariableValue,
) -> Result<(), Error> {
    let mut var = Variable::new(VariableValue::Dynamic(getter));
    var.hide();
    session.env.add(name.to_owned(), var, EnvironmentScope::Global)
}
