//! Runtime option flags (`set`, `set -o`, `shopt`).

/// The mutable option flags of a session.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionOptions {
    //
    // `set` options (single-character flags).
    /// -a: export variables on assignment.
    pub allexport: bool,
    /// -b: report job termination immediately.
    pub notify: bool,
    /// -e: exit on a non-zero command status.
    pub errexit: bool,
    /// -f: disable pathname expansion.
    pub noglob: bool,
    /// -h: remember command locations as they are looked up.
    pub hashall: bool,
    /// -m: job control.
    pub monitor: bool,
    /// -n: read commands without executing them.
    pub noexec: bool,
    /// -t: exit after one command.
    pub onecmd: bool,
    /// -u: treat unset variables as an error during expansion.
    pub nounset: bool,
    /// -v: echo input lines as they are read.
    pub verbose: bool,
    /// -x: trace commands after expansion.
    pub xtrace: bool,
    /// -C: disallow overwriting regular files with `>`.
    pub noclobber: bool,

    //
    // `set -o` options without a flag character.
    /// A pipeline's status is its last non-zero stage's status.
    pub pipefail: bool,

    //
    // shopt options.
    /// Recognize extended glob patterns.
    pub extglob: bool,
    /// Non-matching globs expand to nothing.
    pub nullglob: bool,
    /// Globs match dot files.
    pub dotglob: bool,
    /// `**` matches across directory separators.
    pub globstar: bool,
    /// `source` searches `$PATH`.
    pub sourcepath: bool,
    /// Multi-line commands are saved as single history entries.
    pub cmdhist: bool,
    /// Aliases are expanded.
    pub expand_aliases: bool,
    /// `echo` expands backslash escapes by default.
    pub xpg_echo: bool,
    /// History recording is enabled.
    pub history: bool,
}

impl SessionOptions {
    /// Returns the defaults for a fresh non-interactive session.
    pub fn defaults() -> Self {
        Self {
            hashall: true,
            extglob: true,
            sourcepath: true,
            cmdhist: true,
            expand_aliases: true,
            history: true,
            ..Self::default()
        }
    }

    /// Returns the current single-character flag string (the value of `$-`).
    pub fn flag_string(&self) -> String {
        let mut flags = String::new();

        for def in namedoptions::SET_OPTIONS {
            if let Some(flag) = def.flag {
                if (def.get)(self) {
                    flags.push(flag);
                }
            }
        }

        flags
    }
}

pub(crate) mod namedoptions {
    //! Name and flag tables for the option sets.

    use super::SessionOptions;

    /// Accessors for a single named option.
    pub(crate) struct OptionDefinition {
        /// The `set -o` / `shopt` name.
        pub name: &'static str,
        /// The single-character `set` flag, if one exists.
        pub flag: Option<char>,
        /// Reads the option.
        pub get: fn(&SessionOptions) -> bool,
        /// Writes the option.
        pub set: fn(&mut SessionOptions, bool),
    }

    macro_rules! option_def {
        ($name:literal, $flag:expr, $field:ident) => {
            OptionDefinition {
                name: $name,
                flag: $flag,
                get: |o| o.$field,
                set: |o, v| o.$field = v,
            }
        };
    }

    /// Options reachable through `set -o NAME` (and their flags).
    pub(crate) const SET_OPTIONS: &[OptionDefinition] = &[
        option_def!("allexport", Some('a'), allexport),
        option_def!("errexit", Some('e'), errexit),
        option_def!("hashall", Some('h'), hashall),
        option_def!("history", None, history),
        option_def!("monitor", Some('m'), monitor),
        option_def!("noclobber", Some('C'), noclobber),
        option_def!("noexec", Some('n'), noexec),
        option_def!("noglob", Some('f'), noglob),
        option_def!("notify", Some('b'), notify),
        option_def!("nounset", Some('u'), nounset),
        option_def!("onecmd", Some('t'), onecmd),
        option_def!("pipefail", None, pipefail),
        option_def!("verbose", Some('v'), verbose),
        option_def!("xtrace", Some('x'), xtrace),
    ];

    /// Options reachable through `shopt`.
    pub(crate) const SHOPT_OPTIONS: &[OptionDefinition] = &[
        option_def!("cmdhist", None, cmdhist),
        option_def!("dotglob", None, dotglob),
        option_def!("expand_aliases", None, expand_aliases),
        option_def!("extglob", None, extglob),
        option_def!("globstar", None, globstar),
        option_def!("nullglob", None, nullglob),
        option_def!("sourcepath", None, sourcepath),
        option_def!("xpg_echo", None, xpg_echo),
    ];

    pub(crate) fn find_set_option(name: &str) -> Option<&'static OptionDefinition> {
        SET_OPTIONS.iter().find(|def| def.name == name)
    }

    pub(crate) fn find_set_flag(flag: char) -> Option<&'static OptionDefinition> {
        SET_OPTIONS.iter().find(|def| def.flag == Some(flag))
    }

    pub(crate) fn find_shopt_option(name: &str) -> Option<&'static OptionDefinition> {
        SHOPT_OPTIONS.iter().find(|def| def.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_string_reflects_set_flags() {
        let mut options = SessionOptions::defaults();
        options.errexit = true;
        options.nounset = true;

        let flags = options.flag_string();
        assert!(flags.contains('e'));
        assert!(flags.contains('u'));
        assert!(flags.contains('h'));
        assert!(!flags.contains('x'));
    }

    #[test]
    fn option_tables_resolve_names() {
        let def = namedoptions::find_set_option("pipefail").unwrap();
        let mut options = SessionOptions::default();
        (def.set)(&mut options, true);
        assert!(options.pipefail);

        let def = namedoptions::find_shopt_option("nullglob").unwrap();
        (def.set)(&mut options, true);
        assert!(options.nullglob);

        let def = namedoptions::find_set_flag('e').unwrap();
        assert_eq!(def.name, "errexit");
    }
}
