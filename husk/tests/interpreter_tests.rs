//! End-to-end tests driving the embedding API.

use anyhow::Result;
use husk::{RunKind, Session};
use pretty_assertions::assert_eq;

async fn run_one(script: &str) -> Result<husk::RunOutcome> {
    let mut session = Session::new()?;
    Ok(husk::run(script, &mut session).await?)
}

async fn stdout_of(script: &str) -> Result<String> {
    let outcome = run_one(script).await?;
    Ok(outcome.stdout_str().into_owned())
}

#[tokio::test]
async fn echo_and_exit_codes() -> Result<()> {
    let outcome = run_one("echo hello world").await?;
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.stdout_str(), "hello world\n");

    let outcome = run_one("false").await?;
    assert_eq!(outcome.exit_code, 1);

    let outcome = run_one("exit 256").await?;
    assert_eq!(outcome.exit_code, 0);

    Ok(())
}

#[tokio::test]
async fn session_state_survives_runs() -> Result<()> {
    let mut session = Session::new()?;

    husk::run("x=1; y=2", &mut session).await?;
    husk::run("f() { echo \"x=$x y=$y\"; }", &mut session).await?;

    let outcome = husk::run("f", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "x=1 y=2\n");

    Ok(())
}

#[tokio::test]
async fn loops_and_break() -> Result<()> {
    // Single-level break leaves only the first iteration's output.
    assert_eq!(
        stdout_of("for i in 1 2 3; do echo $i; break; done").await?,
        "1\n"
    );

    // break 2 exits both loops from inside the inner one.
    assert_eq!(
        stdout_of("for i in 1 2; do for j in a b; do echo $j; break 2; done; done").await?,
        "a\n"
    );

    // continue skips the rest of the body.
    assert_eq!(
        stdout_of("for i in 1 2 3; do if [ $i = 2 ]; then continue; fi; echo $i; done").await?,
        "1\n3\n"
    );

    // Overlarge continue counts clamp to the outermost loop.
    assert_eq!(
        stdout_of("for i in 1 2; do for j in a b; do continue 10; echo $j; done; echo $i; done")
            .await?,
        ""
    );

    Ok(())
}

#[tokio::test]
async fn while_and_until_loops() -> Result<()> {
    assert_eq!(
        stdout_of("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done").await?,
        "0\n1\n2\n"
    );
    assert_eq!(
        stdout_of("i=0; until [ $i -ge 2 ]; do echo $i; i=$((i+1)); done").await?,
        "0\n1\n"
    );
    assert_eq!(
        stdout_of("for ((i = 0; i < 3; i++)); do echo $i; done").await?,
        "0\n1\n2\n"
    );
    Ok(())
}

#[tokio::test]
async fn conditionals() -> Result<()> {
    assert_eq!(
        stdout_of("if true; then echo yes; else echo no; fi").await?,
        "yes\n"
    );
    assert_eq!(
        stdout_of("if false; then echo yes; elif true; then echo maybe; fi").await?,
        "maybe\n"
    );
    assert_eq!(stdout_of("[[ abc == a* ]] && echo matched").await?, "matched\n");
    assert_eq!(stdout_of("[ 1 -lt 2 ] && echo smaller").await?, "smaller\n");
    Ok(())
}

#[tokio::test]
async fn case_terminators() -> Result<()> {
    // ;;& resumes matching; ;; stops.
    assert_eq!(
        stdout_of("case foo in f*) echo one ;;& foo) echo two ;; *) echo three ;; esac").await?,
        "one\ntwo\n"
    );

    // ;& falls through without matching.
    assert_eq!(
        stdout_of("case a in a) echo one ;& b) echo two ;; c) echo three ;; esac").await?,
        "one\ntwo\n"
    );

    Ok(())
}

#[tokio::test]
async fn pipelines() -> Result<()> {
    assert_eq!(stdout_of("echo hello | cat").await?, "hello\n");
    assert_eq!(stdout_of("printf 'a\\nb\\nc\\n' | wc -l | tr -d ' '").await?, "3\n");

    // Exit status comes from the last stage by default.
    let outcome = run_one("false | true").await?;
    assert_eq!(outcome.exit_code, 0);

    // Under pipefail it is the last non-zero status.
    let outcome = run_one("set -o pipefail; false | true").await?;
    assert_eq!(outcome.exit_code, 1);

    // Negation inverts.
    let outcome = run_one("! false").await?;
    assert_eq!(outcome.exit_code, 0);

    Ok(())
}

#[tokio::test]
async fn command_substitution_and_arithmetic() -> Result<()> {
    assert_eq!(stdout_of("echo $(echo nested)").await?, "nested\n");
    assert_eq!(stdout_of("echo `echo backquoted`").await?, "backquoted\n");
    assert_eq!(stdout_of("echo $((6 * 7))").await?, "42\n");
    assert_eq!(stdout_of("x=5; echo $((x + 1))").await?, "6\n");
    Ok(())
}

#[tokio::test]
async fn functions_and_locals() -> Result<()> {
    let script = r"
outer=visible
f() {
    local inner=hidden
    echo $inner $outer
}
f
echo ${inner:-gone}
";
    assert_eq!(stdout_of(script).await?, "hidden visible\ngone\n");

    // Positional parameters inside functions.
    assert_eq!(
        stdout_of("f() { echo $1:$2:$#; }; f a b").await?,
        "a:b:2\n"
    );

    // return sets the function's exit status.
    let outcome = run_one("f() { return 3; }; f").await?;
    assert_eq!(outcome.exit_code, 3);

    Ok(())
}

#[tokio::test]
async fn subshell_isolation_and_group_persistence() -> Result<()> {
    let mut session = Session::new()?;

    let outcome = husk::run("x=parent; (x=child; echo $x); echo $x", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "child\nparent\n");

    let outcome = husk::run("{ y=grouped; }; echo $y", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "grouped\n");

    // cd in a subshell does not move the parent.
    let before = session.working_dir().to_path_buf();
    husk::run("(cd /; pwd) > /dev/null", &mut session).await?;
    assert_eq!(session.working_dir(), before.as_path());

    Ok(())
}

#[tokio::test]
async fn redirections() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("out.txt");
    let file_str = file.to_string_lossy().to_string();

    let mut session = Session::new()?;
    husk::run(format!("echo data > {file_str}").as_str(), &mut session).await?;
    assert_eq!(std::fs::read_to_string(&file)?, "data\n");

    husk::run(format!("echo more >> {file_str}").as_str(), &mut session).await?;
    assert_eq!(std::fs::read_to_string(&file)?, "data\nmore\n");

    let outcome = husk::run(format!("cat < {file_str}").as_str(), &mut session).await?;
    assert_eq!(outcome.stdout_str(), "data\nmore\n");

    // stderr redirection to stdout.
    let outcome = husk::run("ls /nonexistent-path-here 2>&1 | wc -l | tr -d ' '", &mut session)
        .await?;
    assert_eq!(outcome.stdout_str(), "1\n");

    Ok(())
}

#[tokio::test]
async fn noclobber_blocks_overwrite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("guarded.txt");
    let file_str = file.to_string_lossy().to_string();

    let mut session = Session::new()?;
    husk::run(format!("echo one > {file_str}").as_str(), &mut session).await?;

    let outcome = husk::run(
        format!("set -C; echo two > {file_str}").as_str(),
        &mut session,
    )
    .await?;
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(std::fs::read_to_string(&file)?, "one\n");

    // >| forces the write despite noclobber.
    let outcome = husk::run(format!("echo three >| {file_str}").as_str(), &mut session).await?;
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(std::fs::read_to_string(&file)?, "three\n");

    Ok(())
}

#[tokio::test]
async fn here_documents_and_strings() -> Result<()> {
    assert_eq!(
        stdout_of("cat <<EOF\nline 1\nline 2\nEOF").await?,
        "line 1\nline 2\n"
    );

    // Unquoted delimiters expand the body; quoted ones do not.
    assert_eq!(
        stdout_of("x=value; cat <<EOF\n$x\nEOF").await?,
        "value\n"
    );
    assert_eq!(
        stdout_of("x=value; cat <<'EOF'\n$x\nEOF").await?,
        "$x\n"
    );

    assert_eq!(stdout_of("cat <<< here-string").await?, "here-string\n");

    Ok(())
}

#[tokio::test]
async fn parameter_expansion_operators() -> Result<()> {
    assert_eq!(stdout_of("echo ${missing:-default}").await?, "default\n");
    assert_eq!(stdout_of("x=abcdef; echo ${x:2:3}").await?, "cde\n");
    assert_eq!(stdout_of("x=hello.tar.gz; echo ${x%%.*}").await?, "hello\n");
    assert_eq!(stdout_of("x=hello.tar.gz; echo ${x#*.}").await?, "tar.gz\n");
    assert_eq!(stdout_of("x=banana; echo ${x//a/o}").await?, "bonono\n");
    assert_eq!(stdout_of("x=abc; echo ${#x}").await?, "3\n");
    assert_eq!(stdout_of("x=hi; echo ${x^^}").await?, "HI\n");

    // Indirection.
    assert_eq!(stdout_of("a=b; b=deep; echo ${!a}").await?, "deep\n");

    Ok(())
}

#[tokio::test]
async fn arrays() -> Result<()> {
    assert_eq!(
        stdout_of("arr=(one two three); echo ${arr[1]}").await?,
        "two\n"
    );
    assert_eq!(
        stdout_of("arr=(one two three); echo ${#arr[@]}").await?,
        "3\n"
    );
    assert_eq!(
        stdout_of("arr=(a b); arr+=(c); echo ${arr[@]}").await?,
        "a b c\n"
    );
    assert_eq!(
        stdout_of("declare -A m; m[key]=val; echo ${m[key]}").await?,
        "val\n"
    );
    Ok(())
}

#[tokio::test]
async fn nameref_identity() -> Result<()> {
    // Writing through a nameref updates its target.
    assert_eq!(
        stdout_of("target=hello; declare -n ref=target; ref=world; echo $target").await?,
        "world\n"
    );

    // Reading through a chain reaches the end.
    assert_eq!(
        stdout_of("c=end; declare -n b=c; declare -n a=b; echo $a").await?,
        "end\n"
    );

    Ok(())
}

#[tokio::test]
async fn readonly_variables_are_preserved() -> Result<()> {
    let mut session = Session::new()?;

    husk::run("readonly fixed=original", &mut session).await?;
    let outcome = husk::run("fixed=changed", &mut session).await?;
    assert_eq!(outcome.exit_code, 1);

    let outcome = husk::run("echo $fixed", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "original\n");

    Ok(())
}

#[tokio::test]
async fn declare_p_round_trips() -> Result<()> {
    let mut session = Session::new()?;

    husk::run("declare -i counted=42", &mut session).await?;
    let outcome = husk::run("declare -p counted", &mut session).await?;
    let declaration = outcome.stdout_str().into_owned();
    assert!(declaration.contains("-i"), "missing attribute: {declaration}");

    // Re-evaluating the declaration reconstructs the variable.
    husk::run("unset counted", &mut session).await?;
    husk::run(declaration.as_str(), &mut session).await?;
    let outcome = husk::run("echo $counted", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "42\n");

    Ok(())
}

#[tokio::test]
async fn trap_exit_fires_in_order() -> Result<()> {
    let outcome = run_one("trap 'echo EXIT_FIRED' EXIT; echo hi").await?;
    assert_eq!(outcome.stdout_str(), "hi\nEXIT_FIRED\n");
    Ok(())
}

#[tokio::test]
async fn trap_p_round_trips() -> Result<()> {
    let mut session = Session::new()?;

    husk::run("trap 'echo bye' EXIT", &mut session).await?;
    let outcome = husk::run("trap -p", &mut session).await?;
    let printed = outcome.stdout_str().into_owned();
    assert!(printed.contains("echo bye"), "unexpected: {printed}");

    // Clearing and re-evaluating restores the handler.
    husk::run("trap - EXIT", &mut session).await?;
    husk::run(printed.as_str(), &mut session).await?;
    let outcome = husk::run("trap -p", &mut session).await?;
    assert!(outcome.stdout_str().contains("echo bye"));

    Ok(())
}

#[tokio::test]
async fn errexit_stops_execution() -> Result<()> {
    let outcome = run_one("set -e; false; echo unreachable").await?;
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.stdout_str(), "");

    // Condition contexts suppress errexit.
    let outcome = run_one("set -e; if false; then :; fi; echo reached").await?;
    assert_eq!(outcome.stdout_str(), "reached\n");

    let outcome = run_one("set -e; false && true; echo reached").await?;
    assert_eq!(outcome.stdout_str(), "reached\n");

    Ok(())
}

#[tokio::test]
async fn nounset_reports_unbound() -> Result<()> {
    let outcome = run_one("set -u; echo $not_defined_anywhere").await?;
    assert_eq!(outcome.exit_code, 1);
    assert!(outcome.stderr_str().contains("unbound variable"));
    Ok(())
}

#[tokio::test]
async fn noexec_parses_without_running() -> Result<()> {
    let outcome = run_one("set -n\necho should-not-print").await?;
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.stdout_str(), "");
    Ok(())
}

#[tokio::test]
async fn xtrace_writes_to_stderr() -> Result<()> {
    let outcome = run_one("set -x; echo traced").await?;
    assert_eq!(outcome.stdout_str(), "traced\n");
    assert!(outcome.stderr_str().contains("+ echo traced"));
    Ok(())
}

#[tokio::test]
async fn pushd_popd_restore_state() -> Result<()> {
    let mut session = Session::new()?;
    let original = session.working_dir().to_path_buf();

    husk::run("pushd / > /dev/null", &mut session).await?;
    assert_eq!(session.working_dir(), std::path::Path::new("/"));

    husk::run("popd > /dev/null", &mut session).await?;
    assert_eq!(session.working_dir(), original.as_path());

    Ok(())
}

#[tokio::test]
async fn cd_updates_pwd_and_oldpwd() -> Result<()> {
    let mut session = Session::new()?;
    let original = session.working_dir().to_string_lossy().to_string();

    husk::run("cd /", &mut session).await?;
    assert_eq!(session.get_var("PWD").as_deref(), Some("/"));
    assert_eq!(session.get_var("OLDPWD").as_deref(), Some(original.as_str()));

    let outcome = husk::run("cd - > /dev/null; pwd", &mut session).await?;
    assert_eq!(outcome.stdout_str().trim(), original.as_str());

    Ok(())
}

#[tokio::test]
async fn background_jobs_and_wait() -> Result<()> {
    let mut session = Session::new()?;

    let outcome = husk::run("sleep 0.05 & wait", &mut session).await?;
    assert_eq!(outcome.exit_code, 0);

    Ok(())
}

#[tokio::test]
async fn coproc_round_trip() -> Result<()> {
    let script = r#"coproc cat; echo hello >&${COPROC[1]}; eval "exec ${COPROC[1]}>&-"; read -u ${COPROC[0]} line; echo "$line""#;
    let outcome = run_one(script).await?;
    assert_eq!(outcome.stdout_str(), "hello\n");
    Ok(())
}

#[tokio::test]
async fn escape_expansion_boundaries() -> Result<()> {
    assert_eq!(stdout_of(r"printf '%05d\n' 42").await?, "00042\n");
    assert_eq!(
        stdout_of(r#"echo -e "\U0001F4A9""#).await?,
        "\u{1F4A9}\n"
    );
    Ok(())
}

#[tokio::test]
async fn getopts_parses_options() -> Result<()> {
    let script = r#"
set -- -a -b value rest
while getopts "ab:" opt; do
    echo "opt=$opt arg=${OPTARG:-none}"
done
"#;
    assert_eq!(
        stdout_of(script).await?,
        "opt=a arg=none\nopt=b arg=value\n"
    );
    Ok(())
}

#[tokio::test]
async fn eval_and_source() -> Result<()> {
    assert_eq!(stdout_of("eval 'echo evaluated'").await?, "evaluated\n");

    let dir = tempfile::tempdir()?;
    let script_path = dir.path().join("lib.sh");
    std::fs::write(&script_path, "sourced_var=from-file\n")?;

    let mut session = Session::new()?;
    husk::run(
        format!("source {}", script_path.to_string_lossy()).as_str(),
        &mut session,
    )
    .await?;
    assert_eq!(session.get_var("sourced_var").as_deref(), Some("from-file"));

    Ok(())
}

#[tokio::test]
async fn exec_with_redirections_persists() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("execlog.txt");
    let file_str = file.to_string_lossy().to_string();

    let mut session = Session::new()?;
    husk::run(format!("exec 3> {file_str}").as_str(), &mut session).await?;
    husk::run("echo through-fd-3 >&3", &mut session).await?;
    husk::run("exec 3>&-", &mut session).await?;

    assert_eq!(std::fs::read_to_string(&file)?, "through-fd-3\n");

    Ok(())
}

#[tokio::test]
async fn exec_with_command_replaces_run() -> Result<()> {
    let outcome = run_one("exec echo replaced; echo not-reached").await?;
    assert_eq!(outcome.stdout_str(), "replaced\n");
    assert_eq!(outcome.kind, RunKind::ExecReplaced);
    Ok(())
}

#[tokio::test]
async fn aliases_expand_command_words() -> Result<()> {
    let mut session = Session::new()?;
    husk::run("alias greet='echo hi'", &mut session).await?;
    let outcome = husk::run("greet there", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "hi there\n");
    Ok(())
}

#[tokio::test]
async fn history_records_runs() -> Result<()> {
    let mut session = Session::new()?;
    husk::run("echo first", &mut session).await?;
    husk::run("echo second", &mut session).await?;

    let outcome = husk::run("history", &mut session).await?;
    let listing = outcome.stdout_str().into_owned();
    assert!(listing.contains("echo first"));
    assert!(listing.contains("echo second"));

    Ok(())
}

#[tokio::test]
async fn host_builtins_can_be_registered() -> Result<()> {
    use clap::Parser;
    use husk::{BuiltinCommand, BuiltinContext, BuiltinResult};
    use std::io::Write;

    /// A host-provided command.
    #[derive(Parser)]
    struct HostGreet {
        name: Option<String>,
    }

    impl BuiltinCommand for HostGreet {
        async fn execute(
            &self,
            context: &mut BuiltinContext<'_>,
        ) -> Result<BuiltinResult, husk::Error> {
            let mut stdout = context.stdout();
            writeln!(stdout, "host says hi to {}", self.name.as_deref().unwrap_or("you"))?;
            Ok(BuiltinResult::success())
        }
    }

    let mut session = Session::new()?;
    session.register_builtin("host.greet", husk::builtin::<HostGreet>("greet from the host"));

    let outcome = husk::run("host.greet friend", &mut session).await?;
    assert_eq!(outcome.stdout_str(), "host says hi to friend\n");

    Ok(())
}

#[tokio::test]
async fn parse_round_trip_property() -> Result<()> {
    let sources = [
        "echo one && echo two || echo three",
        "for i in a b c; do echo $i; done",
        "if [ -f /etc/passwd ]; then echo found; fi",
        "case x in a) echo a ;; *) echo other ;; esac",
        "f() { echo body; }",
    ];

    for source in sources {
        let options = husk::ParserOptions::default();
        let first = husk::parse_program(source, &options)?.to_string();
        let second = husk::parse_program(first.as_str(), &options)?.to_string();
        assert_eq!(first, second, "round-trip diverged for: {source}");
    }

    Ok(())
}
