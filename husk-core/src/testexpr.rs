//! Evaluation of `[`/`test` expressions and `[[ ... ]]` extended tests.

use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use husk_parser::ast;

use crate::error::Error;
use crate::expansion;
use crate::interp::ExecutionParameters;
use crate::options::namedoptions;
use crate::patterns;
use crate::session::Session;
use crate::variables::ValueLiteral;

/// Evaluates a parsed `test`/`[` expression. Operands are plain strings; no
/// further expansion or pattern matching applies.
pub(crate) fn eval_test_expr(expr: &ast::TestExpr, session: &mut Session) -> Result<bool, Error> {
    match expr {
        ast::TestExpr::False => Ok(false),
        ast::TestExpr::Literal(s) => Ok(!s.is_empty()),
        ast::TestExpr::And(left, right) => {
            Ok(eval_test_expr(left, session)? && eval_test_expr(right, session)?)
        }
        ast::TestExpr::Or(left, right) => {
            Ok(eval_test_expr(left, session)? || eval_test_expr(right, session)?)
        }
        ast::TestExpr::Not(inner) => Ok(!eval_test_expr(inner, session)?),
        ast::TestExpr::Parenthesized(inner) => eval_test_expr(inner, session),
        ast::TestExpr::UnaryTest(pred, operand) => eval_unary_test(session, *pred, operand),
        ast::TestExpr::BinaryTest(pred, left, right) => {
            eval_binary_test(session, *pred, left, right)
        }
    }
}

/// Evaluates a `[[ ... ]]` expression; operands undergo expansion without
/// word splitting, and `==`/`!=`/`=~` match patterns and regexes.
pub(crate) async fn eval_extended_test_expr(
    expr: &ast::ExtendedTestExpr,
    session: &mut Session,
    params: &ExecutionParameters,
) -> Result<bool, Error> {
    match expr {
        ast::ExtendedTestExpr::And(left, right) => {
            // Short-circuit to avoid side effects of the right side.
            if !Box::pin(eval_extended_test_expr(left, session, params)).await? {
                return Ok(false);
            }
            Box::pin(eval_extended_test_expr(right, session, params)).await
        }
        ast::ExtendedTestExpr::Or(left, right) => {
            if Box::pin(eval_extended_test_expr(left, session, params)).await? {
                return Ok(true);
            }
            Box::pin(eval_extended_test_expr(right, session, params)).await
        }
        ast::ExtendedTestExpr::Not(inner) => {
            Ok(!Box::pin(eval_extended_test_expr(inner, session, params)).await?)
        }
        ast::ExtendedTestExpr::Parenthesized(inner) => {
            Box::pin(eval_extended_test_expr(inner, session, params)).await
        }
        ast::ExtendedTestExpr::UnaryTest(pred, operand) => {
            let operand = expansion::basic_expand_word(session, params, operand).await?;
            eval_unary_test(session, *pred, operand.as_str())
        }
        ast::ExtendedTestExpr::BinaryTest(pred, left, right) => match pred {
            ast::BinaryPredicate::MatchesPattern | ast::BinaryPredicate::NotMatchesPattern => {
                let left = expansion::basic_expand_word(session, params, left).await?;
                let pattern = expansion::basic_expand_pattern(session, params, right)
                    .await?
                    .set_extended_globbing(true);

                let matches = pattern.exactly_matches(left.as_str())?;
                Ok(matches == matches!(pred, ast::BinaryPredicate::MatchesPattern))
            }
            ast::BinaryPredicate::MatchesRegex => {
                let left = expansion::basic_expand_word(session, params, left).await?;
                let regex = expansion::basic_expand_regex(session, params, right)
                    .await?
                    .compile()?;

                match crate::regexes::match_and_capture(&regex, left.as_str())? {
                    Some(captures) => {
                        session.env.update_or_add(
                            "BASH_REMATCH",
                            ValueLiteral::Array(crate::variables::ArrayLiteral(
                                captures.into_iter().map(|c| (None, c)).collect(),
                            )),
                            |_| Ok(()),
                            crate::env::EnvironmentLookup::Anywhere,
                            crate::env::EnvironmentScope::Global,
                        )?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            ast::BinaryPredicate::ContainsSubstring => {
                let left = expansion::basic_expand_word(session, params, left).await?;
                let right = expansion::basic_expand_word(session, params, right).await?;
                Ok(left.contains(right.as_str()))
            }
            _ => {
                let left = expansion::basic_expand_word(session, params, left).await?;
                let right = expansion::basic_expand_word(session, params, right).await?;
                eval_binary_test(session, *pred, left.as_str(), right.as_str())
            }
        },
    }
}

fn eval_unary_test(
    session: &mut Session,
    pred: ast::UnaryPredicate,
    operand: &str,
) -> Result<bool, Error> {
    let path = Path::new(operand);

    let result = match pred {
        ast::UnaryPredicate::FileExists => path.exists(),
        ast::UnaryPredicate::IsBlockDevice => {
            file_type(path).is_some_and(|t| t.is_block_device())
        }
        ast::UnaryPredicate::IsCharDevice => {
            file_type(path).is_some_and(|t| t.is_char_device())
        }
        ast::UnaryPredicate::IsDirectory => path.is_dir(),
        ast::UnaryPredicate::IsRegularFile => path.is_file(),
        ast::UnaryPredicate::IsSetgid => mode_bit_set(path, 0o2000),
        ast::UnaryPredicate::IsSymlink => path
            .symlink_metadata()
            .is_ok_and(|m| m.file_type().is_symlink()),
        ast::UnaryPredicate::HasStickyBit => mode_bit_set(path, 0o1000),
        ast::UnaryPredicate::IsFifo => file_type(path).is_some_and(|t| t.is_fifo()),
        ast::UnaryPredicate::IsReadable => access_ok(path, nix::unistd::AccessFlags::R_OK),
        ast::UnaryPredicate::IsNonEmptyFile => {
            path.metadata().is_ok_and(|m| m.len() > 0)
        }
        ast::UnaryPredicate::FdIsTerminal => {
            let fd = operand.parse::<u32>().unwrap_or(u32::MAX);
            session
                .open_files
                .get(fd)
                .is_some_and(super::openfiles::OpenFile::is_terminal)
        }
        ast::UnaryPredicate::IsSetuid => mode_bit_set(path, 0o4000),
        ast::UnaryPredicate::IsWritable => access_ok(path, nix::unistd::AccessFlags::W_OK),
        ast::UnaryPredicate::IsExecutable => access_ok(path, nix::unistd::AccessFlags::X_OK),
        ast::UnaryPredicate::OwnedByEffectiveGid => path
            .metadata()
            .is_ok_and(|m| m.gid() == nix::unistd::getegid().as_raw()),
        ast::UnaryPredicate::ModifiedSinceRead => path.metadata().is_ok_and(|m| {
            m.mtime() > m.atime() || (m.mtime() == m.atime() && m.mtime_nsec() > m.atime_nsec())
        }),
        ast::UnaryPredicate::OwnedByEffectiveUid => path
            .metadata()
            .is_ok_and(|m| m.uid() == nix::unistd::geteuid().as_raw()),
        ast::UnaryPredicate::IsSocket => file_type(path).is_some_and(|t| t.is_socket()),
        ast::UnaryPredicate::OptionEnabled => namedoptions::find_set_option(operand)
            .is_some_and(|def| (def.get)(&session.options)),
        ast::UnaryPredicate::VarIsSet => session.env.is_set(operand),
        ast::UnaryPredicate::VarIsNameref => session
            .env
            .get(operand)
            .is_some_and(|(_, var)| var.is_nameref()),
        ast::UnaryPredicate::StringIsEmpty => operand.is_empty(),
        ast::UnaryPredicate::StringIsNonEmpty => !operand.is_empty(),
    };

    Ok(result)
}

fn eval_binary_test(
    _session: &mut Session,
    pred: ast::BinaryPredicate,
    left: &str,
    right: &str,
) -> Result<bool, Error> {
    let result = match pred {
        ast::BinaryPredicate::SameFile => {
            let left_meta = Path::new(left).metadata();
            let right_meta = Path::new(right).metadata();
            match (left_meta, right_meta) {
                (Ok(l), Ok(r)) => l.dev() == r.dev() && l.ino() == r.ino(),
                _ => false,
            }
        }
        ast::BinaryPredicate::NewerThan => {
            compare_file_times(left, right, |l, r| l > r, true)
        }
        ast::BinaryPredicate::OlderThan => {
            compare_file_times(left, right, |l, r| l < r, false)
        }
        ast::BinaryPredicate::StringEquals => left == right,
        ast::BinaryPredicate::StringNotEquals => left != right,
        ast::BinaryPredicate::SortsBefore => left < right,
        ast::BinaryPredicate::SortsAfter => left > right,
        ast::BinaryPredicate::ArithmeticEqual => parse_i64(left)? == parse_i64(right)?,
        ast::BinaryPredicate::ArithmeticNotEqual => parse_i64(left)? != parse_i64(right)?,
        ast::BinaryPredicate::ArithmeticLessThan => parse_i64(left)? < parse_i64(right)?,
        ast::BinaryPredicate::ArithmeticLessThanOrEqual => parse_i64(left)? <= parse_i64(right)?,
        ast::BinaryPredicate::ArithmeticGreaterThan => parse_i64(left)? > parse_i64(right)?,
        ast::BinaryPredicate::ArithmeticGreaterThanOrEqual => {
            parse_i64(left)? >= parse_i64(right)?
        }
        ast::BinaryPredicate::MatchesPattern => {
            patterns::Pattern::from(right).exactly_matches(left)?
        }
        ast::BinaryPredicate::NotMatchesPattern => {
            !patterns::Pattern::from(right).exactly_matches(left)?
        }
        ast::BinaryPredicate::MatchesRegex | ast::BinaryPredicate::ContainsSubstring => {
            let regex = crate::regexes::compile(right)?;
            regex.is_match(left)?
        }
    };

    Ok(result)
}

fn parse_i64(s: &str) -> Result<i64, Error> {
    Ok(s.trim().parse::<i64>()?)
}

fn file_type(path: &Path) -> Option<std::fs::FileType> {
    path.metadata().map(|m| m.file_type()).ok()
}

fn mode_bit_set(path: &Path, bit: u32) -> bool {
    path.metadata().is_ok_and(|m| m.mode() & bit != 0)
}

fn access_ok(path: &Path, flags: nix::unistd::AccessFlags) -> bool {
    nix::unistd::access(path, flags).is_ok()
}

fn compare_file_times(
    left: &str,
    right: &str,
    cmp: fn(i64, i64) -> bool,
    left_missing_fails: bool,
) -> bool {
    let left_meta = Path::new(left).metadata();
    let right_meta = Path::new(right).metadata();

    match (left_meta, right_meta) {
        (Ok(l), Ok(r)) => cmp(l.mtime(), r.mtime()),
        (Ok(_), Err(_)) => left_missing_fails,
        (Err(_), Ok(_)) => !left_missing_fails,
        (Err(_), Err(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(session: &mut Session, args: &[&str]) -> bool {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        let expr = husk_parser::test_command::parse(args.as_slice()).unwrap();
        eval_test_expr(&expr, session).unwrap()
    }

    #[test]
    fn string_tests() {
        let mut session = Session::new().unwrap();

        assert!(eval(&mut session, &["-n", "abc"]));
        assert!(!eval(&mut session, &["-n", ""]));
        assert!(eval(&mut session, &["-z", ""]));
        assert!(eval(&mut session, &["abc", "=", "abc"]));
        assert!(eval(&mut session, &["abc", "!=", "abd"]));
        assert!(eval(&mut session, &["abc"]));
        assert!(!eval(&mut session, &[]));
    }

    #[test]
    fn arithmetic_tests() {
        let mut session = Session::new().unwrap();

        assert!(eval(&mut session, &["1", "-lt", "2"]));
        assert!(eval(&mut session, &["2", "-ge", "2"]));
        assert!(!eval(&mut session, &["3", "-eq", "4"]));
    }

    #[test]
    fn file_tests() {
        let mut session = Session::new().unwrap();

        assert!(eval(&mut session, &["-e", "/"]));
        assert!(eval(&mut session, &["-d", "/"]));
        assert!(!eval(&mut session, &["-f", "/"]));
        assert!(!eval(&mut session, &["-e", "/definitely/not/here"]));
    }

    #[test]
    fn variable_tests() {
        let mut session = Session::new().unwrap();
        session.env.set_global("defined", "x").unwrap();

        assert!(eval(&mut session, &["-v", "defined"]));
        assert!(!eval(&mut session, &["-v", "undefined_var"]));
    }

    #[test]
    fn conjunction_tests() {
        let mut session = Session::new().unwrap();

        assert!(eval(&mut session, &["a", "-a", "b"]));
        assert!(!eval(&mut session, &["a", "-a", ""]));
        assert!(eval(&mut session, &["", "-o", "b"]));
        assert!(eval(&mut session, &["!", ""]));
    }
}
