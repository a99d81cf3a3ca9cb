//! Parser for the arguments of `test` / `[` commands. POSIX prescribes
//! argument-count-sensitive interpretation for up to four arguments before
//! falling back to general expression parsing.

use crate::{ast, error};

/// Parses the arguments of a `test` invocation into an expression tree.
pub fn parse(args: &[String]) -> Result<ast::TestExpr, error::TestCommandParseError> {
    let args: Vec<_> = args.iter().map(|s| s.as_str()).collect();

    let expr = test_command::full_expression(args.as_slice())
        .map_err(error::TestCommandParseError::from)?;

    Ok(expr)
}

peg::parser! {
    grammar test_command<'a>() for [&'a str] {
        pub(crate) rule full_expression() -> ast::TestExpr =
            end() { ast::TestExpr::False } /
            e:one_arg_expr() end() { e } /
            e:two_arg_expr() end() { e } /
            e:three_arg_expr() end() { e } /
            e:four_arg_expr() end() { e } /
            expression()

        rule one_arg_expr() -> ast::TestExpr =
            [s] { ast::TestExpr::Literal(s.into()) }

        rule two_arg_expr() -> ast::TestExpr =
            ["!"] e:one_arg_expr() { ast::TestExpr::Not(Box::from(e)) } /
            op:unary_op() [s] { ast::TestExpr::UnaryTest(op, s.into()) } /
            [_] [_] { ast::TestExpr::False }

        rule three_arg_expr() -> ast::TestExpr =
            [left] ["-a"] [right] { ast::TestExpr::And(Box::from(ast::TestExpr::Literal(left.into())), Box::from(ast::TestExpr::Literal(right.into()))) } /
            [left] ["-o"] [right] { ast::TestExpr::Or(Box::from(ast::TestExpr::Literal(left.into())), Box::from(ast::TestExpr::Literal(right.into()))) } /
            [left] op:binary_op() [right] { ast::TestExpr::BinaryTest(op, left.into(), right.into()) } /
            ["!"] e:two_arg_expr() { ast::TestExpr::Not(Box::from(e)) } /
            ["("] e:one_arg_expr() [")"] { e } /
            [_] [_] [_] { ast::TestExpr::False }

        rule four_arg_expr() -> ast::TestExpr =
            ["!"] e:three_arg_expr() { ast::TestExpr::Not(Box::from(e)) }

        rule expression() -> ast::TestExpr = precedence! {
            left:(@) ["-a"] right:@ { ast::TestExpr::And(Box::from(left), Box::from(right)) }
            left:(@) ["-o"] right:@ { ast::TestExpr::Or(Box::from(left), Box::from(right)) }
            --
            ["("] e:expression() [")"] { ast::TestExpr::Parenthesized(Box::from(e)) }
            --
            ["!"] e:@ { ast::TestExpr::Not(Box::from(e)) }
            --
            [left] op:binary_op() [right] { ast::TestExpr::BinaryTest(op, left.into(), right.into()) }
            --
            op:unary_op() [operand] { ast::TestExpr::UnaryTest(op, operand.into()) }
            --
            [s] { ast::TestExpr::Literal(s.into()) }
        }

        rule unary_op() -> ast::UnaryPredicate =
            ["-a"] { ast::UnaryPredicate::FileExists } /
            ["-b"] { ast::UnaryPredicate::IsBlockDevice } /
            ["-c"] { ast::UnaryPredicate::IsCharDevice } /
            ["-d"] { ast::UnaryPredicate::IsDirectory } /
            ["-e"] { ast::UnaryPredicate::FileExists } /
            ["-f"] { ast::UnaryPredicate::IsRegularFile } /
            ["-g"] { ast::UnaryPredicate::IsSetgid } /
            ["-h"] { ast::UnaryPredicate::IsSymlink } /
            ["-k"] { ast::UnaryPredicate::HasStickyBit } /
            ["-n"] { ast::UnaryPredicate::StringIsNonEmpty } /
            ["-o"] { ast::UnaryPredicate::OptionEnabled } /
            ["-p"] { ast::UnaryPredicate::IsFifo } /
            ["-r"] { ast::UnaryPredicate::IsReadable } /
            ["-s"] { ast::UnaryPredicate::IsNonEmptyFile } /
            ["-t"] { ast::UnaryPredicate::FdIsTerminal } /
            ["-u"] { ast::UnaryPredicate::IsSetuid } /
            ["-v"] { ast::UnaryPredicate::VarIsSet } /
            ["-w"] { ast::UnaryPredicate::IsWritable } /
            ["-x"] { ast::UnaryPredicate::IsExecutable } /
            ["-z"] { ast::UnaryPredicate::StringIsEmpty } /
            ["-G"] { ast::UnaryPredicate::OwnedByEffectiveGid } /
            ["-L"] { ast::UnaryPredicate::IsSymlink } /
            ["-N"] { ast::UnaryPredicate::ModifiedSinceRead } /
            ["-O"] { ast::UnaryPredicate::OwnedByEffectiveUid } /
            ["-R"] { ast::UnaryPredicate::VarIsNameref } /
            ["-S"] { ast::UnaryPredicate::IsSocket }

        rule binary_op() -> ast::BinaryPredicate =
            ["-ef"] { ast::BinaryPredicate::SameFile } /
            ["-eq"] { ast::BinaryPredicate::ArithmeticEqual } /
            ["-ge"] { ast::BinaryPredicate::ArithmeticGreaterThanOrEqual } /
            ["-gt"] { ast::BinaryPredicate::ArithmeticGreaterThan } /
            ["-le"] { ast::BinaryPredicate::ArithmeticLessThanOrEqual } /
            ["-lt"] { ast::BinaryPredicate::ArithmeticLessThan } /
            ["-ne"] { ast::BinaryPredicate::ArithmeticNotEqual } /
            ["-nt"] { ast::BinaryPredicate::NewerThan } /
            ["-ot"] { ast::BinaryPredicate::OlderThan } /
            ["=="] { ast::BinaryPredicate::StringEquals } /
            ["="] { ast::BinaryPredicate::StringEquals } /
            ["!="] { ast::BinaryPredicate::StringNotEquals } /
            ["<"] { ast::BinaryPredicate::SortsBefore } /
            [">"] { ast::BinaryPredicate::SortsAfter }

        rule end() = ![_]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn parse_strs(args: &[&str]) -> Result<ast::TestExpr> {
        let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        Ok(parse(args.as_slice())?)
    }

    #[test]
    fn parse_empty_is_false() -> Result<()> {
        assert!(matches!(parse_strs(&[])?, ast::TestExpr::False));
        Ok(())
    }

    #[test]
    fn parse_single_arg_is_literal() -> Result<()> {
        assert!(matches!(parse_strs(&["x"])?, ast::TestExpr::Literal(_)));
        // Even an operator-looking single argument is a literal.
        assert!(matches!(parse_strs(&["-n"])?, ast::TestExpr::Literal(_)));
        Ok(())
    }

    #[test]
    fn parse_unary() -> Result<()> {
        assert!(matches!(
            parse_strs(&["-n", "abc"])?,
            ast::TestExpr::UnaryTest(ast::UnaryPredicate::StringIsNonEmpty, _)
        ));
        assert!(matches!(
            parse_strs(&["-f", "/etc/passwd"])?,
            ast::TestExpr::UnaryTest(ast::UnaryPredicate::IsRegularFile, _)
        ));
        Ok(())
    }

    #[test]
    fn parse_binary() -> Result<()> {
        assert!(matches!(
            parse_strs(&["1", "-lt", "2"])?,
            ast::TestExpr::BinaryTest(ast::BinaryPredicate::ArithmeticLessThan, ..)
        ));
        assert!(matches!(
            parse_strs(&["a", "=", "b"])?,
            ast::TestExpr::BinaryTest(ast::BinaryPredicate::StringEquals, ..)
        ));
        Ok(())
    }

    #[test]
    fn parse_negation() -> Result<()> {
        assert!(matches!(parse_strs(&["!", "x"])?, ast::TestExpr::Not(_)));
        assert!(matches!(
            parse_strs(&["!", "-z", "x"])?,
            ast::TestExpr::Not(_)
        ));
        Ok(())
    }

    #[test]
    fn parse_conjunctions() -> Result<()> {
        assert!(matches!(
            parse_strs(&["a", "-a", "b"])?,
            ast::TestExpr::And(..)
        ));
        assert!(matches!(
            parse_strs(&["a", "-o", "b"])?,
            ast::TestExpr::Or(..)
        ));
        Ok(())
    }
}
