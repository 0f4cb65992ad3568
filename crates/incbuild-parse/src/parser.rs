//! Directive extraction and expression parsing.

use std::ops::Range;
use std::str::FromStr;

use compact_str::CompactString;

use crate::directive::{ConditionalKind, Directive, DirectiveKind, Expression, SourceDirectives};
use crate::lexer::{LogicalLine, Token, TokenKind, logical_lines, tokenize};

/// Name a variadic `...` parameter is referred to by in the body.
pub const VA_ARGS: &str = "__VA_ARGS__";

/// Extract every recognized directive from `contents`, in textual order.
///
/// `#pragma`, `#error`, `#line` and unknown directives are skipped.
/// Never fails: text that is not understood becomes
/// [`Expression::Tokens`].
pub fn parse(contents: &str) -> SourceDirectives {
    let directives = logical_lines(contents)
        .iter()
        .filter_map(parse_line)
        .collect();
    SourceDirectives { directives }
}

/// Parse free-standing expression text, e.g. the result of token pasting.
pub fn parse_expression(text: &str) -> Expression {
    parse_with_parameters(text, &[])
}

/// Parse a function-like macro body, mapping parameter names to slots.
pub fn parse_with_parameters(text: &str, parameters: &[CompactString]) -> Expression {
    let text = text.trim();
    if text.is_empty() {
        return Expression::Tokens(String::new());
    }
    let parser = ExprParser {
        text,
        tokens: tokenize(text),
        parameters,
    };
    parser.expression(0..parser.tokens.len())
}

fn parse_line(line: &LogicalLine) -> Option<Directive> {
    let rest = line.text.trim_start().strip_prefix('#')?.trim_start();
    let (name, args) = rest.split_at(identifier_len(rest));

    let kind = match name {
        "include" | "include_next" => parse_include(args, false)?,
        "import" => parse_include(args, true)?,
        "define" => parse_define(args)?,
        "undef" => {
            let args = args.trim_start();
            let len = identifier_len(args);
            if len == 0 {
                return None;
            }
            DirectiveKind::Undef {
                name: CompactString::new(&args[..len]),
            }
        }
        other => match ConditionalKind::from_str(other) {
            Ok(kind) => DirectiveKind::Conditional {
                kind,
                condition: args.trim().to_string(),
            },
            Err(_) => {
                tracing::trace!(line = line.number, directive = other, "directive ignored");
                return None;
            }
        },
    };

    Some(Directive {
        line: line.number,
        kind,
    })
}

fn identifier_len(text: &str) -> usize {
    text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(text.len())
}

fn parse_include(args: &str, is_import: bool) -> Option<DirectiveKind> {
    let args = args.trim();
    if args.is_empty() {
        return None;
    }

    let literal = |open: char, close: char| -> Option<String> {
        let inner = args.strip_prefix(open)?;
        inner.find(close).map(|end| inner[..end].to_string())
    };

    let (expression, angle) = if let Some(path) = literal('"', '"') {
        (Expression::Quoted(path), false)
    } else if let Some(path) = literal('<', '>') {
        (Expression::System(path), true)
    } else {
        (parse_expression(args), false)
    };

    Some(DirectiveKind::Include {
        expression,
        angle,
        is_import,
    })
}

fn parse_define(args: &str) -> Option<DirectiveKind> {
    let args = args.trim_start();
    let len = identifier_len(args);
    if len == 0 {
        return None;
    }
    let name = CompactString::new(&args[..len]);
    let after = &args[len..];

    // Function-like only when `(` touches the name.
    let Some(params) = after.strip_prefix('(') else {
        return Some(DirectiveKind::Define {
            name,
            body: parse_expression(after),
        });
    };

    let close = params.find(')')?;
    let parameters: Vec<CompactString> = params[..close]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p {
            "..." => CompactString::new(VA_ARGS),
            named => CompactString::new(named.trim_end_matches("...").trim_end()),
        })
        .collect();

    Some(DirectiveKind::DefineFunction {
        name,
        parameter_count: parameters.len(),
        body: parse_with_parameters(&params[close + 1..], &parameters),
    })
}

struct ExprParser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    parameters: &'a [CompactString],
}

impl ExprParser<'_> {
    /// `operand ( ## operand )*`, or the raw tokens.
    fn expression(&self, range: Range<usize>) -> Expression {
        let pieces = self.split_top_level(range.clone(), TokenKind::HashHash);
        if pieces.len() < 2 {
            return self.operand(range);
        }
        let mut pieces = pieces.into_iter();
        let first = pieces.next().map_or(Expression::Tokens(String::new()), |r| self.operand(r));
        pieces.fold(first, |lhs, r| {
            Expression::Concat(Box::new(lhs), Box::new(self.operand(r)))
        })
    }

    fn operand(&self, range: Range<usize>) -> Expression {
        self.unary(range.clone())
            .unwrap_or_else(|| Expression::Tokens(self.raw(range)))
    }

    /// A single primary covering exactly `range`.
    fn unary(&self, range: Range<usize>) -> Option<Expression> {
        let tokens = &self.tokens[range.clone()];
        let first = tokens.first()?;
        let last = tokens.last()?;

        if tokens.len() == 1 {
            return Some(self.primary(first));
        }

        match first.kind {
            TokenKind::Hash => {
                let operand = self.unary(range.start + 1..range.end)?;
                Some(Expression::Stringify(Box::new(operand)))
            }
            TokenKind::Less if last.is(TokenKind::Greater) => Some(Expression::System(
                self.text[first.span.end..last.span.start].trim().to_string(),
            )),
            TokenKind::Ident
                if tokens[1].is(TokenKind::LParen)
                    && self.matching_paren(range.start + 1) == Some(range.end - 1) =>
            {
                let inner = range.start + 2..range.end - 1;
                let args = if inner.is_empty() {
                    Vec::new()
                } else {
                    self.split_top_level(inner, TokenKind::Comma)
                        .into_iter()
                        .map(|r| self.expression(r))
                        .collect()
                };
                Some(Expression::Call {
                    name: CompactString::new(&first.text),
                    args,
                })
            }
            _ => None,
        }
    }

    fn primary(&self, token: &Token) -> Expression {
        match token.kind {
            TokenKind::Ident => match self.parameters.iter().position(|p| p.as_str() == token.text) {
                Some(index) => Expression::Parameter(index),
                None => Expression::Identifier(CompactString::new(&token.text)),
            },
            TokenKind::String if token.text.len() >= 2 && token.text.ends_with('"') => {
                Expression::Quoted(token.text[1..token.text.len() - 1].to_string())
            }
            _ => Expression::Tokens(token.text.clone()),
        }
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Split `range` on `separator` tokens outside parentheses.
    fn split_top_level(&self, range: Range<usize>, separator: TokenKind) -> Vec<Range<usize>> {
        let mut pieces = Vec::new();
        let mut depth = 0usize;
        let mut start = range.start;
        for i in range.clone() {
            match self.tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                kind if kind == separator && depth == 0 => {
                    pieces.push(start..i);
                    start = i + 1;
                }
                _ => {}
            }
        }
        pieces.push(start..range.end);
        pieces
    }

    fn raw(&self, range: Range<usize>) -> String {
        match (self.tokens.get(range.start), range.end.checked_sub(1).and_then(|i| self.tokens.get(i))) {
            (Some(first), Some(last)) if !range.is_empty() => {
                self.text[first.span.start..last.span.end].to_string()
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<DirectiveKind> {
        parse(source).directives.into_iter().map(|d| d.kind).collect()
    }

    fn ident(name: &str) -> Expression {
        Expression::Identifier(name.into())
    }

    #[test]
    fn test_literal_includes() {
        let parsed = kinds("#include \"a.h\"\n# include <sys/types.h>\n#import <Foundation/Foundation.h>\n");
        assert_eq!(
            parsed,
            [
                DirectiveKind::Include {
                    expression: Expression::Quoted("a.h".into()),
                    angle: false,
                    is_import: false,
                },
                DirectiveKind::Include {
                    expression: Expression::System("sys/types.h".into()),
                    angle: true,
                    is_import: false,
                },
                DirectiveKind::Include {
                    expression: Expression::System("Foundation/Foundation.h".into()),
                    angle: true,
                    is_import: true,
                },
            ]
        );
    }

    #[test]
    fn test_include_next_is_include() {
        let parsed = kinds("#include_next <limits.h>\n");
        assert!(matches!(
            &parsed[0],
            DirectiveKind::Include { expression: Expression::System(p), angle: true, is_import: false } if p == "limits.h"
        ));
    }

    #[test]
    fn test_macro_includes() {
        let parsed = kinds("#include HEADER\n#include F(A, B)\n#include F (\"x.h\")\n");
        let expressions: Vec<Expression> = parsed
            .into_iter()
            .map(|k| match k {
                DirectiveKind::Include { expression, angle, .. } => {
                    assert!(!angle);
                    expression
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(expressions[0], ident("HEADER"));
        assert_eq!(
            expressions[1],
            Expression::Call {
                name: "F".into(),
                args: vec![ident("A"), ident("B")],
            }
        );
        assert_eq!(
            expressions[2],
            Expression::Call {
                name: "F".into(),
                args: vec![Expression::Quoted("x.h".into())],
            }
        );
    }

    #[test]
    fn test_object_like_define() {
        let parsed = kinds("#define HDR \"c.h\"\n#define SYS <vector>\n#define EMPTY\n#define PAREN (x)\n");
        assert_eq!(
            parsed[0],
            DirectiveKind::Define {
                name: "HDR".into(),
                body: Expression::Quoted("c.h".into()),
            }
        );
        assert_eq!(
            parsed[1],
            DirectiveKind::Define {
                name: "SYS".into(),
                body: Expression::System("vector".into()),
            }
        );
        assert_eq!(
            parsed[2],
            DirectiveKind::Define {
                name: "EMPTY".into(),
                body: Expression::Tokens(String::new()),
            }
        );
        // A space before `(` makes it object-like.
        assert_eq!(
            parsed[3],
            DirectiveKind::Define {
                name: "PAREN".into(),
                body: Expression::Tokens("(x)".into()),
            }
        );
    }

    #[test]
    fn test_function_like_define_maps_parameters() {
        let parsed = kinds("#define PICK(a, b) b\n#define STR(x) #x\n#define CAT(a, b) a ## b\n");
        assert_eq!(
            parsed[0],
            DirectiveKind::DefineFunction {
                name: "PICK".into(),
                parameter_count: 2,
                body: Expression::Parameter(1),
            }
        );
        assert_eq!(
            parsed[1],
            DirectiveKind::DefineFunction {
                name: "STR".into(),
                parameter_count: 1,
                body: Expression::Stringify(Box::new(Expression::Parameter(0))),
            }
        );
        assert_eq!(
            parsed[2],
            DirectiveKind::DefineFunction {
                name: "CAT".into(),
                parameter_count: 2,
                body: Expression::Concat(
                    Box::new(Expression::Parameter(0)),
                    Box::new(Expression::Parameter(1)),
                ),
            }
        );
    }

    #[test]
    fn test_concat_with_multi_token_operand() {
        let body = parse_with_parameters("name ## _impl.h", &["name".into()]);
        assert_eq!(
            body,
            Expression::Concat(
                Box::new(Expression::Parameter(0)),
                Box::new(Expression::Tokens("_impl.h".into())),
            )
        );
    }

    #[test]
    fn test_variadic_parameters() {
        let parsed = kinds("#define FIRST(...) __VA_ARGS__\n#define NAMED(fmt, rest...) rest\n#define NONE() \"n.h\"\n");
        assert_eq!(
            parsed[0],
            DirectiveKind::DefineFunction {
                name: "FIRST".into(),
                parameter_count: 1,
                body: Expression::Parameter(0),
            }
        );
        assert_eq!(
            parsed[1],
            DirectiveKind::DefineFunction {
                name: "NAMED".into(),
                parameter_count: 2,
                body: Expression::Parameter(1),
            }
        );
        assert_eq!(
            parsed[2],
            DirectiveKind::DefineFunction {
                name: "NONE".into(),
                parameter_count: 0,
                body: Expression::Quoted("n.h".into()),
            }
        );
    }

    #[test]
    fn test_undef_and_conditionals() {
        let parsed = kinds("#ifdef FOO\n#undef BAR\n#elif defined(X) && Y > 2\n#else\n#endif\n");
        assert_eq!(
            parsed,
            [
                DirectiveKind::Conditional {
                    kind: ConditionalKind::Ifdef,
                    condition: "FOO".into(),
                },
                DirectiveKind::Undef { name: "BAR".into() },
                DirectiveKind::Conditional {
                    kind: ConditionalKind::Elif,
                    condition: "defined(X) && Y > 2".into(),
                },
                DirectiveKind::Conditional {
                    kind: ConditionalKind::Else,
                    condition: String::new(),
                },
                DirectiveKind::Conditional {
                    kind: ConditionalKind::Endif,
                    condition: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_ignored_directives_and_line_numbers() {
        let source = "#pragma once\n#error nope\n#line 10\n\n/* c */\n#include \"a.h\"\nint x; // #include \"no.h\"\n#warning w\n";
        let parsed = parse(source);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.directives[0].line, 6);
    }

    #[test]
    fn test_commented_out_include_is_skipped() {
        let parsed = parse("/*\n#include \"gone.h\"\n*/\n#include \"kept.h\"\n");
        assert_eq!(parsed.len(), 1);
        assert!(matches!(
            &parsed.directives[0].kind,
            DirectiveKind::Include { expression: Expression::Quoted(p), .. } if p == "kept.h"
        ));
        assert!(!parsed.has_macro_includes());
    }

    #[test]
    fn test_nested_call_arguments() {
        let expr = parse_expression("OUTER(INNER(a, b), \"c.h\")");
        assert_eq!(
            expr,
            Expression::Call {
                name: "OUTER".into(),
                args: vec![
                    Expression::Call {
                        name: "INNER".into(),
                        args: vec![ident("a"), ident("b")],
                    },
                    Expression::Quoted("c.h".into()),
                ],
            }
        );
    }
}
