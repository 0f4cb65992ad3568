//! Directive and expression types produced by the parser.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Structured form of an include target or a macro body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// `"path"`.
    Quoted(String),
    /// `<path>`.
    System(String),
    /// A bare name, possibly an object-like macro.
    Identifier(CompactString),
    /// `NAME(args...)`.
    Call {
        name: CompactString,
        args: Vec<Expression>,
    },
    /// `lhs ## rhs`.
    Concat(Box<Expression>, Box<Expression>),
    /// `#operand`.
    Stringify(Box<Expression>),
    /// Argument slot of a function-like macro body.
    Parameter(usize),
    /// Anything else, kept as written.
    Tokens(String),
}

impl Expression {
    /// Text form used for token pasting, stringification and reports.
    pub fn spelling(&self) -> String {
        match self {
            Self::Quoted(path) => format!("\"{path}\""),
            Self::System(path) => format!("<{path}>"),
            Self::Identifier(name) => name.to_string(),
            Self::Call { name, args } => {
                let args: Vec<String> = args.iter().map(Self::spelling).collect();
                format!("{name}({})", args.join(", "))
            }
            Self::Concat(lhs, rhs) => format!("{}{}", lhs.spelling(), rhs.spelling()),
            Self::Stringify(operand) => format!("#{}", operand.spelling()),
            Self::Parameter(index) => format!("__arg{index}"),
            Self::Tokens(text) => text.clone(),
        }
    }

    /// Whether this is a literal include target.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Quoted(_) | Self::System(_))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spelling())
    }
}

/// Conditional directive kinds. Recorded, never evaluated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ConditionalKind {
    If,
    Ifdef,
    Ifndef,
    Elif,
    Elifdef,
    Elifndef,
    Else,
    Endif,
}

impl ConditionalKind {
    /// Opens a new conditional group.
    pub fn opens(self) -> bool {
        matches!(self, Self::If | Self::Ifdef | Self::Ifndef)
    }

    /// Starts another branch of the innermost group.
    pub fn continues(self) -> bool {
        matches!(self, Self::Elif | Self::Elifdef | Self::Elifndef | Self::Else)
    }
}

/// What a directive says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveKind {
    /// `#include`, `#include_next` or `#import`.
    Include {
        expression: Expression,
        /// Written as a literal `<...>`.
        angle: bool,
        is_import: bool,
    },
    /// Object-like `#define NAME body`.
    Define {
        name: CompactString,
        body: Expression,
    },
    /// Function-like `#define NAME(params) body`.
    DefineFunction {
        name: CompactString,
        parameter_count: usize,
        body: Expression,
    },
    Undef {
        name: CompactString,
    },
    Conditional {
        kind: ConditionalKind,
        condition: String,
    },
}

/// A directive with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// 1-based.
    pub line: usize,
    pub kind: DirectiveKind,
}

/// Every directive of one file, in textual order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDirectives {
    pub directives: Vec<Directive>,
}

impl SourceDirectives {
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.directives.iter()
    }

    /// Include directives only.
    pub fn includes(&self) -> impl Iterator<Item = &Directive> {
        self.directives
            .iter()
            .filter(|d| matches!(d.kind, DirectiveKind::Include { .. }))
    }

    /// Whether any include goes through a macro.
    pub fn has_macro_includes(&self) -> bool {
        self.includes().any(|d| match &d.kind {
            DirectiveKind::Include { expression, .. } => !expression.is_literal(),
            _ => false,
        })
    }
}

impl<'a> IntoIterator for &'a SourceDirectives {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spelling() {
        let expr = Expression::Call {
            name: "F".into(),
            args: vec![
                Expression::Identifier("A".into()),
                Expression::Quoted("b.h".into()),
            ],
        };
        assert_eq!(expr.spelling(), "F(A, \"b.h\")");

        let pasted = Expression::Concat(
            Box::new(Expression::Identifier("foo".into())),
            Box::new(Expression::Tokens("_impl.h".into())),
        );
        assert_eq!(pasted.to_string(), "foo_impl.h");
        assert_eq!(Expression::System("sys/x.h".into()).spelling(), "<sys/x.h>");
    }

    #[test]
    fn test_conditional_kind_names() {
        assert_eq!("ifndef".parse::<ConditionalKind>().unwrap(), ConditionalKind::Ifndef);
        assert_eq!(ConditionalKind::Elif.to_string(), "elif");
        assert!(ConditionalKind::Ifdef.opens());
        assert!(ConditionalKind::Else.continues());
        assert!(!ConditionalKind::Endif.opens());
    }
}
