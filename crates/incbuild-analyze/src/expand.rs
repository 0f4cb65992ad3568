//! Macro expansion of include expressions.
//!
//! An include written as `#include NAME` or `#include F(A, B)` is reduced
//! against the macro table in effect at that point. Arguments are fully
//! expanded before substitution unless they are operands of `#` or `##`.
//! Each alternative definition of a macro yields its own result.

use serde::{Deserialize, Serialize};
use strum::Display;

use incbuild_core::{DEFAULT_MAX_ALTERNATIVES, DEFAULT_MAX_EXPANSION_DEPTH};
use incbuild_parse::{Expression, IncludeKind, MacroBody, MacroFunction, MacroTable, parse_expression};

/// Bounds on one include's expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionLimits {
    pub max_depth: usize,
    pub max_alternatives: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
        }
    }
}

/// A literal include target produced by expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeTarget {
    pub kind: IncludeKind,
    pub path: String,
}

impl IncludeTarget {
    pub fn quoted(path: impl Into<String>) -> Self {
        Self {
            kind: IncludeKind::Quoted,
            path: path.into(),
        }
    }

    pub fn system(path: impl Into<String>) -> Self {
        Self {
            kind: IncludeKind::System,
            path: path.into(),
        }
    }
}

/// Why an include (or one alternative of it) did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum UnresolvedReason {
    #[strum(to_string = "{target} not found")]
    NotFound { target: String },

    #[strum(to_string = "unknown macro {name}")]
    UnknownMacro { name: String },

    #[strum(to_string = "{text} is not an include target")]
    NotATarget { text: String },

    #[strum(to_string = "expansion deeper than {limit}")]
    DepthExceeded { limit: usize },

    #[strum(to_string = "more than {limit} alternatives")]
    TooManyAlternatives { limit: usize },
}

impl UnresolvedReason {
    /// Whether an expansion bound was hit.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::DepthExceeded { .. } | Self::TooManyAlternatives { .. })
    }
}

/// Result of expanding one include expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Distinct literal targets, in discovery order.
    pub targets: Vec<IncludeTarget>,
    /// Alternatives that did not reduce to a literal target.
    pub failures: Vec<UnresolvedReason>,
    /// Every definition consulted.
    pub macros_used: Vec<MacroFunction>,
}

impl Expansion {
    pub fn overflowed(&self) -> bool {
        self.failures.iter().any(UnresolvedReason::is_overflow)
    }
}

/// Expand `expression` against `table`.
pub fn expand_include(expression: &Expression, table: &MacroTable, limits: &ExpansionLimits) -> Expansion {
    let mut expander = Expander {
        table,
        limits,
        used: Vec::new(),
    };

    let mut expansion = Expansion::default();
    match expander.expand(expression, 0) {
        Ok(results) => {
            for result in results {
                match literal_target(&result) {
                    Ok(target) if !expansion.targets.contains(&target) => expansion.targets.push(target),
                    Ok(_) => {}
                    Err(reason) if !expansion.failures.contains(&reason) => expansion.failures.push(reason),
                    Err(_) => {}
                }
            }
        }
        Err(overflow) => expansion.failures.push(overflow),
    }
    expansion.macros_used = expander.used;
    expansion
}

/// Interpret a fully expanded expression as an include target.
fn literal_target(expression: &Expression) -> Result<IncludeTarget, UnresolvedReason> {
    match expression {
        Expression::Quoted(path) => Ok(IncludeTarget::quoted(path.clone())),
        Expression::System(path) => Ok(IncludeTarget::system(path.clone())),
        Expression::Tokens(text) => {
            let text = text.trim();
            if let Some(path) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                Ok(IncludeTarget::quoted(path))
            } else if let Some(path) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
                Ok(IncludeTarget::system(path.trim()))
            } else {
                Err(UnresolvedReason::NotATarget { text: text.to_string() })
            }
        }
        Expression::Identifier(name) | Expression::Call { name, .. } => Err(UnresolvedReason::UnknownMacro {
            name: name.to_string(),
        }),
        other => Err(UnresolvedReason::NotATarget {
            text: other.spelling(),
        }),
    }
}

struct Expander<'a> {
    table: &'a MacroTable,
    limits: &'a ExpansionLimits,
    used: Vec<MacroFunction>,
}

type Alternatives = Result<Vec<Expression>, UnresolvedReason>;

impl Expander<'_> {
    fn expand(&mut self, expression: &Expression, depth: usize) -> Alternatives {
        if depth > self.limits.max_depth {
            return Err(UnresolvedReason::DepthExceeded {
                limit: self.limits.max_depth,
            });
        }

        let table = self.table;
        let results = match expression {
            Expression::Identifier(name) => {
                let definitions = table.alternatives(name, 0);
                if definitions.is_empty() {
                    return Ok(vec![expression.clone()]);
                }
                let mut results = Vec::new();
                for definition in definitions {
                    self.note(definition);
                    results.extend(self.invoke(definition, &[], depth)?);
                }
                results
            }
            Expression::Call { name, args } => {
                let definitions = table.definitions_of(name, Some(args.len()));
                if definitions.is_empty() {
                    return self.call_through_alias(name, args, depth);
                }
                let mut results = Vec::new();
                for definition in definitions {
                    self.note(definition);
                    results.extend(self.invoke(definition, args, depth)?);
                }
                results
            }
            Expression::Concat(lhs, rhs) => {
                let mut results = Vec::new();
                for pasted in self.paste(lhs, rhs)? {
                    results.extend(self.expand(&pasted, depth + 1)?);
                }
                results
            }
            Expression::Stringify(operand) => vec![Expression::Quoted(operand.spelling())],
            Expression::Quoted(_) | Expression::System(_) | Expression::Parameter(_) | Expression::Tokens(_) => {
                vec![expression.clone()]
            }
        };

        self.check_fan_out(&results)?;
        Ok(results)
    }

    /// Expand one definition applied to `args`.
    fn invoke(&mut self, definition: &MacroFunction, args: &[Expression], depth: usize) -> Alternatives {
        match definition.body() {
            MacroBody::Constant { .. } => Ok(vec![definition.body().to_expression()]),
            MacroBody::Parameter(index) => match args.get(*index) {
                Some(arg) => self.expand(arg, depth + 1),
                None => Ok(vec![Expression::Tokens(String::new())]),
            },
            MacroBody::Expression(body) => {
                let mut results = Vec::new();
                for expanded in self.expand_arguments(args, depth)? {
                    let substituted = substitute(body, args, &expanded);
                    results.extend(self.expand(&substituted, depth + 1)?);
                }
                Ok(results)
            }
        }
    }

    /// `NAME(args)` where `NAME` is only object-like: expand the name, then
    /// call whatever it expanded to.
    fn call_through_alias(&mut self, name: &str, args: &[Expression], depth: usize) -> Alternatives {
        let table = self.table;
        let aliases = table.definitions_of(name, None);
        if aliases.is_empty() {
            return Ok(vec![Expression::Call {
                name: name.into(),
                args: args.to_vec(),
            }]);
        }

        let mut results = Vec::new();
        for alias in aliases {
            self.note(alias);
            for callee in self.invoke(alias, &[], depth)? {
                match callee {
                    Expression::Identifier(callee) => {
                        let call = Expression::Call {
                            name: callee,
                            args: args.to_vec(),
                        };
                        results.extend(self.expand(&call, depth + 1)?);
                    }
                    other => {
                        let args = args.iter().map(Expression::spelling).collect::<Vec<_>>().join(", ");
                        results.push(Expression::Tokens(format!("{}({args})", other.spelling())));
                    }
                }
            }
        }
        self.check_fan_out(&results)?;
        Ok(results)
    }

    /// Every combination of fully expanded arguments.
    fn expand_arguments(&mut self, args: &[Expression], depth: usize) -> Result<Vec<Vec<Expression>>, UnresolvedReason> {
        let mut combinations: Vec<Vec<Expression>> = vec![Vec::new()];
        for arg in args {
            let alternatives = self.expand(arg, depth + 1)?;
            let mut next = Vec::with_capacity(combinations.len() * alternatives.len());
            for prefix in &combinations {
                for alternative in &alternatives {
                    let mut combination = prefix.clone();
                    combination.push(alternative.clone());
                    next.push(combination);
                }
            }
            self.check_fan_out(&next)?;
            combinations = next;
        }
        Ok(combinations)
    }

    /// Paste the spellings of both operands and re-parse the result.
    ///
    /// Operands of `##` are not macro-expanded first.
    fn paste(&self, lhs: &Expression, rhs: &Expression) -> Alternatives {
        let left = self.paste_operand(lhs)?;
        let right = self.paste_operand(rhs)?;
        let mut results = Vec::with_capacity(left.len() * right.len());
        for l in &left {
            for r in &right {
                results.push(parse_expression(&format!("{}{}", l.spelling(), r.spelling())));
            }
        }
        self.check_fan_out(&results)?;
        Ok(results)
    }

    fn paste_operand(&self, operand: &Expression) -> Alternatives {
        match operand {
            Expression::Concat(lhs, rhs) => self.paste(lhs, rhs),
            other => Ok(vec![other.clone()]),
        }
    }

    fn check_fan_out<T>(&self, results: &[T]) -> Result<(), UnresolvedReason> {
        if results.len() > self.limits.max_alternatives {
            return Err(UnresolvedReason::TooManyAlternatives {
                limit: self.limits.max_alternatives,
            });
        }
        Ok(())
    }

    fn note(&mut self, definition: &MacroFunction) {
        if !self.used.contains(definition) {
            self.used.push(definition.clone());
        }
    }
}

/// Replace parameter slots in `body`.
///
/// Plain slots take the expanded argument; operands of `#` and `##` take
/// the argument as written.
fn substitute(body: &Expression, raw: &[Expression], expanded: &[Expression]) -> Expression {
    match body {
        Expression::Parameter(index) => expanded
            .get(*index)
            .cloned()
            .unwrap_or_else(|| Expression::Tokens(String::new())),
        Expression::Stringify(operand) => {
            let operand = substitute_raw(operand, raw);
            Expression::Quoted(operand.spelling())
        }
        Expression::Concat(lhs, rhs) => Expression::Concat(
            Box::new(substitute_raw(lhs, raw)),
            Box::new(substitute_raw(rhs, raw)),
        ),
        Expression::Call { name, args } => Expression::Call {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, raw, expanded)).collect(),
        },
        other => other.clone(),
    }
}

fn substitute_raw(operand: &Expression, raw: &[Expression]) -> Expression {
    match operand {
        Expression::Parameter(index) => raw
            .get(*index)
            .cloned()
            .unwrap_or_else(|| Expression::Tokens(String::new())),
        Expression::Concat(lhs, rhs) => Expression::Concat(
            Box::new(substitute_raw(lhs, raw)),
            Box::new(substitute_raw(rhs, raw)),
        ),
        Expression::Call { name, args } => Expression::Call {
            name: name.clone(),
            args: args.iter().map(|a| substitute_raw(a, raw)).collect(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incbuild_parse::{DirectiveKind, parse};

    /// Apply `source`'s definitions and expand its last include.
    fn expand_last(source: &str, limits: ExpansionLimits) -> Expansion {
        let mut table = MacroTable::new();
        let mut last = None;
        for directive in &parse(source) {
            match &directive.kind {
                DirectiveKind::Include { expression, .. } => last = Some(expression.clone()),
                other => table.apply(other),
            }
        }
        let expression = last.unwrap();
        expand_include(&expression, &table, &limits)
    }

    fn targets(source: &str) -> Vec<IncludeTarget> {
        let expansion = expand_last(source, ExpansionLimits::default());
        assert!(expansion.failures.is_empty(), "{:?}", expansion.failures);
        expansion.targets
    }

    #[test]
    fn test_literal_passes_through() {
        assert_eq!(targets("#include \"a.h\"\n"), [IncludeTarget::quoted("a.h")]);
        assert_eq!(targets("#include <b.h>\n"), [IncludeTarget::system("b.h")]);
    }

    #[test]
    fn test_object_like_chain() {
        let found = targets("#define INNER <vector>\n#define OUTER INNER\n#include OUTER\n");
        assert_eq!(found, [IncludeTarget::system("vector")]);
    }

    #[test]
    fn test_function_like_selects_argument() {
        let found = targets("#define PICK(a, b) b\n#include PICK(\"no.h\", \"yes.h\")\n");
        assert_eq!(found, [IncludeTarget::quoted("yes.h")]);
    }

    #[test]
    fn test_arguments_expanded_before_substitution() {
        let found = targets("#define HDR \"c.h\"\n#define ID(x) x\n#include ID(HDR)\n");
        assert_eq!(found, [IncludeTarget::quoted("c.h")]);
    }

    #[test]
    fn test_stringify_uses_raw_argument() {
        let source = "#define NAME other.h\n#define STR(x) #x\n#include STR(NAME)\n";
        assert_eq!(targets(source), [IncludeTarget::quoted("NAME")]);

        let source = "#define NAME other.h\n#define STR(x) #x\n#define XSTR(x) STR(x)\n#include XSTR(NAME)\n";
        assert_eq!(targets(source), [IncludeTarget::quoted("other.h")]);
    }

    #[test]
    fn test_concatenation_include() {
        let source = "#define STR(x) #x\n#define XSTR(x) STR(x)\n#define PLATFORM_HEADER(name) XSTR(name ## _platform.h)\n#include PLATFORM_HEADER(linux)\n";
        let expansion = expand_last(source, ExpansionLimits::default());
        assert_eq!(expansion.targets, [IncludeTarget::quoted("linux_platform.h")]);
        let used: Vec<&str> = expansion.macros_used.iter().map(MacroFunction::name).collect();
        assert_eq!(used, ["PLATFORM_HEADER", "XSTR", "STR"]);
    }

    #[test]
    fn test_pasted_identifier_is_expanded() {
        let source = "#define CONFIG_debug \"debug.h\"\n#define SELECT(mode) CONFIG_ ## mode\n#include SELECT(debug)\n";
        assert_eq!(targets(source), [IncludeTarget::quoted("debug.h")]);
    }

    #[test]
    fn test_object_alias_of_function_like() {
        let source = "#define F(x) x\n#define G F\n#include G(\"a.h\")\n";
        let expansion = expand_last(source, ExpansionLimits::default());
        assert_eq!(expansion.targets, [IncludeTarget::quoted("a.h")]);
        let used: Vec<&str> = expansion.macros_used.iter().map(MacroFunction::name).collect();
        assert_eq!(used, ["G", "F"]);

        let not_callable = expand_last("#define G \"a.h\"\n#include G(\"b.h\")\n", ExpansionLimits::default());
        assert!(not_callable.targets.is_empty());
        assert!(matches!(not_callable.failures[..], [UnresolvedReason::NotATarget { .. }]));
    }

    #[test]
    fn test_unknown_macro() {
        let expansion = expand_last("#include MISSING\n", ExpansionLimits::default());
        assert!(expansion.targets.is_empty());
        assert_eq!(
            expansion.failures,
            [UnresolvedReason::UnknownMacro {
                name: "MISSING".into()
            }]
        );
        assert!(!expansion.overflowed());
    }

    #[test]
    fn test_depth_overflow() {
        let expansion = expand_last("#define LOOP LOOP\n#include LOOP\n", ExpansionLimits::default());
        assert!(expansion.targets.is_empty());
        assert!(expansion.overflowed());
        assert_eq!(
            expansion.failures,
            [UnresolvedReason::DepthExceeded {
                limit: DEFAULT_MAX_EXPANSION_DEPTH
            }]
        );
    }

    #[test]
    fn test_depth_limit_is_configurable() {
        let source = "#define A B\n#define B C\n#define C \"c.h\"\n#include A\n";
        let shallow = ExpansionLimits {
            max_depth: 1,
            ..Default::default()
        };
        assert!(expand_last(source, shallow).overflowed());
        assert_eq!(targets(source), [IncludeTarget::quoted("c.h")]);
    }

    #[test]
    fn test_alternatives_from_branches() {
        let source = "#ifdef _WIN32\n#define PLATFORM \"win.h\"\n#else\n#define PLATFORM \"posix.h\"\n#endif\n#include PLATFORM\n";
        assert_eq!(
            targets(source),
            [IncludeTarget::quoted("win.h"), IncludeTarget::quoted("posix.h")]
        );
    }

    #[test]
    fn test_alternatives_fan_out_is_capped() {
        let source = "#if A\n#define H \"1.h\"\n#elif B\n#define H \"2.h\"\n#else\n#define H \"3.h\"\n#endif\n#include H\n";
        let tight = ExpansionLimits {
            max_alternatives: 2,
            ..Default::default()
        };
        let expansion = expand_last(source, tight);
        assert!(expansion.targets.is_empty());
        assert_eq!(expansion.failures, [UnresolvedReason::TooManyAlternatives { limit: 2 }]);
    }

    #[test]
    fn test_not_a_target() {
        let expansion = expand_last("#define N 42\n#include N\n", ExpansionLimits::default());
        assert_eq!(
            expansion.failures,
            [UnresolvedReason::NotATarget { text: "42".into() }]
        );
    }
}
