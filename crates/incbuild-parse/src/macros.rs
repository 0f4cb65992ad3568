//! Macro definitions and the per-traversal macro table.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::directive::{ConditionalKind, DirectiveKind, Expression};

/// Which search order a literal include target uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum IncludeKind {
    /// `"path"`: including directory first.
    Quoted,
    /// `<path>`: system search paths only.
    System,
}

/// What a macro expands to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroBody {
    /// A literal include target.
    Constant { kind: IncludeKind, value: String },
    /// The body is one of the arguments, unchanged.
    Parameter(usize),
    /// Needs further expansion.
    Expression(Expression),
}

impl MacroBody {
    /// Classify a parsed body.
    pub fn from_expression(body: Expression) -> Self {
        match body {
            Expression::Quoted(value) => Self::Constant {
                kind: IncludeKind::Quoted,
                value,
            },
            Expression::System(value) => Self::Constant {
                kind: IncludeKind::System,
                value,
            },
            Expression::Parameter(index) => Self::Parameter(index),
            other => Self::Expression(other),
        }
    }

    /// The body as an expression again.
    pub fn to_expression(&self) -> Expression {
        match self {
            Self::Constant {
                kind: IncludeKind::Quoted,
                value,
            } => Expression::Quoted(value.clone()),
            Self::Constant {
                kind: IncludeKind::System,
                value,
            } => Expression::System(value.clone()),
            Self::Parameter(index) => Expression::Parameter(*index),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

/// A macro definition.
///
/// Object-like macros have no parameter count; `F()` has a count of zero.
/// Equality compares name and arity first, then the body. Bodies of
/// different kinds are unequal without looking at their fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroFunction {
    name: CompactString,
    parameter_count: Option<usize>,
    body: MacroBody,
}

impl MacroFunction {
    pub fn object(name: impl Into<CompactString>, body: Expression) -> Self {
        Self {
            name: name.into(),
            parameter_count: None,
            body: MacroBody::from_expression(body),
        }
    }

    pub fn function(name: impl Into<CompactString>, parameter_count: usize, body: Expression) -> Self {
        Self {
            name: name.into(),
            parameter_count: Some(parameter_count),
            body: MacroBody::from_expression(body),
        }
    }

    /// The definition made by a `#define`, if `kind` is one.
    pub fn from_directive(kind: &DirectiveKind) -> Option<Self> {
        match kind {
            DirectiveKind::Define { name, body } => Some(Self::object(name.clone(), body.clone())),
            DirectiveKind::DefineFunction {
                name,
                parameter_count,
                body,
            } => Some(Self::function(name.clone(), *parameter_count, body.clone())),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_count(&self) -> Option<usize> {
        self.parameter_count
    }

    pub fn is_function_like(&self) -> bool {
        self.parameter_count.is_some()
    }

    pub fn body(&self) -> &MacroBody {
        &self.body
    }
}

type Definitions = IndexMap<CompactString, Vec<MacroFunction>>;

/// Alternatives of one name, `None` when undefined.
type Slot = Option<Vec<MacroFunction>>;

/// Saved state of one open `#if` group.
///
/// Only names some branch touched are saved, with their value at the `#if`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ConditionalFrame {
    base: IndexMap<CompactString, Slot>,
    branches: Vec<IndexMap<CompactString, Slot>>,
    saw_else: bool,
}

/// Macro definitions visible at a point of one root's traversal.
///
/// Every branch of a conditional group is scanned. Inside a branch,
/// definitions apply in order. When the group closes, the branch results
/// (and the state before the group, when there was no `#else`) are merged
/// as a union, so one name may carry several alternative definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroTable {
    definitions: Definitions,
    frames: Vec<ConditionalFrame>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, shadowing any with the same name and arity.
    pub fn define(&mut self, definition: MacroFunction) {
        self.touch(&definition.name);
        let slot = self.definitions.entry(definition.name.clone()).or_default();
        slot.retain(|d| d.parameter_count != definition.parameter_count);
        slot.push(definition);
    }

    /// Remove every arity of `name`. Returns whether anything was defined.
    pub fn undefine(&mut self, name: &str) -> bool {
        self.touch(name);
        self.definitions.shift_remove(name).is_some()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// The most recent definition `name` invoked with `arg_count`
    /// arguments resolves to.
    pub fn lookup(&self, name: &str, arg_count: usize) -> Option<&MacroFunction> {
        self.alternatives(name, arg_count).pop()
    }

    /// Every alternative definition, oldest first.
    ///
    /// For zero arguments object-like definitions win over zero-parameter
    /// function-like ones.
    pub fn alternatives(&self, name: &str, arg_count: usize) -> Vec<&MacroFunction> {
        if arg_count == 0 {
            let objects = self.definitions_of(name, None);
            if !objects.is_empty() {
                return objects;
            }
        }
        self.definitions_of(name, Some(arg_count))
    }

    /// Alternatives of `name` with exactly this arity, oldest first.
    pub fn definitions_of(&self, name: &str, parameter_count: Option<usize>) -> Vec<&MacroFunction> {
        self.definitions.get(name).map_or_else(Vec::new, |all| {
            all.iter()
                .filter(|d| d.parameter_count == parameter_count)
                .collect()
        })
    }

    /// Number of defined names.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(CompactString::as_str)
    }

    /// Conditional groups currently open.
    pub fn open_conditionals(&self) -> usize {
        self.frames.len()
    }

    /// Apply a non-include directive.
    pub fn apply(&mut self, directive: &DirectiveKind) {
        match directive {
            DirectiveKind::Define { .. } | DirectiveKind::DefineFunction { .. } => {
                if let Some(definition) = MacroFunction::from_directive(directive) {
                    self.define(definition);
                }
            }
            DirectiveKind::Undef { name } => {
                self.undefine(name);
            }
            DirectiveKind::Conditional { kind, .. } => match kind {
                k if k.opens() => self.enter_conditional(),
                k if k.continues() => self.next_branch(*k == ConditionalKind::Else),
                _ => self.end_conditional(),
            },
            DirectiveKind::Include { .. } => {}
        }
    }

    /// `#if`, `#ifdef`, `#ifndef`.
    pub fn enter_conditional(&mut self) {
        self.frames.push(ConditionalFrame::default());
    }

    /// `#elif` and friends, or `#else` when `is_else`.
    pub fn next_branch(&mut self, is_else: bool) {
        let Some(frame) = self.frames.last_mut() else {
            tracing::debug!("branch directive outside a conditional ignored");
            return;
        };
        let result = current_slots(&self.definitions, &frame.base);
        frame.branches.push(result);
        frame.saw_else |= is_else;
        for (name, slot) in &frame.base {
            set_slot(&mut self.definitions, name.clone(), slot.clone());
        }
    }

    /// `#endif`: merge the group's branches.
    pub fn end_conditional(&mut self) {
        let Some(frame) = self.frames.pop() else {
            tracing::debug!("unbalanced #endif ignored");
            return;
        };
        let saw_else = frame.saw_else;
        let mut branches = frame.branches;
        branches.push(current_slots(&self.definitions, &frame.base));

        for (name, base) in frame.base {
            let mut merged: Vec<MacroFunction> = Vec::new();
            let results = (!saw_else)
                .then_some(&base)
                .into_iter()
                .chain(branches.iter().map(|b| b.get(&name).unwrap_or(&base)));
            for alternative in results.flatten().flatten() {
                if !merged.contains(alternative) {
                    merged.push(alternative.clone());
                }
            }
            self.touch(&name);
            set_slot(&mut self.definitions, name, (!merged.is_empty()).then_some(merged));
        }
    }

    /// Save `name`'s value in the innermost open group before it changes.
    fn touch(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            if !frame.base.contains_key(name) {
                frame.base.insert(name.into(), self.definitions.get(name).cloned());
            }
        }
    }

    /// Close every group left open.
    pub fn close_all(&mut self) {
        while !self.frames.is_empty() {
            self.end_conditional();
        }
    }
}

/// Current value of every name in `names`.
fn current_slots(definitions: &Definitions, names: &IndexMap<CompactString, Slot>) -> IndexMap<CompactString, Slot> {
    names
        .keys()
        .map(|name| (name.clone(), definitions.get(name).cloned()))
        .collect()
}

fn set_slot(definitions: &mut Definitions, name: CompactString, slot: Slot) {
    match slot {
        Some(alternatives) => {
            definitions.insert(name, alternatives);
        }
        None => {
            definitions.shift_remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn table_for(source: &str) -> MacroTable {
        let mut table = MacroTable::new();
        for directive in &parse(source) {
            table.apply(&directive.kind);
        }
        table
    }

    fn quoted(value: &str) -> MacroBody {
        MacroBody::Constant {
            kind: IncludeKind::Quoted,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_body_classification() {
        let table = table_for("#define A \"a.h\"\n#define B <b.h>\n#define C(x, y) y\n#define D(x) x ## _d.h\n");
        assert_eq!(table.lookup("A", 0).unwrap().body(), &quoted("a.h"));
        assert!(matches!(
            table.lookup("B", 0).unwrap().body(),
            MacroBody::Constant { kind: IncludeKind::System, .. }
        ));
        assert_eq!(table.lookup("C", 2).unwrap().body(), &MacroBody::Parameter(1));
        assert!(matches!(table.lookup("D", 1).unwrap().body(), MacroBody::Expression(_)));
        assert!(table.lookup("C", 1).is_none());
    }

    #[test]
    fn test_redefinition_shadows() {
        let table = table_for("#define H \"one.h\"\n#define H \"two.h\"\n");
        assert_eq!(table.alternatives("H", 0).len(), 1);
        assert_eq!(table.lookup("H", 0).unwrap().body(), &quoted("two.h"));
    }

    #[test]
    fn test_undef_removes_all_arities() {
        let mut table = table_for("#define M \"m.h\"\n#define M(x) x\n");
        assert!(table.lookup("M", 0).is_some());
        assert!(table.lookup("M", 1).is_some());

        table.apply(&DirectiveKind::Undef { name: "M".into() });
        assert!(table.lookup("M", 0).is_none());
        assert!(table.lookup("M", 1).is_none());
        assert!(!table.undefine("M"));
    }

    #[test]
    fn test_zero_args_prefers_object_like() {
        let table = table_for("#define Z() \"fn.h\"\n#define Z \"obj.h\"\n");
        assert_eq!(table.lookup("Z", 0).unwrap().body(), &quoted("obj.h"));

        let only_fn = table_for("#define Z() \"fn.h\"\n");
        assert_eq!(only_fn.lookup("Z", 0).unwrap().body(), &quoted("fn.h"));
    }

    #[test]
    fn test_equality_identity_then_body() {
        let a = MacroFunction::object("X", Expression::Quoted("x.h".into()));
        let b = MacroFunction::object("X", Expression::Quoted("x.h".into()));
        let other_kind = MacroFunction::object("X", Expression::Identifier("Y".into()));
        let other_arity = MacroFunction::function("X", 0, Expression::Quoted("x.h".into()));

        assert_eq!(a, b);
        assert_ne!(a, other_kind);
        assert_ne!(a, other_arity);
        assert_ne!(
            MacroFunction::function("P", 1, Expression::Parameter(0)),
            MacroFunction::function("P", 1, Expression::Quoted("0".into()))
        );
    }

    #[test]
    fn test_if_else_branches_become_alternatives() {
        let table = table_for(
            "#ifdef _WIN32\n#define PLATFORM \"win.h\"\n#else\n#define PLATFORM \"posix.h\"\n#endif\n",
        );
        let alternatives: Vec<&MacroBody> = table
            .alternatives("PLATFORM", 0)
            .into_iter()
            .map(MacroFunction::body)
            .collect();
        assert_eq!(alternatives, [&quoted("win.h"), &quoted("posix.h")]);
        assert_eq!(table.lookup("PLATFORM", 0).unwrap().body(), &quoted("posix.h"));
        assert_eq!(table.open_conditionals(), 0);
    }

    #[test]
    fn test_if_without_else_keeps_base() {
        let table = table_for("#define H \"base.h\"\n#if FEATURE\n#define H \"feature.h\"\n#endif\n");
        assert_eq!(table.alternatives("H", 0).len(), 2);
        assert_eq!(table.lookup("H", 0).unwrap().body(), &quoted("feature.h"));

        let unchanged = table_for("#define H \"base.h\"\n#ifdef X\n#endif\n");
        assert_eq!(unchanged.alternatives("H", 0).len(), 1);
    }

    #[test]
    fn test_undef_in_every_branch_removes() {
        let table = table_for("#define H \"h.h\"\n#if A\n#undef H\n#else\n#undef H\n#endif\n");
        assert!(!table.is_defined("H"));

        let partial = table_for("#define H \"h.h\"\n#if A\n#undef H\n#endif\n");
        assert!(partial.is_defined("H"));
    }

    #[test]
    fn test_sequential_inside_branch() {
        let table = table_for("#if A\n#define H \"one.h\"\n#undef H\n#define H \"two.h\"\n#else\n#endif\n");
        assert_eq!(table.alternatives("H", 0).len(), 1);
        assert_eq!(table.lookup("H", 0).unwrap().body(), &quoted("two.h"));
    }

    #[test]
    fn test_nested_conditionals() {
        let table = table_for(
            "#if A\n#if B\n#define H \"ab.h\"\n#elif C\n#define H \"ac.h\"\n#endif\n#else\n#define H \"x.h\"\n#endif\n",
        );
        assert_eq!(table.alternatives("H", 0).len(), 3);
    }

    #[test]
    fn test_unbalanced_and_open_frames() {
        let mut table = table_for("#endif\n#else\n#define H \"h.h\"\n#ifdef X\n#define H \"x.h\"\n");
        assert_eq!(table.open_conditionals(), 1);
        assert_eq!(table.alternatives("H", 0).len(), 1);

        table.close_all();
        assert_eq!(table.open_conditionals(), 0);
        assert_eq!(table.alternatives("H", 0).len(), 2);
    }

    #[test]
    fn test_table_serde_roundtrip() {
        let table = table_for("#define A \"a.h\"\n#define F(x) x\n#if X\n");
        let json = serde_json::to_string(&table).unwrap();
        let back: MacroTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.names().collect::<Vec<_>>(), ["A", "F"]);
    }

    #[test]
    fn test_group_saves_only_touched_names() {
        let mut source: String = (0..50).map(|i| format!("#define M{i} \"m{i}.h\"\n")).collect();
        source.push_str("#ifndef GUARD_H\n#define GUARD_H\n#undef M3\n");
        let mut table = table_for(&source);
        assert_eq!(table.frames[0].base.len(), 2);

        table.end_conditional();
        assert!(table.is_defined("GUARD_H"));
        assert!(table.is_defined("M3"));
        assert_eq!(table.len(), 51);
    }
}
