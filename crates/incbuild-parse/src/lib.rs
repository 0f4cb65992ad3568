//! Source directive parser and macro table for incbuild.
//!
//! [`parse`] turns a C-family source file into its ordered preprocessor
//! directives. Include targets and macro bodies are kept as structured
//! [`Expression`]s so that includes indirected through macros can be
//! resolved later against a [`MacroTable`].
//!
//! # Example
//!
//! ```rust
//! use incbuild_parse::{DirectiveKind, MacroTable, parse};
//!
//! let directives = parse("#define HDR \"config.h\"\n#include HDR\n");
//! let mut table = MacroTable::new();
//! for directive in &directives {
//!     if !matches!(directive.kind, DirectiveKind::Include { .. }) {
//!         table.apply(&directive.kind);
//!     }
//! }
//! assert!(table.lookup("HDR", 0).is_some());
//! ```

mod directive;
mod lexer;
mod macros;
mod parser;

pub use directive::{ConditionalKind, Directive, DirectiveKind, Expression, SourceDirectives};
pub use lexer::{LogicalLine, Token, TokenKind, logical_lines, tokenize};
pub use macros::{IncludeKind, MacroBody, MacroFunction, MacroTable};
pub use parser::{VA_ARGS, parse, parse_expression, parse_with_parameters};
