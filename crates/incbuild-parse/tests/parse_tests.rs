use incbuild_parse::{
    ConditionalKind, DirectiveKind, Expression, IncludeKind, MacroBody, MacroTable, parse,
};

const HEADER: &str = r#"/*
 * config.h
 * #include "not_a_directive.h"
 */
#ifndef CONFIG_H
#define CONFIG_H

#include <stddef.h>   // system
#include "local.h"    /* quoted */

#define STR(x) #x
#define XSTR(x) STR(x)
#define PLATFORM_HEADER(name) XSTR(name ## _platform.h)
#define BACKEND \
    "backend.h"

#if defined(USE_FAST)
#  define IMPL "fast.h"
#else
#  define IMPL "slow.h"
#endif

#include BACKEND
#include PLATFORM_HEADER(linux)
#pragma once
#endif /* CONFIG_H */
"#;

#[test]
fn test_realistic_header() {
    let parsed = parse(HEADER);

    let includes: Vec<(&Expression, bool, usize)> = parsed
        .includes()
        .map(|d| match &d.kind {
            DirectiveKind::Include { expression, angle, .. } => (expression, *angle, d.line),
            _ => unreachable!(),
        })
        .collect();

    assert_eq!(includes.len(), 4);
    assert_eq!(includes[0], (&Expression::System("stddef.h".into()), true, 8));
    assert_eq!(includes[1], (&Expression::Quoted("local.h".into()), false, 9));
    assert_eq!(includes[2].0, &Expression::Identifier("BACKEND".into()));
    assert_eq!(includes[2].2, 23);
    assert!(matches!(includes[3].0, Expression::Call { name, args } if name == "PLATFORM_HEADER" && args.len() == 1));
    assert!(parsed.has_macro_includes());

    let conditionals: Vec<ConditionalKind> = parsed
        .iter()
        .filter_map(|d| match &d.kind {
            DirectiveKind::Conditional { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        conditionals,
        [
            ConditionalKind::Ifndef,
            ConditionalKind::If,
            ConditionalKind::Else,
            ConditionalKind::Endif,
            ConditionalKind::Endif,
        ]
    );
}

#[test]
fn test_table_after_header() {
    let mut table = MacroTable::new();
    for directive in &parse(HEADER) {
        table.apply(&directive.kind);
    }

    assert_eq!(table.open_conditionals(), 0);
    assert_eq!(
        table.lookup("BACKEND", 0).map(|m| m.body().clone()),
        Some(MacroBody::Constant {
            kind: IncludeKind::Quoted,
            value: "backend.h".into(),
        })
    );
    assert_eq!(table.alternatives("IMPL", 0).len(), 2);
    assert_eq!(table.lookup("XSTR", 1).and_then(|m| m.parameter_count()), Some(1));
    assert!(table.is_defined("CONFIG_H"));
}
