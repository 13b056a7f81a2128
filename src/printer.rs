//! Canonical printer for a mutated [`CompilationUnit`].
//!
//! Source-backed nodes are emitted verbatim. Synthetic imports and
//! statements are spliced in as text edits over the original source, laid
//! out the way gofmt would lay them out.

use std::ops::Range;

use crate::stmt::Stmt;
use crate::syntax::{Body, CompilationUnit, Declaration, ImportSpec, Origin, Statement, is_identifier};

struct Edit {
    range: Range<usize>,
    text: String,
}

/// Print `unit` back to Go source.
///
/// Fails only when the tree holds something that cannot be printed as valid
/// Go: a synthetic node with an invalid identifier, or a synthetic statement
/// that does not lead its body.
pub fn print(unit: &CompilationUnit) -> Result<String, String> {
    let src = unit.source.as_str();
    let mut edits: Vec<Edit> = Vec::new();

    if let Some(edit) = import_edit(unit)? {
        edits.push(edit);
    }
    for decl in &unit.decls {
        if let Some(body) = &decl.body {
            body_edits(src, decl, body, &mut edits)?;
        }
    }
    edits.sort_by_key(|edit| (edit.range.start, edit.range.end));

    let mut out = String::with_capacity(src.len() + edits.iter().map(|e| e.text.len()).sum::<usize>());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor {
            return Err(format!("overlapping edits at byte {}", edit.range.start));
        }
        out.push_str(&src[cursor..edit.range.start]);
        out.push_str(&edit.text);
        cursor = edit.range.end;
    }
    out.push_str(&src[cursor..]);

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    Ok(out)
}

/// Appended imports go after the last import declaration, or after the
/// package clause when there is none.
fn import_edit(unit: &CompilationUnit) -> Result<Option<Edit>, String> {
    let synthetic: Vec<&ImportSpec> = unit
        .imports
        .iter()
        .filter(|spec| spec.origin == Origin::Synthetic)
        .collect();
    if synthetic.is_empty() {
        return Ok(None);
    }

    let mut lines = Vec::with_capacity(synthetic.len());
    for spec in synthetic {
        lines.push(import_line(spec)?);
    }
    let src = unit.source.as_str();
    let (anchor, separator) = match &unit.import_region {
        Some(region) => (line_end(src, region.span.end), "\n"),
        None => (line_end(src, unit.package.span.end), "\n\n"),
    };
    Ok(Some(Edit {
        range: anchor..anchor,
        text: format!("{separator}{}", lines.join("\n")),
    }))
}

fn import_line(spec: &ImportSpec) -> Result<String, String> {
    match spec.name.as_deref() {
        None => Ok(format!("import {}", spec.path)),
        Some(name) if name == "." || name == "_" || is_identifier(name) => {
            Ok(format!("import {name} {}", spec.path))
        }
        Some(name) => Err(format!("invalid import name {name:?}")),
    }
}

fn body_edits(
    src: &str,
    decl: &Declaration,
    body: &Body,
    edits: &mut Vec<Edit>,
) -> Result<(), String> {
    let leading: Vec<&Stmt> = body
        .statements
        .iter()
        .map_while(|stmt| match stmt {
            Statement::Synthetic(stmt) => Some(stmt),
            Statement::Source(_) => None,
        })
        .collect();
    let synthetic_total = body
        .statements
        .iter()
        .filter(|stmt| matches!(stmt, Statement::Synthetic(_)))
        .count();
    if synthetic_total != leading.len() {
        return Err(format!(
            "{}: synthetic statements must lead the body",
            decl.display_name()
        ));
    }
    if leading.is_empty() {
        return Ok(());
    }

    let inner = match source_indent(src, body) {
        Some(indent) => indent.to_string(),
        None => format!("{}\t", decl.indent),
    };
    let mut lines = Vec::with_capacity(leading.len());
    for stmt in leading {
        stmt.validate()
            .map_err(|reason| format!("{}: {reason}", decl.display_name()))?;
        lines.push(format!("{inner}{stmt}"));
    }

    // `func f(){` becomes `func f() {`; a comment before the brace is kept.
    let gap = &src[body.lead..body.open];
    let (start, open) = if gap.trim().is_empty() {
        (body.lead, " {")
    } else {
        (body.open, "{")
    };

    if body.single_line {
        let mut text = format!("{open}\n");
        for line in &lines {
            text.push_str(line);
            text.push('\n');
        }
        for stmt in &body.statements {
            if let Statement::Source(source) = stmt {
                text.push_str(&inner);
                text.push_str(&src[source.span.clone()]);
                text.push('\n');
            }
        }
        text.push_str(&decl.indent);
        text.push('}');
        edits.push(Edit {
            range: start..body.close + 1,
            text,
        });
        return Ok(());
    }

    let after_open = body.open + 1;
    let eol = line_end(src, after_open);
    let rest = src[after_open..eol].trim();
    let new_lines: String = lines.iter().map(|line| format!("\n{line}")).collect();
    if start != body.open {
        edits.push(Edit {
            range: start..after_open,
            text: open.to_string(),
        });
    }
    if rest.is_empty() || rest.starts_with("//") {
        edits.push(Edit {
            range: eol..eol,
            text: new_lines,
        });
    } else {
        // Code shares the line with `{`: move it below the new statements.
        let tail = &src[after_open..eol];
        let code_start = after_open + (tail.len() - tail.trim_start().len());
        edits.push(Edit {
            range: after_open..code_start,
            text: format!("{new_lines}\n{inner}"),
        });
    }
    Ok(())
}

/// Indentation of the first source statement, when it starts its own line.
fn source_indent<'a>(src: &'a str, body: &Body) -> Option<&'a str> {
    if body.single_line {
        return None;
    }
    let first = body.statements.iter().find_map(|stmt| match stmt {
        Statement::Source(source) => Some(source),
        Statement::Synthetic(_) => None,
    })?;
    let line_start = src[..first.span.start].rfind('\n').map_or(0, |i| i + 1);
    let indent = &src[line_start..first.span.start];
    (line_start > body.open && !indent.is_empty() && indent.trim().is_empty()).then_some(indent)
}

/// Offset of the newline ending the line that contains `offset`.
fn line_end(src: &str, offset: usize) -> usize {
    src[offset..].find('\n').map_or(src.len(), |i| offset + i)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::imports::{self, Qualifier};
    use crate::stmt;
    use crate::syntax::parse;

    fn unit(source: &str) -> CompilationUnit {
        parse(Path::new("t.go"), source.as_bytes()).unwrap()
    }

    fn prepend(unit: &mut CompilationUnit, qualifier: &Qualifier) {
        for decl in &mut unit.decls {
            if let Some(body) = decl.body.as_mut() {
                let (context, request) = stmt::build(qualifier);
                body.statements.splice(
                    0..0,
                    [Statement::Synthetic(context), Statement::Synthetic(request)],
                );
            }
        }
    }

    #[test]
    fn untouched_unit_prints_verbatim() {
        let source = "package p\n\nimport \"fmt\"\n\nfunc f() {\n\tfmt.Println()\n}\n";
        assert_eq!(print(&unit(source)).unwrap(), source);
    }

    #[test]
    fn expands_single_line_body() {
        let mut u = unit("package p\n\nfunc f(){ return }\n");
        prepend(&mut u, &Qualifier::Default);
        assert_eq!(
            print(&u).unwrap(),
            "package p\n\nfunc f() {\n\
             \tdefer newrelic.FromContext(ctx).StartSegment(\"slow\").End()\n\
             \tdefer newrelic.FromContext(req.Context()).StartSegment(\"slow\").End()\n\
             \treturn\n\
             }\n"
        );
    }

    #[test]
    fn inserts_after_brace_line() {
        let mut u = unit("package p\n\nfunc f() { // entry\n\tdo()\n}\n");
        prepend(&mut u, &Qualifier::Alias("nr".into()));
        assert_eq!(
            print(&u).unwrap(),
            "package p\n\nfunc f() { // entry\n\
             \tdefer nr.FromContext(ctx).StartSegment(\"slow\").End()\n\
             \tdefer nr.FromContext(req.Context()).StartSegment(\"slow\").End()\n\
             \tdo()\n\
             }\n"
        );
    }

    #[test]
    fn moves_code_sharing_the_brace_line() {
        let mut u = unit("package p\n\nfunc f() { a()\n\tb()\n}\n");
        prepend(&mut u, &Qualifier::Dot);
        assert_eq!(
            print(&u).unwrap(),
            "package p\n\nfunc f() {\n\
             \tdefer FromContext(ctx).StartSegment(\"slow\").End()\n\
             \tdefer FromContext(req.Context()).StartSegment(\"slow\").End()\n\
             \ta()\n\
             \tb()\n\
             }\n"
        );
    }

    #[test]
    fn follows_space_indented_body() {
        let mut u = unit("package p\n\nfunc f() {\n    x := 1\n    _ = x\n}\n");
        prepend(&mut u, &Qualifier::Default);
        assert_eq!(
            print(&u).unwrap(),
            "package p\n\nfunc f() {\n\
             \x20   defer newrelic.FromContext(ctx).StartSegment(\"slow\").End()\n\
             \x20   defer newrelic.FromContext(req.Context()).StartSegment(\"slow\").End()\n\
             \x20   x := 1\n\
             \x20   _ = x\n\
             }\n"
        );
    }

    #[test]
    fn appends_import_after_package_clause() {
        let mut u = unit("package p\n\nvar x = 1\n");
        imports::resolve(&mut u).unwrap();
        assert_eq!(
            print(&u).unwrap(),
            format!("package p\n\nimport \"{}\"\n\nvar x = 1\n", imports::NEWRELIC_PATH)
        );
    }

    #[test]
    fn appends_import_after_existing_imports() {
        let mut u = unit("package p\n\nimport \"fmt\"\n\nvar x = fmt.Sprint()\n");
        imports::resolve(&mut u).unwrap();
        assert_eq!(
            print(&u).unwrap(),
            format!(
                "package p\n\nimport \"fmt\"\nimport \"{}\"\n\nvar x = fmt.Sprint()\n",
                imports::NEWRELIC_PATH
            )
        );
    }

    #[test]
    fn invalid_synthetic_identifier_is_an_error() {
        let mut u = unit("package p\n\nfunc f() {}\n");
        prepend(&mut u, &Qualifier::Alias("bad alias".into()));
        let err = print(&u).unwrap_err();
        assert!(err.contains("bad alias"), "got {err}");
    }

    #[test]
    fn synthetic_statement_after_source_is_an_error() {
        let mut u = unit("package p\n\nfunc f() {\n\tdo()\n}\n");
        let body = u.decls[0].body.as_mut().unwrap();
        body.statements
            .push(Statement::Synthetic(stmt::context_segment(&Qualifier::Default)));
        assert!(print(&u).is_err());
    }
}
