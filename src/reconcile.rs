//! Import reconciliation over printed source, in the manner of goimports.
//!
//! The import section is rewritten as a whole: `import "C"` declarations stay
//! separate and first, every other spec is merged into one declaration,
//! exact duplicates are dropped, specs are grouped (standard library first)
//! and sorted by path, and imports whose name is known and never used are
//! removed. Comments travel with the spec they document.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::Error;
use crate::imports;
use crate::syntax::{self, CompilationUnit};

/// One import after unquoting, ready to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Import {
    name: Option<String>,
    path: String,
    doc: Vec<String>,
    comment: Option<String>,
}

impl Import {
    /// Name the import binds in the file scope, when it can be known
    /// without loading the package: explicit names, the standard library,
    /// and the agent package.
    fn bound_name(&self) -> Option<String> {
        match self.name.as_deref() {
            Some("_") | Some(".") => None,
            Some(name) => Some(name.to_owned()),
            None => imports::known_name(&self.path),
        }
    }

    /// Dotless paths first, then by path and name.
    fn sort_key(&self) -> (bool, &str, Option<&str>) {
        (!imports::is_std_group(&self.path), &self.path, self.name.as_deref())
    }

    fn is_used(&self, uses: &BTreeSet<String>) -> bool {
        match self.name.as_deref() {
            Some("_") | Some(".") => true,
            _ => self.bound_name().is_none_or(|name| uses.contains(&name)),
        }
    }

    /// Doc lines, then `<indent><keyword>[name ]"path"[ comment]`.
    fn render(&self, indent: &str, keyword: &str) -> String {
        let mut out = String::new();
        for doc in &self.doc {
            out.push_str(indent);
            out.push_str(doc);
            out.push('\n');
        }
        out.push_str(indent);
        out.push_str(keyword);
        if let Some(name) = &self.name {
            out.push_str(name);
            out.push(' ');
        }
        out.push('"');
        out.push_str(&self.path);
        out.push('"');
        if let Some(comment) = &self.comment {
            out.push(' ');
            out.push_str(comment);
        }
        out
    }
}

/// Reconcile the imports of already printed source.
///
/// Printed source that no longer parses is a printer defect and reported as
/// [`Error::Format`]; problems with the imports themselves are
/// [`Error::ImportReconcile`].
pub fn reconcile(path: &Path, printed: &str) -> Result<String, Error> {
    let unit = syntax::parse(path, printed.as_bytes()).map_err(|e| match e {
        Error::Parse { path, reason } => Error::Format {
            path,
            reason: format!("printed source does not parse: {reason}"),
        },
        other => other,
    })?;
    let reconcile_error = |reason: String| Error::ImportReconcile {
        path: path.to_path_buf(),
        reason,
    };

    let Some(region) = &unit.import_region else {
        return Ok(printed.to_owned());
    };
    let section = render_section(&unit).map_err(reconcile_error)?;

    let head = &printed[..region.span.start];
    let tail = &printed[region.span.end..];
    let head_trimmed = head.trim_end();
    let tail_trimmed = tail.trim_start();

    let mut out = String::with_capacity(printed.len());
    out.push_str(head_trimmed);
    if section.is_empty() {
        if !tail_trimmed.is_empty() {
            out.push_str("\n\n");
            out.push_str(tail_trimmed);
        }
    } else {
        out.push_str(separator(&head[head_trimmed.len()..]));
        out.push_str(&section);
        if !tail_trimmed.is_empty() {
            out.push_str(separator(&tail[..tail.len() - tail_trimmed.len()]));
            out.push_str(tail_trimmed);
        }
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');

    syntax::parse(path, out.as_bytes())
        .map_err(|e| reconcile_error(format!("reconciled source does not parse: {e}")))?;
    log::debug!(
        "{}: reconciled {} import(s)",
        path.display(),
        unit.imports.len()
    );
    Ok(out)
}

/// Keep a single line break where the source had one (a comment attached to
/// the import section), otherwise a blank line.
fn separator(whitespace: &str) -> &'static str {
    if whitespace.matches('\n').count() <= 1 {
        "\n"
    } else {
        "\n\n"
    }
}

fn render_section(unit: &CompilationUnit) -> Result<String, String> {
    let mut cgo: Vec<Import> = Vec::new();
    let mut specs: Vec<Import> = Vec::new();
    for spec in &unit.imports {
        let import = Import {
            name: spec.name.clone(),
            path: imports::unquote(&spec.path)?,
            doc: spec.doc.clone(),
            comment: spec.comment.clone(),
        };
        if import.path == "C" {
            cgo.push(import);
        } else if !specs
            .iter()
            .any(|seen| seen.path == import.path && seen.name == import.name)
        {
            specs.push(import);
        }
    }

    check_conflicts(&specs)?;
    specs.retain(|import| {
        let used = import.is_used(&unit.qualifier_uses);
        if !used {
            log::debug!("removing unused import {:?}", import.path);
        }
        used
    });
    specs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let dangling = unit
        .import_region
        .as_ref()
        .map(|region| region.dangling.as_slice())
        .unwrap_or_default();

    let mut blocks: Vec<String> = cgo
        .iter()
        .map(|import| import.render("", "import "))
        .collect();

    match specs.as_slice() {
        [] if dangling.is_empty() => {}
        [only] if dangling.is_empty() => blocks.push(only.render("", "import ")),
        _ => {
            let mut block = String::from("import (\n");
            let mut previous_std: Option<bool> = None;
            for import in &specs {
                let std = imports::is_std_group(&import.path);
                if previous_std.is_some_and(|prev| prev != std) {
                    block.push('\n');
                }
                previous_std = Some(std);
                block.push_str(&import.render("\t", ""));
                block.push('\n');
            }
            for comment in dangling {
                block.push('\t');
                block.push_str(comment);
                block.push('\n');
            }
            block.push(')');
            blocks.push(block);
        }
    }

    Ok(blocks.join("\n\n"))
}

/// Two imports binding the same name to different packages cannot coexist.
fn check_conflicts(specs: &[Import]) -> Result<(), String> {
    let mut bound: BTreeMap<String, &str> = BTreeMap::new();
    for import in specs {
        let Some(name) = import.bound_name() else {
            continue;
        };
        match bound.get(&name) {
            Some(other) if *other != import.path => {
                return Err(format!(
                    "{name} redeclared: imported from both {other:?} and {:?}",
                    import.path
                ));
            }
            _ => {
                bound.insert(name, &import.path);
            }
        }
    }
    Ok(())
}
