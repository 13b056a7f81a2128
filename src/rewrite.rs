//! Segment injection over whole files: `transform` rewrites, `inspect` reports.

use std::path::Path;

use crate::error::Error;
use crate::imports;
use crate::locate;
use crate::printer;
use crate::reconcile;
use crate::stmt::{self, Stmt};
use crate::syntax::{self, Declaration, Position, Statement};

/// Knobs for [`transform_with`].
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Leave declarations alone when their body already defers a segment
    /// with the same call chain. Off by default: re-running duplicates the
    /// statements.
    pub skip_instrumented: bool,
}

/// A bodied declaration without a segment, as reported by [`inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// `Type.Method` or the bare function name.
    pub name: String,
    pub position: Position,
}

/// Rewrite `source` so that every function and method with a body starts
/// with the two segment statements, and the agent package is imported.
///
/// Either the whole file is transformed or an error is returned; there is no
/// partial output.
pub fn transform(filename: &str, source: &[u8]) -> Result<Vec<u8>, Error> {
    transform_with(filename, source, &Options::default())
}

pub fn transform_with(filename: &str, source: &[u8], options: &Options) -> Result<Vec<u8>, Error> {
    let path = Path::new(filename);
    let mut unit = syntax::parse(path, source)?;
    let qualifier = imports::resolve(&mut unit)?;

    let mut injected = 0usize;
    for decl in locate::declarations(&mut unit) {
        let (context, request) = stmt::build(&qualifier);
        if options.skip_instrumented && already_instrumented(decl, &context) {
            log::debug!("{filename}: {} already has a segment", decl.display_name());
            continue;
        }
        inject(decl, context, request);
        injected += 1;
    }
    log::debug!("{filename}: injected segments into {injected} declaration(s)");

    let printed = printer::print(&unit).map_err(|reason| Error::Format {
        path: path.to_path_buf(),
        reason,
    })?;
    let output = reconcile::reconcile(path, &printed)?;
    Ok(output.into_bytes())
}

/// Prepend `[context, request]` to the declaration's body. Declarations
/// without a body are left untouched.
pub fn inject(decl: &mut Declaration, context: Stmt, request: Stmt) {
    if let Some(body) = decl.body.as_mut() {
        body.statements.splice(
            0..0,
            [Statement::Synthetic(context), Statement::Synthetic(request)],
        );
    }
}

fn already_instrumented(decl: &Declaration, segment: &Stmt) -> bool {
    let chain = segment.call_chain();
    decl.body
        .as_ref()
        .is_some_and(|body| body.contains_call_chain(&chain))
}

/// Report every bodied declaration that defers no segment through the
/// agent import. Nothing is rewritten.
pub fn inspect(filename: &str, source: &[u8]) -> Result<Vec<Finding>, Error> {
    let unit = syntax::parse(Path::new(filename), source)?;
    let segment = imports::lookup(&unit)?.map(|qualifier| stmt::context_segment(&qualifier));
    Ok(locate::bodied(&unit)
        .filter(|decl| {
            !segment
                .as_ref()
                .is_some_and(|segment| already_instrumented(decl, segment))
        })
        .map(|decl| Finding {
            name: decl.display_name(),
            position: decl.position,
        })
        .collect())
}
