//! Selection of the declarations that receive segments.

use crate::syntax::{CompilationUnit, Declaration};

/// Function and method declarations with a body, in source order.
///
/// Signature-only declarations are skipped. Interface methods and
/// function-typed fields are not declarations at all.
pub fn declarations(unit: &mut CompilationUnit) -> impl Iterator<Item = &mut Declaration> {
    unit.decls.iter_mut().filter(|decl| has_body(decl))
}

/// Read-only counterpart of [`declarations`].
pub fn bodied(unit: &CompilationUnit) -> impl Iterator<Item = &Declaration> {
    unit.decls.iter().filter(|decl| has_body(decl))
}

fn has_body(decl: &Declaration) -> bool {
    decl.body.is_some()
}
