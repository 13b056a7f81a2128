//! Owned syntax model of one Go source file.
//!
//! The model is built from a tree-sitter parse and keeps the source text
//! alongside it: source-backed nodes are byte spans, so anything the
//! rewriter does not touch is printed back verbatim. Only the parts of the
//! file the instrumenter reasons about are modelled: the package clause, the
//! import section, and top-level function and method declarations.

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser, Tree};

use crate::error::Error;
use crate::stmt::Stmt;

/// One parsed source file.
#[derive(Debug)]
pub struct CompilationUnit {
    pub path: PathBuf,
    pub source: String,
    pub package: PackageClause,
    pub imports: Vec<ImportSpec>,
    /// Span from the first import declaration to the last one, if any.
    pub import_region: Option<ImportRegion>,
    pub decls: Vec<Declaration>,
    /// Identifiers used as a package qualifier anywhere outside the import
    /// section: `fmt` in `fmt.Println(..)` or in `var _ fmt.Stringer`.
    pub qualifier_uses: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct PackageClause {
    pub name: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct ImportRegion {
    pub span: Range<usize>,
    /// Comments after the last spec of a parenthesized import list.
    pub dangling: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Source,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Explicit package name: an alias, `.` or `_`.
    pub name: Option<String>,
    /// Path literal as written, quotes included.
    pub path: String,
    /// Own-line comments directly above the spec.
    pub doc: Vec<String>,
    /// Comment on the same line, after the spec.
    pub comment: Option<String>,
    pub origin: Origin,
}

impl ImportSpec {
    /// A new unaliased import of `path`, not backed by source text.
    pub fn synthetic(path: &str) -> Self {
        ImportSpec {
            name: None,
            path: format!("\"{path}\""),
            doc: Vec::new(),
            comment: None,
            origin: Origin::Synthetic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Function,
    Method,
}

/// 1-based line and byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
    /// Receiver base type for methods, without pointer or type arguments.
    pub receiver: Option<String>,
    /// Parameter list as written, parentheses included.
    pub parameters: String,
    pub position: Position,
    /// Leading whitespace of the line the declaration starts on.
    pub indent: String,
    /// `None` for declarations without a body (assembly-backed functions).
    pub body: Option<Body>,
}

impl Declaration {
    /// `Type.Method` for methods, the bare name for functions.
    pub fn display_name(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{receiver}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Body {
    /// Byte offset of `{`.
    pub open: usize,
    /// Byte offset of `}`.
    pub close: usize,
    /// End of the token before `{` (the parameter list or result type).
    pub lead: usize,
    /// Both braces sit on the same line.
    pub single_line: bool,
    pub statements: Vec<Statement>,
}

impl Body {
    /// Whether any source statement is a `defer` of exactly this call chain.
    pub fn contains_call_chain(&self, chain: &[String]) -> bool {
        self.statements.iter().any(|stmt| match stmt {
            Statement::Source(src) => src.call_chain.as_deref() == Some(chain),
            Statement::Synthetic(_) => false,
        })
    }
}

#[derive(Debug)]
pub enum Statement {
    Source(SourceStmt),
    Synthetic(Stmt),
}

#[derive(Debug, Clone)]
pub struct SourceStmt {
    pub span: Range<usize>,
    /// For `defer a.B(x).C().D()` this is `["a", "B", "C", "D"]`. Only set for
    /// deferred calls whose callee is a plain identifier/selector/call chain.
    pub call_chain: Option<Vec<String>>,
}

/// Parse `source` into a [`CompilationUnit`].
///
/// Any syntax error anywhere in the file fails the parse; so do top-level
/// statements, a missing package clause and imports after other declarations,
/// all of which the Go toolchain rejects too.
pub fn parse(path: &Path, source: &[u8]) -> Result<CompilationUnit, Error> {
    let parse_error = |reason: String| Error::Parse {
        path: path.to_path_buf(),
        reason,
    };
    let text = std::str::from_utf8(source)
        .map_err(|e| parse_error(format!("source is not valid UTF-8: {e}")))?;
    // gofmt output uses `\n` only. Go drops carriage returns from raw strings,
    // so normalizing here does not change any literal.
    let normalized = text.replace("\r\n", "\n");
    let text = normalized.as_str();
    let tree = parse_tree(text).map_err(parse_error)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(parse_error(describe_error(root, text)));
    }

    let builder = UnitBuilder { src: text };
    let parts = builder.build(root).map_err(parse_error)?;
    Ok(CompilationUnit {
        path: path.to_path_buf(),
        source: text.to_owned(),
        package: parts.package,
        imports: parts.imports,
        import_region: parts.import_region,
        decls: parts.decls,
        qualifier_uses: collect_qualifier_uses(root, text),
    })
}

fn parse_tree(text: &str) -> Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| format!("failed to load the Go grammar: {e}"))?;
    parser
        .parse(text, None)
        .ok_or_else(|| "parser returned no tree".to_string())
}

fn describe_error(root: Node, src: &str) -> String {
    let Some(node) = first_error(root) else {
        return "syntax error".to_string();
    };
    let pos = node.start_position();
    if node.is_missing() {
        return format!("{}:{}: missing {}", pos.row + 1, pos.column + 1, node.kind());
    }
    let snippet: String = src[node.byte_range()]
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(32)
        .collect();
    format!("{}:{}: unexpected {snippet:?}", pos.row + 1, pos.column + 1)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).find_map(first_error)
}

struct UnitParts {
    package: PackageClause,
    imports: Vec<ImportSpec>,
    import_region: Option<ImportRegion>,
    decls: Vec<Declaration>,
}

struct UnitBuilder<'s> {
    src: &'s str,
}

impl<'s> UnitBuilder<'s> {
    fn text(&self, node: Node) -> &'s str {
        &self.src[node.byte_range()]
    }

    fn build(&self, root: Node) -> Result<UnitParts, String> {
        let mut package: Option<PackageClause> = None;
        let mut imports: Vec<ImportSpec> = Vec::new();
        let mut region: Option<ImportRegion> = None;
        let mut decls: Vec<Declaration> = Vec::new();
        let mut seen_decl = false;
        // Comments seen since the last import declaration. They become docs
        // of the next import spec if another import declaration follows.
        let mut pending: Vec<Node> = Vec::new();
        // End row of the previous import declaration while no other node has
        // been seen since; a comment on that row trails its last spec.
        let mut import_row: Option<usize> = None;

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let row = child.start_position().row;
            match child.kind() {
                "comment" => {
                    if let (Some(end_row), Some(region)) = (import_row, region.as_mut())
                        && end_row == row
                        && let Some(last) = imports.last_mut()
                        && last.comment.is_none()
                    {
                        last.comment = Some(self.text(child).to_owned());
                        region.span.end = child.end_byte();
                    } else {
                        pending.push(child);
                    }
                    import_row = None;
                    continue;
                }
                "package_clause" => {
                    if package.is_some() {
                        return Err(format!("{}: duplicate package clause", row + 1));
                    }
                    package = Some(self.package_clause(child)?);
                }
                "import_declaration" => {
                    if package.is_none() {
                        return Err(format!("{}: expected 'package', found 'import'", row + 1));
                    }
                    if seen_decl {
                        return Err(format!(
                            "{}: imports must appear before other declarations",
                            row + 1
                        ));
                    }
                    let docs: Vec<String> = if region.is_some() {
                        pending.drain(..).map(|c| self.text(c).to_owned()).collect()
                    } else {
                        // Comments above the first import stay with the header.
                        pending.clear();
                        Vec::new()
                    };
                    let region = region.get_or_insert_with(|| ImportRegion {
                        span: child.start_byte()..child.end_byte(),
                        dangling: Vec::new(),
                    });
                    region.span.end = child.end_byte();
                    self.import_declaration(child, docs, &mut imports, &mut region.dangling);
                    import_row = Some(child.end_position().row);
                    continue;
                }
                "function_declaration" | "method_declaration" => {
                    if package.is_none() {
                        return Err(format!("{}: expected 'package', found 'func'", row + 1));
                    }
                    seen_decl = true;
                    decls.push(self.declaration(child));
                }
                "const_declaration" | "var_declaration" | "type_declaration" => {
                    if package.is_none() {
                        return Err(format!("{}: expected 'package' clause", row + 1));
                    }
                    seen_decl = true;
                }
                _ => {
                    return Err(format!(
                        "{}: non-declaration statement outside function body",
                        row + 1
                    ));
                }
            }
            pending.clear();
            import_row = None;
        }

        let package = package.ok_or_else(|| "expected 'package' clause".to_string())?;
        Ok(UnitParts {
            package,
            imports,
            import_region: region,
            decls,
        })
    }

    fn package_clause(&self, node: Node) -> Result<PackageClause, String> {
        let mut cursor = node.walk();
        let name = node
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_identifier")
            .map(|n| self.text(n).to_owned())
            .ok_or_else(|| "package clause has no name".to_string())?;
        Ok(PackageClause {
            name,
            span: node.byte_range(),
        })
    }

    fn import_declaration(
        &self,
        node: Node,
        mut docs: Vec<String>,
        imports: &mut Vec<ImportSpec>,
        dangling: &mut Vec<String>,
    ) {
        let mut spec_row: Option<usize> = None;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => {
                    imports.push(self.import_spec(child, std::mem::take(&mut docs)));
                    spec_row = Some(child.end_position().row);
                }
                "comment" => {
                    let text = self.text(child).to_owned();
                    match imports.last_mut() {
                        Some(last)
                            if spec_row == Some(child.start_position().row)
                                && last.comment.is_none() =>
                        {
                            last.comment = Some(text);
                        }
                        _ => docs.push(text),
                    }
                }
                "import_spec_list" => {
                    let mut last_row: Option<usize> = None;
                    let mut list_cursor = child.walk();
                    for item in child.named_children(&mut list_cursor) {
                        match item.kind() {
                            "import_spec" => {
                                imports.push(self.import_spec(item, std::mem::take(&mut docs)));
                                last_row = Some(item.end_position().row);
                            }
                            "comment" => {
                                let text = self.text(item).to_owned();
                                match imports.last_mut() {
                                    Some(last)
                                        if last_row == Some(item.start_position().row)
                                            && last.comment.is_none() =>
                                    {
                                        last.comment = Some(text);
                                    }
                                    _ => docs.push(text),
                                }
                                last_row = None;
                            }
                            _ => {}
                        }
                    }
                    dangling.append(&mut docs);
                }
                _ => {}
            }
        }
        dangling.append(&mut docs);
    }

    fn import_spec(&self, node: Node, mut doc: Vec<String>) -> ImportSpec {
        let path = node.child_by_field_name("path");
        let path_row = path.map(|p| p.end_position().row);
        let mut comment = None;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "comment" {
                continue;
            }
            let text = self.text(child).to_owned();
            if comment.is_none() && Some(child.start_position().row) == path_row {
                comment = Some(text);
            } else {
                doc.push(text);
            }
        }
        ImportSpec {
            name: node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_owned()),
            path: path.map(|n| self.text(n).to_owned()).unwrap_or_default(),
            doc,
            comment,
            origin: Origin::Source,
        }
    }

    fn declaration(&self, node: Node) -> Declaration {
        let kind = if node.kind() == "method_declaration" {
            DeclKind::Method
        } else {
            DeclKind::Function
        };
        let receiver = match kind {
            DeclKind::Method => node
                .child_by_field_name("receiver")
                .and_then(|r| self.receiver_type(r)),
            DeclKind::Function => None,
        };
        let start = node.start_position();
        Declaration {
            kind,
            name: node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_owned())
                .unwrap_or_default(),
            receiver,
            parameters: node
                .child_by_field_name("parameters")
                .map(|n| self.text(n).to_owned())
                .unwrap_or_default(),
            position: Position {
                line: start.row + 1,
                column: start.column + 1,
            },
            indent: self.indent_at(node.start_byte()),
            body: node.child_by_field_name("body").map(|b| self.body(b)),
        }
    }

    fn receiver_type(&self, receiver: Node) -> Option<String> {
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|n| n.kind() == "parameter_declaration")?;
        let ty = self.text(param.child_by_field_name("type")?);
        let base = ty.trim_start_matches('*').trim();
        let base = base.split('[').next().unwrap_or(base);
        Some(base.to_owned())
    }

    fn body(&self, block: Node) -> Body {
        let open = block.start_byte();
        let close = block.end_byte().saturating_sub(1);
        let lead = block.prev_sibling().map_or(open, |n| n.end_byte());
        let statements = block_statements(block)
            .into_iter()
            .map(|stmt| {
                Statement::Source(SourceStmt {
                    span: stmt.byte_range(),
                    call_chain: deferred_call_chain(stmt, self.src),
                })
            })
            .collect();
        Body {
            open,
            close,
            lead,
            single_line: block.start_position().row == block.end_position().row,
            statements,
        }
    }

    fn indent_at(&self, offset: usize) -> String {
        let line_start = self.src[..offset].rfind('\n').map_or(0, |i| i + 1);
        self.src[line_start..offset]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect()
    }
}

/// Statements (and comments) of a block, in source order.
fn block_statements(block: Node) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = block.walk();
    for child in block.named_children(&mut cursor) {
        if child.kind() == "statement_list" {
            let mut inner = child.walk();
            out.extend(child.named_children(&mut inner));
        } else {
            out.push(child);
        }
    }
    out
}

fn deferred_call_chain(stmt: Node, src: &str) -> Option<Vec<String>> {
    if stmt.kind() != "defer_statement" {
        return None;
    }
    let mut cursor = stmt.walk();
    let call = stmt
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if call.kind() != "call_expression" {
        return None;
    }
    call_chain(call, src)
}

fn call_chain(node: Node, src: &str) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" => Some(vec![src[node.byte_range()].to_owned()]),
        "selector_expression" => {
            let mut chain = call_chain(node.child_by_field_name("operand")?, src)?;
            chain.push(src[node.child_by_field_name("field")?.byte_range()].to_owned());
            Some(chain)
        }
        "call_expression" => call_chain(node.child_by_field_name("function")?, src),
        _ => None,
    }
}

fn collect_qualifier_uses(root: Node, src: &str) -> BTreeSet<String> {
    let mut uses = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "package_clause" | "import_declaration" | "comment" => continue,
            "selector_expression" => {
                if let Some(operand) = node.child_by_field_name("operand")
                    && operand.kind() == "identifier"
                {
                    uses.insert(src[operand.byte_range()].to_owned());
                }
            }
            "qualified_type" => {
                if let Some(package) = node.child_by_field_name("package") {
                    uses.insert(src[package.byte_range()].to_owned());
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    uses
}

const KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Whether `s` is a valid Go identifier (and not a keyword).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || first.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
        && !KEYWORDS.contains(&s)
}
