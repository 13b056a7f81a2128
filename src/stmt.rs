//! Typed construction of the synthetic segment statements.
//!
//! Every statement the instrumenter adds to a function body is built here
//! from a small closed set of expression nodes, rendered with `Display`, and
//! checked by [`Stmt::validate`] before the printer emits it.

use std::fmt;

use crate::imports::Qualifier;
use crate::syntax::is_identifier;

/// Literal name of every injected segment.
pub const SEGMENT_NAME: &str = "slow";
/// Conventional name of a `context.Context` parameter.
pub const CONTEXT_VAR: &str = "ctx";
/// Conventional name of an `*http.Request` parameter.
pub const REQUEST_VAR: &str = "req";

const CONTEXT_ACCESSOR: &str = "Context";
const FROM_CONTEXT: &str = "FromContext";
const START_SEGMENT: &str = "StartSegment";
const END: &str = "End";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    StringLit(String),
    Selector(Box<Expr>, String),
    Call(CallExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `defer <call>`; only calls can be deferred.
    Defer(CallExpr),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::StringLit(value.into())
    }

    /// `self.field`
    pub fn select(self, field: impl Into<String>) -> Self {
        Expr::Selector(Box::new(self), field.into())
    }

    /// `self(args...)`
    pub fn call(self, args: Vec<Expr>) -> CallExpr {
        CallExpr {
            func: Box::new(self),
            args,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Expr::Ident(name) => check_ident(name),
            Expr::StringLit(_) => Ok(()),
            Expr::Selector(operand, field) => {
                operand.validate()?;
                check_ident(field)
            }
            Expr::Call(call) => call.validate(),
        }
    }

    fn chain(&self) -> Option<Vec<String>> {
        match self {
            Expr::Ident(name) => Some(vec![name.clone()]),
            Expr::Selector(operand, field) => {
                let mut chain = operand.chain()?;
                chain.push(field.clone());
                Some(chain)
            }
            Expr::Call(call) => call.func.chain(),
            Expr::StringLit(_) => None,
        }
    }
}

impl CallExpr {
    pub fn select(self, field: impl Into<String>) -> Expr {
        Expr::from(self).select(field)
    }

    fn validate(&self) -> Result<(), String> {
        self.func.validate()?;
        self.args.iter().try_for_each(Expr::validate)
    }
}

impl From<CallExpr> for Expr {
    fn from(call: CallExpr) -> Self {
        Expr::Call(call)
    }
}

impl Stmt {
    /// Check that every identifier and selector field is a valid Go
    /// identifier, so the printed statement parses.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Stmt::Defer(call) => call.validate(),
        }
    }

    /// Root identifier and method names of the deferred call, e.g.
    /// `["newrelic", "FromContext", "StartSegment", "End"]`.
    pub fn call_chain(&self) -> Vec<String> {
        match self {
            Stmt::Defer(call) => call.func.chain().unwrap_or_default(),
        }
    }
}

fn check_ident(name: &str) -> Result<(), String> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(format!("{name:?} is not a valid identifier"))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => f.write_str(name),
            Expr::StringLit(value) => write_go_string(f, value),
            Expr::Selector(operand, field) => write!(f, "{operand}.{field}"),
            Expr::Call(call) => write!(f, "{call}"),
        }
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Defer(call) => write!(f, "defer {call}"),
        }
    }
}

fn write_go_string(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in value.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

/// `<qualifier>.FromContext(source)`, unqualified for dot imports.
fn from_context(qualifier: &Qualifier, source: Expr) -> CallExpr {
    let func = match qualifier.name() {
        Some(pkg) => Expr::ident(pkg).select(FROM_CONTEXT),
        None => Expr::ident(FROM_CONTEXT),
    };
    func.call(vec![source])
}

/// `defer <txn>.StartSegment("slow").End()`
fn segment(qualifier: &Qualifier, source: Expr) -> Stmt {
    let end = from_context(qualifier, source)
        .select(START_SEGMENT)
        .call(vec![Expr::string(SEGMENT_NAME)])
        .select(END)
        .call(Vec::new());
    Stmt::Defer(end)
}

/// `defer newrelic.FromContext(ctx).StartSegment("slow").End()`
pub fn context_segment(qualifier: &Qualifier) -> Stmt {
    segment(qualifier, Expr::ident(CONTEXT_VAR))
}

/// `defer newrelic.FromContext(req.Context()).StartSegment("slow").End()`
pub fn request_segment(qualifier: &Qualifier) -> Stmt {
    let source = Expr::ident(REQUEST_VAR)
        .select(CONTEXT_ACCESSOR)
        .call(Vec::new());
    segment(qualifier, source.into())
}

/// Both segment statements, context variant first.
pub fn build(qualifier: &Qualifier) -> (Stmt, Stmt) {
    (context_segment(qualifier), request_segment(qualifier))
}
