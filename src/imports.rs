//! Resolution of the New Relic agent import and general import-path helpers.

use crate::error::Error;
use crate::syntax::{CompilationUnit, ImportSpec, is_identifier};

/// Canonical import path of the New Relic Go agent.
pub const NEWRELIC_PATH: &str = "github.com/newrelic/go-agent/v3/newrelic";
/// Package name the agent declares.
pub const NEWRELIC_NAME: &str = "newrelic";

/// How injected calls refer to the agent package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// Unaliased import: use the package's own name.
    Default,
    /// `nr "github.com/newrelic/go-agent/v3/newrelic"`
    Alias(String),
    /// Dot import: calls are unqualified.
    Dot,
}

impl Qualifier {
    /// Name to put before `.FromContext`, or `None` for dot imports.
    pub fn name(&self) -> Option<&str> {
        match self {
            Qualifier::Default => Some(NEWRELIC_NAME),
            Qualifier::Alias(alias) => Some(alias),
            Qualifier::Dot => None,
        }
    }
}

/// Find the agent import, appending one if the unit has none.
///
/// Never appends when the path is already imported under any name.
pub fn resolve(unit: &mut CompilationUnit) -> Result<Qualifier, Error> {
    if let Some(qualifier) = lookup(unit)? {
        return Ok(qualifier);
    }
    log::debug!("{}: adding import {NEWRELIC_PATH:?}", unit.path.display());
    unit.imports.push(ImportSpec::synthetic(NEWRELIC_PATH));
    Ok(Qualifier::Default)
}

/// Find the agent import without modifying the unit.
///
/// Every import path must unquote to a valid import path; a malformed entry
/// could be the agent import, so it fails resolution. An agent import that
/// is only blank-imported cannot qualify a call and fails too.
pub fn lookup(unit: &CompilationUnit) -> Result<Option<Qualifier>, Error> {
    let mut blank = false;
    let mut found: Option<Qualifier> = None;
    for spec in &unit.imports {
        let path = unquote(&spec.path).map_err(|reason| Error::ImportResolution {
            path: unit.path.clone(),
            reason,
        })?;
        if path != NEWRELIC_PATH || found.is_some() {
            continue;
        }
        match spec.name.as_deref() {
            None => found = Some(Qualifier::Default),
            Some(".") => found = Some(Qualifier::Dot),
            Some("_") => blank = true,
            Some(alias) => found = Some(Qualifier::Alias(alias.to_owned())),
        }
    }
    if found.is_none() && blank {
        return Err(Error::ImportResolution {
            path: unit.path.clone(),
            reason: format!("{NEWRELIC_PATH:?} is only imported for side effects"),
        });
    }
    Ok(found)
}

/// Unquote an import path literal and check it is a valid import path.
pub fn unquote(literal: &str) -> Result<String, String> {
    let path = if let Some(raw) = literal
        .strip_prefix('`')
        .and_then(|rest| rest.strip_suffix('`'))
    {
        raw.to_owned()
    } else if let Some(inner) = literal
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|_| literal.len() >= 2)
    {
        unescape(inner).ok_or_else(|| format!("invalid escape in import path {literal}"))?
    } else {
        return Err(format!("import path {literal} is not a string literal"));
    };
    check_import_path(&path).map_err(|reason| format!("invalid import path {literal}: {reason}"))?;
    Ok(path)
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            '\\' => '\\',
            '"' => '"',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{0b}',
            'x' => hex_char(&mut chars, 2)?,
            'u' => hex_char(&mut chars, 4)?,
            'U' => hex_char(&mut chars, 8)?,
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn hex_char(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return None;
    }
    char::from_u32(u32::from_str_radix(&hex, 16).ok()?)
}

/// Characters the Go toolchain refuses in import paths.
const FORBIDDEN: &str = "!\"#$%&'()*,:;<=>?[\\]^`{|}";

fn check_import_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("empty path");
    }
    if path
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || FORBIDDEN.contains(c) || c == '\u{fffd}')
    {
        return Err("forbidden character");
    }
    Ok(())
}

/// Whether `path` sorts into the first import group. As in goimports this is
/// any path whose first element has no dot, which also covers dotless module
/// paths such as `myapp/internal/models`.
pub fn is_std_group(path: &str) -> bool {
    !path.split('/').next().unwrap_or(path).contains('.')
}

/// Whether `path` is a package of the Go standard library.
pub fn is_stdlib(path: &str) -> bool {
    STDLIB.contains(&path)
}

/// Name `path` binds when imported without an alias, when that is known
/// without loading the package: standard library packages and the agent.
pub fn known_name(path: &str) -> Option<String> {
    if is_stdlib(path) || path == NEWRELIC_PATH {
        default_name(path)
    } else {
        None
    }
}

/// Conventional package name for an import path, following goimports:
/// the last element, skipping a `/vN` major-version element, without a `.vN`
/// suffix or `go-` prefix. `None` when that is not an identifier.
pub fn default_name(path: &str) -> Option<String> {
    let mut elems = path.rsplit('/');
    let mut last = elems.next()?;
    if is_major_version(last) {
        last = elems.next()?;
    }
    if let Some((base, version)) = last.rsplit_once('.')
        && is_major_version(version)
    {
        last = base;
    }
    let last = last.strip_prefix("go-").unwrap_or(last);
    is_identifier(last).then(|| last.to_owned())
}

fn is_major_version(elem: &str) -> bool {
    elem.strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Importable standard library packages.
const STDLIB: &[&str] = &[
    "archive/tar",
    "archive/zip",
    "bufio",
    "bytes",
    "cmp",
    "compress/bzip2",
    "compress/flate",
    "compress/gzip",
    "compress/lzw",
    "compress/zlib",
    "container/heap",
    "container/list",
    "container/ring",
    "context",
    "crypto",
    "crypto/aes",
    "crypto/cipher",
    "crypto/des",
    "crypto/dsa",
    "crypto/ecdh",
    "crypto/ecdsa",
    "crypto/ed25519",
    "crypto/elliptic",
    "crypto/fips140",
    "crypto/hkdf",
    "crypto/hmac",
    "crypto/md5",
    "crypto/mlkem",
    "crypto/pbkdf2",
    "crypto/rand",
    "crypto/rc4",
    "crypto/rsa",
    "crypto/sha1",
    "crypto/sha256",
    "crypto/sha3",
    "crypto/sha512",
    "crypto/subtle",
    "crypto/tls",
    "crypto/x509",
    "crypto/x509/pkix",
    "database/sql",
    "database/sql/driver",
    "debug/buildinfo",
    "debug/dwarf",
    "debug/elf",
    "debug/gosym",
    "debug/macho",
    "debug/pe",
    "debug/plan9obj",
    "embed",
    "encoding",
    "encoding/ascii85",
    "encoding/asn1",
    "encoding/base32",
    "encoding/base64",
    "encoding/binary",
    "encoding/csv",
    "encoding/gob",
    "encoding/hex",
    "encoding/json",
    "encoding/pem",
    "encoding/xml",
    "errors",
    "expvar",
    "flag",
    "fmt",
    "go/ast",
    "go/build",
    "go/build/constraint",
    "go/constant",
    "go/doc",
    "go/doc/comment",
    "go/format",
    "go/importer",
    "go/parser",
    "go/printer",
    "go/scanner",
    "go/token",
    "go/types",
    "go/version",
    "hash",
    "hash/adler32",
    "hash/crc32",
    "hash/crc64",
    "hash/fnv",
    "hash/maphash",
    "html",
    "html/template",
    "image",
    "image/color",
    "image/color/palette",
    "image/draw",
    "image/gif",
    "image/jpeg",
    "image/png",
    "index/suffixarray",
    "io",
    "io/fs",
    "io/ioutil",
    "iter",
    "log",
    "log/slog",
    "log/syslog",
    "maps",
    "math",
    "math/big",
    "math/bits",
    "math/cmplx",
    "math/rand",
    "math/rand/v2",
    "mime",
    "mime/multipart",
    "mime/quotedprintable",
    "net",
    "net/http",
    "net/http/cgi",
    "net/http/cookiejar",
    "net/http/fcgi",
    "net/http/httptest",
    "net/http/httptrace",
    "net/http/httputil",
    "net/http/pprof",
    "net/mail",
    "net/netip",
    "net/rpc",
    "net/rpc/jsonrpc",
    "net/smtp",
    "net/textproto",
    "net/url",
    "os",
    "os/exec",
    "os/signal",
    "os/user",
    "path",
    "path/filepath",
    "plugin",
    "reflect",
    "regexp",
    "regexp/syntax",
    "runtime",
    "runtime/cgo",
    "runtime/coverage",
    "runtime/debug",
    "runtime/metrics",
    "runtime/pprof",
    "runtime/race",
    "runtime/trace",
    "slices",
    "sort",
    "strconv",
    "strings",
    "structs",
    "sync",
    "sync/atomic",
    "syscall",
    "syscall/js",
    "testing",
    "testing/fstest",
    "testing/iotest",
    "testing/quick",
    "testing/slogtest",
    "testing/synctest",
    "text/scanner",
    "text/tabwriter",
    "text/template",
    "text/template/parse",
    "time",
    "time/tzdata",
    "unicode",
    "unicode/utf16",
    "unicode/utf8",
    "unique",
    "unsafe",
    "weak",
];

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::syntax::{Origin, parse};

    fn unit(source: &str) -> CompilationUnit {
        parse(Path::new("test.go"), source.as_bytes()).unwrap()
    }

    #[test]
    fn appends_import_when_missing() {
        let mut u = unit("package p\n\nimport \"fmt\"\n");
        let q = resolve(&mut u).unwrap();
        assert_eq!(q, Qualifier::Default);
        assert_eq!(u.imports.len(), 2);
        assert_eq!(u.imports[1].path, format!("\"{NEWRELIC_PATH}\""));
        assert_eq!(u.imports[1].origin, Origin::Synthetic);
    }

    #[test]
    fn reuses_unaliased_import() {
        let mut u = unit(&format!("package p\n\nimport \"{NEWRELIC_PATH}\"\n"));
        assert_eq!(resolve(&mut u).unwrap(), Qualifier::Default);
        assert_eq!(u.imports.len(), 1, "no duplicate import");
    }

    #[test]
    fn reuses_alias() {
        let mut u = unit(&format!(
            "package p\n\nimport (\n\t\"fmt\"\n\tnr \"{NEWRELIC_PATH}\"\n)\n"
        ));
        assert_eq!(resolve(&mut u).unwrap(), Qualifier::Alias("nr".into()));
        assert_eq!(u.imports.len(), 2);
    }

    #[test]
    fn raw_string_path_matches() {
        let mut u = unit(&format!("package p\n\nimport nr `{NEWRELIC_PATH}`\n"));
        assert_eq!(resolve(&mut u).unwrap(), Qualifier::Alias("nr".into()));
    }

    #[test]
    fn dot_import_resolves_unqualified() {
        let mut u = unit(&format!("package p\n\nimport . \"{NEWRELIC_PATH}\"\n"));
        assert_eq!(resolve(&mut u).unwrap(), Qualifier::Dot);
        assert_eq!(Qualifier::Dot.name(), None);
    }

    #[test]
    fn blank_import_fails() {
        let mut u = unit(&format!("package p\n\nimport _ \"{NEWRELIC_PATH}\"\n"));
        let err = resolve(&mut u).unwrap_err();
        assert!(matches!(err, Error::ImportResolution { .. }), "got {err:?}");
        assert_eq!(u.imports.len(), 1, "nothing appended on failure");
    }

    #[test]
    fn malformed_path_fails() {
        let mut u = unit("package p\n\nimport \"bad path\"\n");
        let err = resolve(&mut u).unwrap_err();
        assert!(matches!(err, Error::ImportResolution { .. }), "got {err:?}");
    }

    #[test]
    fn lookup_does_not_mutate() {
        let u = unit("package p\n");
        assert_eq!(lookup(&u).unwrap(), None);
        assert!(u.imports.is_empty());
    }

    #[test]
    fn unquotes_escapes() {
        assert_eq!(unquote("\"fmt\"").unwrap(), "fmt");
        assert_eq!(unquote("\"\\x66mt\"").unwrap(), "fmt");
        assert!(unquote("\"\\q\"").is_err());
        assert!(unquote("\"\"").is_err());
        assert!(unquote("fmt").is_err());
    }

    #[test]
    fn default_names() {
        assert_eq!(default_name(NEWRELIC_PATH).as_deref(), Some("newrelic"));
        assert_eq!(default_name("fmt").as_deref(), Some("fmt"));
        assert_eq!(default_name("math/rand/v2").as_deref(), Some("rand"));
        assert_eq!(default_name("gopkg.in/yaml.v3").as_deref(), Some("yaml"));
        assert_eq!(default_name("github.com/mattn/go-isatty").as_deref(), Some("isatty"));
        assert_eq!(default_name("github.com/foo/bar-baz"), None);
    }

    #[test]
    fn std_group_paths() {
        assert!(is_std_group("net/http"));
        assert!(is_std_group("myapp/internal/models"));
        assert!(!is_std_group(NEWRELIC_PATH));
    }

    #[test]
    fn names_known_only_for_stdlib_and_agent() {
        assert_eq!(known_name("net/http").as_deref(), Some("http"));
        assert_eq!(known_name("math/rand/v2").as_deref(), Some("rand"));
        assert_eq!(known_name(NEWRELIC_PATH).as_deref(), Some("newrelic"));
        assert_eq!(known_name("myapp/internal/models"), None);
        assert_eq!(known_name("myapp/internal/errors"), None);
        assert_eq!(known_name("github.com/pkg/errors"), None);
        assert!(!is_stdlib("internal/poll"));
    }
}
