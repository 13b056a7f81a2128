use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ignore::WalkBuilder;
use regex::bytes::Regex;

use crate::error::Error;

static GENERATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^// Code generated .* DO NOT EDIT\.$")
        .expect("generated-file marker is a valid regex")
});

/// Collect the Go sources under `root`, sorted by path.
///
/// Directories whose base name is in `ignore_dirs` are not descended into.
/// `.gitignore` and hidden-file rules do not apply: every directory is
/// visited unless it is on the list.
pub fn go_files(root: &Path, ignore_dirs: &[String]) -> Result<Vec<PathBuf>, Error> {
    let ignore_dirs = ignore_dirs.to_vec();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0 || !is_dir || !ignore_dirs.iter().any(|dir| *dir == name)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_some_and(|ft| ft.is_file()) && is_go_source(entry.path()) {
            files.push(entry.into_path());
        }
    }
    log::debug!("found {} Go file(s) under {}", files.len(), root.display());
    Ok(files)
}

/// `*.go`, excluding `*_test.go`.
pub fn is_go_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go") && !name.ends_with("_test.go")
}

/// Whether the file carries the standard `// Code generated ... DO NOT EDIT.`
/// marker line.
pub fn is_generated(source: &[u8]) -> bool {
    GENERATED.is_match(source)
}

/// Where `file` (found under `root`) lands when output goes to `dist`.
pub fn mirrored_path(root: &Path, dist: &Path, file: &Path) -> Result<PathBuf, Error> {
    let relative = file.strip_prefix(root).map_err(|_| {
        std::io::Error::other(format!(
            "{} is not under {}",
            file.display(),
            root.display()
        ))
    })?;
    Ok(dist.join(relative))
}

/// Write `bytes` to `path`, creating missing parent directories.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let write_error = |source| Error::WriteError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    std::fs::write(path, bytes).map_err(write_error)
}
