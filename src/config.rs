use std::path::{Component, Path, PathBuf};

use crate::rewrite::Options;

/// Directory skipped on every run, in addition to the `--ignore` list.
pub const TESTDATA: &str = "testdata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Instrument files and write them back (or to the dist directory).
    Rewrite,
    /// Report declarations without a segment; write nothing.
    Inspect,
}

/// Everything one invocation needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub root: PathBuf,
    pub dist: Option<PathBuf>,
    pub ignore_dirs: Vec<String>,
    pub skip_generated: bool,
    pub skip_instrumented: bool,
}

impl RunConfig {
    pub fn new(mode: Mode, root: PathBuf, extra_ignores: Vec<String>) -> Self {
        let mut ignore_dirs = vec![TESTDATA.to_string()];
        for name in extra_ignores {
            let name = name.trim();
            if !name.is_empty() && !ignore_dirs.iter().any(|d| d == name) {
                ignore_dirs.push(name.to_string());
            }
        }
        Self {
            mode,
            root,
            dist: None,
            ignore_dirs,
            skip_generated: false,
            skip_instrumented: false,
        }
    }

    /// Output directory, when it differs from the input directory.
    pub fn mirror_dir(&self) -> Option<&PathBuf> {
        self.dist.as_ref().filter(|dist| !same_dir(dist, &self.root))
    }

    pub fn options(&self) -> Options {
        Options {
            skip_instrumented: self.skip_instrumented,
        }
    }
}

/// Lexical comparison that ignores `.` components and trailing slashes.
fn same_dir(a: &Path, b: &Path) -> bool {
    fn significant(p: &Path) -> impl Iterator<Item = Component<'_>> {
        p.components().filter(|c| *c != Component::CurDir)
    }
    significant(a).eq(significant(b))
}
