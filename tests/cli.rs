//! Drive the nrseg binary over small Go trees.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const CONTEXT: &str = r#"defer newrelic.FromContext(ctx).StartSegment("slow").End()"#;
const REQUEST: &str = r#"defer newrelic.FromContext(req.Context()).StartSegment("slow").End()"#;
const AGENT: &str = "\"github.com/newrelic/go-agent/v3/newrelic\"";

const HANDLER: &str = r#"package app

import "net/http"

func Handle(w http.ResponseWriter, req *http.Request) {
	w.WriteHeader(http.StatusOK)
}
"#;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

fn nrseg(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_nrseg"))
        .args(args)
        .arg(dir)
        .output()
        .expect("failed to run nrseg")
}

fn describe(output: &Output) -> String {
    format!(
        "status: {}\nstdout: {}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn rewrites_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "handler.go", HANDLER);

    let output = nrseg(&[], root);
    assert!(output.status.success(), "{}", describe(&output));

    let got = read(root, "handler.go");
    assert_eq!(
        got,
        format!(
            r#"package app

import (
	"net/http"

	{AGENT}
)

func Handle(w http.ResponseWriter, req *http.Request) {{
	{CONTEXT}
	{REQUEST}
	w.WriteHeader(http.StatusOK)
}}
"#
        )
    );
}

#[test]
fn skips_tests_testdata_and_ignored_dirs() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "handler.go", HANDLER);
    write(root, "handler_test.go", HANDLER);
    write(root, "testdata/fixture.go", HANDLER);
    write(root, "vendor/dep/dep.go", HANDLER);
    write(root, "mocks/mock.go", HANDLER);

    let output = nrseg(&["--ignore", "vendor,mocks"], root);
    assert!(output.status.success(), "{}", describe(&output));

    assert!(read(root, "handler.go").contains(CONTEXT));
    for untouched in [
        "handler_test.go",
        "testdata/fixture.go",
        "vendor/dep/dep.go",
        "mocks/mock.go",
    ] {
        assert_eq!(read(root, untouched), HANDLER, "{untouched} must not change");
    }
}

#[test]
fn dist_mirrors_changed_files_only() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    let dist = tmp.path().join("dist");
    write(&src, "pkg/handler.go", HANDLER);
    write(&src, "types.go", "package app\n\ntype ID int\n");

    let output = nrseg(&["--dist", dist.to_str().unwrap()], &src);
    assert!(output.status.success(), "{}", describe(&output));

    assert_eq!(read(&src, "pkg/handler.go"), HANDLER, "input left alone");
    assert!(read(&dist, "pkg/handler.go").contains(CONTEXT));
    assert!(!dist.join("types.go").exists(), "unchanged file not written");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("update file \"") && stdout.contains("handler.go"),
        "stdout: {stdout}"
    );
}

#[test]
fn dist_equal_to_input_rewrites_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "handler.go", HANDLER);

    let output = nrseg(&["--dist", root.to_str().unwrap()], root);
    assert!(output.status.success(), "{}", describe(&output));
    assert!(read(root, "handler.go").contains(CONTEXT));
    assert!(output.stdout.is_empty(), "{}", describe(&output));
}

#[test]
fn second_run_duplicates_unless_skip_instrumented() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "handler.go", HANDLER);

    assert!(nrseg(&[], root).status.success());
    let once = read(root, "handler.go");

    assert!(nrseg(&["--skip-instrumented"], root).status.success());
    assert_eq!(read(root, "handler.go"), once, "guard keeps the file stable");

    assert!(nrseg(&[], root).status.success());
    assert_eq!(read(root, "handler.go").matches(CONTEXT).count(), 2);
}

#[test]
fn skip_generated_leaves_marked_files() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let generated = format!("// Code generated by stringer. DO NOT EDIT.\n\n{HANDLER}");
    write(root, "gen.go", &generated);

    assert!(nrseg(&["--skip-generated"], root).status.success());
    assert_eq!(read(root, "gen.go"), generated);

    assert!(nrseg(&[], root).status.success());
    assert!(read(root, "gen.go").contains(CONTEXT), "instrumented without the flag");
}

#[test]
fn parse_error_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "broken.go", "package app\n\nfunc f( {\n");

    let output = nrseg(&[], root);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: failed to parse"), "stderr: {stderr}");
    assert!(stderr.contains("broken.go"), "stderr: {stderr}");
    assert_eq!(read(root, "broken.go"), "package app\n\nfunc f( {\n");
}

#[test]
fn inspect_reports_and_fails_until_instrumented() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "store.go",
        "package app\n\ntype Store struct{}\n\nfunc (s *Store) Get(key string) string {\n\treturn key\n}\n",
    );

    let output = nrseg(&["inspect"], root);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.trim_end().ends_with("store.go:5:1: Store.Get no insert segment"),
        "stdout: {stdout}"
    );
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("1 function(s) have no segment"),
        "{}",
        describe(&output)
    );
    assert!(!read(root, "store.go").contains(CONTEXT), "inspect never writes");

    assert!(nrseg(&[], root).status.success());
    let output = nrseg(&["inspect"], root);
    assert!(output.status.success(), "{}", describe(&output));
    assert!(output.stdout.is_empty(), "{}", describe(&output));
}

#[test]
fn version_flag_prints_revision() {
    for flag in ["-v", "--version"] {
        let output = Command::new(env!("CARGO_BIN_EXE_nrseg"))
            .arg(flag)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", describe(&output));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(
            stdout.starts_with(&format!("nrseg {}, revision ", env!("CARGO_PKG_VERSION"))),
            "stdout: {stdout}"
        );
    }
}
