use std::process::Command;

fn main() {
    // Embed the commit the binary was built from so `nrseg --version` can
    // report it alongside the package version.
    println!("cargo::rerun-if-changed=.git/HEAD");

    let revision = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|rev| rev.trim().to_owned())
        .filter(|rev| !rev.is_empty())
        // Source tarballs and crates.io installs have no git metadata.
        .unwrap_or_else(|| "unknown".to_owned());

    println!("cargo::rustc-env=NRSEG_REVISION={revision}");
}
