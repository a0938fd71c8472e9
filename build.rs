//! Build script for covenant
//!
//! Stamps the git commit and build time into the binary for `/version`.

use std::process::Command;

/// Trimmed stdout of a successful git invocation
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn main() {
    let short = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let full = git(&["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let built = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

    println!("cargo:rustc-env=GIT_COMMIT_SHORT={}", short);
    println!("cargo:rustc-env=GIT_COMMIT_FULL={}", full);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", built);

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
