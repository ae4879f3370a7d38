//! Stamps the git short SHA and UTC build date into `version.rs`.

use std::process::Command;

fn git_short_sha() -> Option<String> {
    let out = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    let sha = String::from_utf8(out.stdout).ok()?;
    (out.status.success() && !sha.trim().is_empty()).then(|| sha.trim().to_string())
}

fn main() {
    let sha = git_short_sha().unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=DASHLIGHT_GIT_SHA={sha}");
    println!("cargo:rustc-env=DASHLIGHT_BUILD_DATE={}", chrono::Utc::now().date_naive());
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
