use std::process::Command;

/// Short commit hash of the checkout, if this is a git work tree.
fn git_short_hash() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let hash = String::from_utf8(out.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|h| !h.is_empty())
}

fn main() {
    let hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=IOTCLIENT_GIT_HASH={hash}");
    println!("cargo:rustc-env=IOTCLIENT_BUILD_PROFILE={profile}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
