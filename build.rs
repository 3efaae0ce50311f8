//! Embeds the build version as `CFENJIN_VERSION`.
use std::process::Command;

fn main() {
    // A release pipeline may pin the version; local builds describe the checkout.
    if let Ok(version) = std::env::var("CFENJIN_VERSION") {
        println!("cargo:rustc-env=CFENJIN_VERSION={version}");
    } else if let Ok(output) = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        && output.status.success()
    {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !version.is_empty() {
            println!("cargo:rustc-env=CFENJIN_VERSION={version}");
        }
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=CFENJIN_VERSION");
}
