//! Build script for soundstreamer-pipewire.
//!
//! Checks that libpipewire is available when the native monitor is enabled.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if std::env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    if let Err(e) = pkg_config::probe_library("libpipewire-0.3") {
        println!("cargo:warning=libpipewire-0.3 not found: {e}");
        println!(
            "cargo:warning=Install pipewire-devel (Fedora) or libpipewire-0.3-dev (Debian/Ubuntu)"
        );
    }
}
