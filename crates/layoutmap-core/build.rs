//! Build script for layoutmap-core
//!
//! Checks the toolchain before compilation.
//!
//! ## Requirements
//!
//! - **Rust**: 1.85.0 or newer (the workspace has edition 2024 members)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match (rustc_version::version(), rustc_version::Version::parse("1.85.0")) {
        (Ok(found), Ok(minimum)) if found < minimum => {
            panic!("layoutmap-core requires Rust {minimum} or newer, found {found}");
        }
        (Ok(_), Ok(_)) => {}
        // Some build environments hide the compiler version; carry on.
        _ => println!("cargo:warning=could not verify Rust version"),
    }
}
