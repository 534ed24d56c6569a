//! Build script to track include_str! dependencies.
//! This ensures cargo rebuilds when template files change.

fn main() {
    // Workspace template written by `taskmap init`
    println!("cargo:rerun-if-changed=resources/default-config.json");
}
