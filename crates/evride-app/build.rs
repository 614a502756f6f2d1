use std::fs;
use std::path::Path;

fn main() {
    let version_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../VERSION");
    println!("cargo:rerun-if-changed={}", version_path.display());

    let version = fs::read_to_string(&version_path)
        .map(|raw| raw.trim().to_string())
        .unwrap_or_default();
    if version.is_empty() {
        panic!("{} must contain a non-empty version", version_path.display());
    }

    println!("cargo:rustc-env=EVRIDE_VERSION={version}");
}
