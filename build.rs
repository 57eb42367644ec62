// Build script for the kiosk core
//
// Dart bindings are generated out of band with
//   flutter_rust_bridge_codegen generate
// from the functions in src/api.rs.

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");
}
