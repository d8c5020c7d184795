//! Generates the Kotlin and Swift bindings for `securestore_core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
