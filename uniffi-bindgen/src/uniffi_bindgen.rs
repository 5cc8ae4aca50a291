//! Generates Swift and Kotlin bindings for `groupkit-core`.

fn main() {
    uniffi::uniffi_bindgen_main();
}
