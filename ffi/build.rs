use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("cargo sets OUT_DIR"));

    let result = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("MP_ADAPTER_H")
        .with_cpp_compat(true)
        .generate();

    match result {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("mp_adapter.h"));
        }
        Err(err) => println!("cargo:warning=C header not generated: {err}"),
    }
}
