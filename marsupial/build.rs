// Build script: compile the dlib shim and link libdlib (feature "dlib" only)
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    #[cfg(feature = "dlib")]
    {
        use std::path::PathBuf;

        println!("cargo:rerun-if-changed=native/marsupial_shim.cc");
        println!("cargo:rerun-if-changed=native/marsupial_shim.h");
        println!("cargo:rerun-if-env-changed=DLIB_DIR");

        // dlib checkout built by `build-dlib` (dlib/ next to the workspace root)
        let dlib_dir = std::env::var("DLIB_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap())
                .join("..")
                .join("dlib")
        });

        cc::Build::new()
            .cpp(true)
            .file("native/marsupial_shim.cc")
            .include("native")
            .include(&dlib_dir)
            .flag_if_supported("-std=c++14")
            .define("DLIB_JPEG_SUPPORT", None)
            .compile("marsupial_shim");

        println!(
            "cargo:rustc-link-search=native={}",
            dlib_dir.join("build").join("dlib").display()
        );
        println!(
            "cargo:rustc-link-search=native={}",
            dlib_dir.join("build").display()
        );
        println!("cargo:rustc-link-lib=dylib=dlib");
        println!("cargo:rustc-link-lib=dylib=jpeg");
    }
}
