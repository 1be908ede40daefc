fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Prefer a system protoc when one is configured, otherwise use the vendored binary.
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: build scripts run single-threaded.
        unsafe { std::env::set_var("PROTOC", protoc) };
    }

    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);
    tonic_build::configure()
        .file_descriptor_set_path(out_dir.join("retina_oct_descriptor.bin"))
        .compile_protos(&["proto/retina_oct.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/retina_oct.proto");
    Ok(())
}
