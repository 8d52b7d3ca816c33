//! Regenerates the plugin protocol types from `proto/provider.proto`.
//!
//! `src/generated.rs` is committed, so a normal build needs no `protoc`.
//! After editing the proto, regenerate with
//! `cargo build --features regenerate-proto` and commit the result.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "regenerate-proto")]
    {
        let out_dir = std::path::PathBuf::from("src");
        tonic_prost_build::configure()
            .build_client(true)
            .build_server(true)
            .out_dir(&out_dir)
            .compile_protos(&["proto/provider.proto"], &["proto"])?;

        std::fs::rename(
            out_dir.join("tfepatch.plugin.v1.rs"),
            out_dir.join("generated.rs"),
        )?;
    }

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}
