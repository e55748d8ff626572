//! Build script: optionally regenerate the device plugin gRPC stubs.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";
    let api_proto = format!("{proto_root}/deviceplugin/v1beta1/api.proto");

    println!("cargo:rerun-if-changed={api_proto}");

    // Default builds use the checked-in stubs so protoc is not required.
    #[cfg(feature = "regenerate")]
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/proto")
        .compile_protos(&[&api_proto], &[proto_root])?;

    Ok(())
}
