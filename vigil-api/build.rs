// Code generation for gRPC protobuf definitions

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc unless the environment already points at one
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().map_err(|e| format!("{e:?}"))?);
    }

    println!("cargo:rerun-if-changed=proto/vigil.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/vigil.proto"], &["proto"])?;
    Ok(())
}
