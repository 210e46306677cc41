//! Build Script for Chain Stream
//!
//! Generates Rust protobuf stubs for the v1 and v2 stream protocols from the
//! workspace proto definitions.
//!
//! # Panics Policy
//!
//! Build scripts use `.expect()` and panic on failure: there is no caller to
//! propagate errors to, and the panic message is what the developer sees.
#![allow(clippy::expect_used)]

use std::{env, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../packages/proto/chainstream/");

    // Emit cfg for coverage detection
    if env::var("CARGO_LLVM_COV").is_ok()
        || env::var("LLVM_PROFILE_FILE").is_ok()
        || env::var("RUSTFLAGS")
            .map(|f| f.contains("instrument-coverage"))
            .unwrap_or(false)
    {
        println!("cargo:rustc-cfg=coverage");
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let proto_root = manifest_dir.join("../../packages/proto");
    let proto_files = [
        proto_root.join("chainstream/v1/stream.proto"),
        proto_root.join("chainstream/v2/stream.proto"),
    ];

    for proto in &proto_files {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    // protox parses the protos in-process, so protoc is not required.
    let fds = protox::compile(&proto_files, [&proto_root])
        .expect("Failed to parse chainstream proto definitions");

    // Messages are also (de)serialized as JSON by the WebSocket bridge.
    tonic_prost_build::configure()
        .build_client(true) // Enable client for integration tests and the CLI
        .build_server(true)
        .type_attribute(
            ".chainstream",
            "#[derive(serde::Serialize, serde::Deserialize)] #[serde(default)]",
        )
        .compile_fds(fds)
        .expect("Failed to compile protobuf definitions");
}
