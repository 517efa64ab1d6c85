// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Build Script for ironworks-core
//!
//! Compiles the agent/server wire contract in `../../proto/ironworks/v1/workflow.proto`
//! into tonic client and server stubs. Generated code is placed in `OUT_DIR` and
//! included via `tonic::include_proto!` in `src/infrastructure/proto.rs`.
//!
//! `protoc` is vendored through `protoc-bin-vendored` so builds do not depend on a
//! system installation.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());

    let proto = "../../proto/ironworks/v1/workflow.proto";

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&[proto], &["../../proto"])?;

    println!("cargo:rerun-if-changed={}", proto);

    Ok(())
}
