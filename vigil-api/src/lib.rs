//! Vigil RPC API
//!
//! This crate defines the gRPC protocol used by the agent to push metrics to the
//! server. The protobuf definitions are in `proto/vigil.proto` and code-generated
//! via `tonic-build`.

// Include the generated code
pub mod vigil {
    pub mod v1 {
        tonic::include_proto!("vigil.v1");
    }
}
