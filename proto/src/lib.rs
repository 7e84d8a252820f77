//! Generated gRPC bindings for the result service.

pub mod result {
    pub mod v1 {
        tonic::include_proto!("result.v1");
    }
}
