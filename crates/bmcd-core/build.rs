/// Generates the gRPC client and server bindings for the `bmcd.v1.Machine`
/// service using `tonic-build`'s manual service builder.
///
/// The message types are hand-written prost structs living in
/// `src/common/types.rs`, so no `.proto` file and no `protoc` binary are
/// involved in the build. Only the service plumbing (routing, codec wiring,
/// client stubs) is generated.
///
/// # Output
///
/// The generated module is written to `$OUT_DIR/bmcd.v1.Machine.rs` and
/// included by `src/lib.rs`:
///
/// ```rust,ignore
/// pub mod proto {
///     include!(concat!(env!("OUT_DIR"), "/bmcd.v1.Machine.rs"));
/// }
/// ```
///
/// # Panics
///
/// `tonic-build` panics if the bindings cannot be written to `OUT_DIR`.
fn main() {
    let codec = "tonic_prost::ProstCodec";

    let machine = tonic_build::manual::Service::builder()
        .name("Machine")
        .package("bmcd.v1")
        .method(
            tonic_build::manual::Method::builder()
                .name("power")
                .route_name("Power")
                .input_type("crate::types::PowerRequest")
                .output_type("crate::types::PowerResponse")
                .codec_path(codec)
                .build(),
        )
        .method(
            tonic_build::manual::Method::builder()
                .name("boot_device")
                .route_name("BootDevice")
                .input_type("crate::types::DeviceRequest")
                .output_type("crate::types::DeviceResponse")
                .codec_path(codec)
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[machine]);
}
