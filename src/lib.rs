// Instruction Kiosk Core
// Resource discovery and synchronized instruction playback for the kiosk app

// Module declarations
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod navigation;
pub mod playback;
pub mod resources;
pub mod retry;
pub mod settings;
pub mod timing;

#[cfg(any(test, feature = "test_support"))]
pub mod testing;

// Re-exports for convenience
pub use api::*;

/// Install the global tracing subscriber (logcat on Android).
///
/// Later calls are no-ops.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    let Ok(logcat) = tracing_android::layer("InstructionKiosk") else {
        return;
    };
    let _ = tracing_subscriber::registry().with(logcat).try_init();
}

/// Install the global tracing subscriber (stderr on desktop).
///
/// Later calls are no-ops.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    _vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    init_logging();
    log::info!("JNI_OnLoad called - kiosk core loaded");
    jni::sys::JNI_VERSION_1_6
}
