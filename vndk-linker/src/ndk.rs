//! The known NDK library name sets.

use crate::graph::basename;

/// Low-level NDK libraries every process may link against.
pub const NDK_LOW_LEVEL: &[&str] = &[
    "libc.so",
    "libstdc++.so",
    "libdl.so",
    "liblog.so",
    "libm.so",
    "libz.so",
];

/// High-level NDK libraries with framework-side implementations.
pub const NDK_HIGH_LEVEL: &[&str] = &[
    "libandroid.so",
    "libcamera2ndk.so",
    "libEGL.so",
    "libGLESv1_CM.so",
    "libGLESv2.so",
    "libGLESv3.so",
    "libjnigraphics.so",
    "libmediandk.so",
    "libOpenMAXAL.so",
    "libOpenSLES.so",
    "libvulkan.so",
];

/// Returns `true` if the path's base name is any known NDK library.
pub fn is_ndk_lib(path: &str) -> bool {
    let name = basename(path);
    NDK_LOW_LEVEL.contains(&name) || NDK_HIGH_LEVEL.contains(&name)
}

/// Returns `true` if the path's base name is a high-level NDK library.
pub fn is_high_level_ndk_lib(path: &str) -> bool {
    NDK_HIGH_LEVEL.contains(&basename(path))
}
