//! Same-process HAL recognition.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical-path patterns of libraries loaded directly into framework
/// processes: OpenGL / Vulkan / RenderScript drivers, gralloc modules and
/// graphics-mapper HIDL implementations.
const SP_HAL_PATTERNS: &[&str] = &[
    r"^/vendor/.*/libEGL_.*\.so$",
    r"^/vendor/.*/libGLESv1_CM_.*\.so$",
    r"^/vendor/.*/libGLESv2_.*\.so$",
    r"^/vendor/.*/libGLESv3_.*\.so$",
    r"^/vendor/.*/vulkan.*\.so$",
    r"^/vendor/.*/libRSDriver.*\.so$",
    r"^/vendor/.*/libPVRRS\.so$",
    r"^.*/gralloc\..*\.so$",
    r"^.*/android\.hardware\.graphics\.mapper@\d+\.\d+-impl\.so$",
];

static SP_HAL_MATCHER: Lazy<Regex> = Lazy::new(|| {
    let union = SP_HAL_PATTERNS
        .iter()
        .map(|pattern| format!("(?:{pattern})"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&union).unwrap()
});

/// Returns `true` if the canonical path names a same-process HAL.
pub(crate) fn is_sp_hal(path: &str) -> bool {
    SP_HAL_MATCHER.is_match(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_drivers_match() {
        assert!(is_sp_hal("/vendor/lib/egl/libEGL_chipset.so"));
        assert!(is_sp_hal("/vendor/lib64/egl/libGLESv2_chipset.so"));
        assert!(is_sp_hal("/vendor/lib/hw/vulkan.chipset.so"));
        assert!(is_sp_hal("/vendor/lib64/libRSDriver_chipset.so"));
        assert!(is_sp_hal("/vendor/lib/libPVRRS.so"));
    }

    #[test]
    fn test_mapper_impls_match_on_any_partition() {
        assert!(is_sp_hal("/system/lib64/hw/gralloc.default.so"));
        assert!(is_sp_hal(
            "/system/lib/hw/android.hardware.graphics.mapper@2.0-impl.so"
        ));
    }

    #[test]
    fn test_ndk_loaders_do_not_match() {
        assert!(!is_sp_hal("/system/lib64/libEGL.so"));
        assert!(!is_sp_hal("/system/lib64/libGLESv3.so"));
        assert!(!is_sp_hal("/system/lib64/libvulkan.so"));
        assert!(!is_sp_hal("/vendor/lib/libfoo.so"));
    }
}
