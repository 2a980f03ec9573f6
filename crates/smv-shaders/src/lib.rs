//! Shaders for the Simple Vulkan Engine programs.
//!
//! The GLSL sources live in `shaders/` and are compiled to SPIR-V at build
//! time using shaderc.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static DOUBLE_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/double_comp.spv"));
    pub static FILTER_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/filter_comp.spv"));
    pub static TRIANGLE_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/triangle_vert.spv"));
    pub static TRIANGLE_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/triangle_frag.spv"));
    pub static COLORED_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/colored_vert.spv"));
    pub static COLORED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/colored_frag.spv"));
    pub static TEXTURED_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured_vert.spv"));
    pub static TEXTURED_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured_frag.spv"));
}

/// SPIR-V magic number, the first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Convert a byte slice to aligned words (SPIR-V requires 4-byte alignment).
///
/// Trailing bytes that do not fill a word are dropped; the build script only
/// ever writes whole words.
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

macro_rules! shader_getter {
    ($(#[$doc:meta])* $name:ident, $cell:ident, $bytes:ident) => {
        static $cell: OnceLock<Vec<u32>> = OnceLock::new();

        $(#[$doc])*
        pub fn $name() -> &'static [u32] {
            $cell.get_or_init(|| bytes_to_spirv(spirv_bytes::$bytes))
        }
    };
}

shader_getter!(
    /// Compute shader doubling every element of a storage buffer.
    double_comp, DOUBLE_COMP_SPIRV, DOUBLE_COMP
);
shader_getter!(
    /// Compute shader applying a colour filter to a storage image in place.
    filter_comp, FILTER_COMP_SPIRV, FILTER_COMP
);
shader_getter!(triangle_vert, TRIANGLE_VERT_SPIRV, TRIANGLE_VERT);
shader_getter!(triangle_frag, TRIANGLE_FRAG_SPIRV, TRIANGLE_FRAG);
shader_getter!(colored_vert, COLORED_VERT_SPIRV, COLORED_VERT);
shader_getter!(colored_frag, COLORED_FRAG_SPIRV, COLORED_FRAG);
shader_getter!(textured_vert, TEXTURED_VERT_SPIRV, TEXTURED_VERT);
shader_getter!(textured_frag, TEXTURED_FRAG_SPIRV, TEXTURED_FRAG);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shader_is_spirv() {
        let shaders: [(&str, &[u32]); 8] = [
            ("double.comp", double_comp()),
            ("filter.comp", filter_comp()),
            ("triangle.vert", triangle_vert()),
            ("triangle.frag", triangle_frag()),
            ("colored.vert", colored_vert()),
            ("colored.frag", colored_frag()),
            ("textured.vert", textured_vert()),
            ("textured.frag", textured_frag()),
        ];

        for (name, code) in shaders {
            assert_eq!(code[0], SPIRV_MAGIC, "{name}: invalid SPIR-V magic number");
            assert!(code.len() > 5, "{name}: shader too small");
        }
    }

    #[test]
    fn getters_are_cached() {
        assert!(std::ptr::eq(double_comp(), double_comp()));
    }
}
