//! GLES enumerants and pixel-transfer size arithmetic
//!
//! Only the handful of tokens the capture and replay paths branch on live here;
//! everything else travels through the codec as an opaque `u32`.

pub const NONE: u32 = 0;

// Buffer binding targets
pub const ARRAY_BUFFER: u32 = 0x8892;
pub const ELEMENT_ARRAY_BUFFER: u32 = 0x8893;
pub const PIXEL_PACK_BUFFER: u32 = 0x88EB;
pub const PIXEL_UNPACK_BUFFER: u32 = 0x88EC;
pub const UNIFORM_BUFFER: u32 = 0x8A11;
pub const TEXTURE_BUFFER: u32 = 0x8C2A;
pub const TRANSFORM_FEEDBACK_BUFFER: u32 = 0x8C8E;
pub const COPY_READ_BUFFER: u32 = 0x8F36;
pub const COPY_WRITE_BUFFER: u32 = 0x8F37;
pub const DRAW_INDIRECT_BUFFER: u32 = 0x8F3F;
pub const DISPATCH_INDIRECT_BUFFER: u32 = 0x90EE;
pub const SHADER_STORAGE_BUFFER: u32 = 0x90D2;
pub const ATOMIC_COUNTER_BUFFER: u32 = 0x92C0;

// Map access bits and the OES access token
pub const MAP_READ_BIT: u32 = 0x0001;
pub const MAP_WRITE_BIT: u32 = 0x0002;
pub const MAP_INVALIDATE_RANGE_BIT: u32 = 0x0004;
pub const MAP_INVALIDATE_BUFFER_BIT: u32 = 0x0008;
pub const MAP_FLUSH_EXPLICIT_BIT: u32 = 0x0010;
pub const MAP_PERSISTENT_BIT: u32 = 0x0040;
pub const WRITE_ONLY_OES: u32 = 0x88B9;

// Framebuffer targets
pub const FRAMEBUFFER: u32 = 0x8D40;
pub const READ_FRAMEBUFFER: u32 = 0x8CA8;
pub const DRAW_FRAMEBUFFER: u32 = 0x8CA9;

// Compressed formats
pub const ETC1_RGB8_OES: u32 = 0x8D64;
pub const COMPRESSED_RGB8_ETC2: u32 = 0x9274;

// Program queries
pub const LINK_STATUS: u32 = 0x8B82;

// Pixel formats
pub const DEPTH_COMPONENT: u32 = 0x1902;
pub const RED: u32 = 0x1903;
pub const ALPHA: u32 = 0x1906;
pub const RGB: u32 = 0x1907;
pub const RGBA: u32 = 0x1908;
pub const LUMINANCE: u32 = 0x1909;
pub const LUMINANCE_ALPHA: u32 = 0x190A;
pub const STENCIL_INDEX: u32 = 0x1901;
pub const RG: u32 = 0x8227;
pub const RG_INTEGER: u32 = 0x8228;
pub const RED_INTEGER: u32 = 0x8D94;
pub const RGB_INTEGER: u32 = 0x8D98;
pub const RGBA_INTEGER: u32 = 0x8D99;
pub const DEPTH_STENCIL: u32 = 0x84F9;
pub const BGRA_EXT: u32 = 0x80E1;

// Pixel types
pub const BYTE: u32 = 0x1400;
pub const UNSIGNED_BYTE: u32 = 0x1401;
pub const SHORT: u32 = 0x1402;
pub const UNSIGNED_SHORT: u32 = 0x1403;
pub const INT: u32 = 0x1404;
pub const UNSIGNED_INT: u32 = 0x1405;
pub const FLOAT: u32 = 0x1406;
pub const HALF_FLOAT: u32 = 0x140B;
pub const HALF_FLOAT_OES: u32 = 0x8D61;
pub const UNSIGNED_SHORT_4_4_4_4: u32 = 0x8033;
pub const UNSIGNED_SHORT_5_5_5_1: u32 = 0x8034;
pub const UNSIGNED_SHORT_5_6_5: u32 = 0x8363;
pub const UNSIGNED_INT_2_10_10_10_REV: u32 = 0x8368;
pub const UNSIGNED_INT_24_8: u32 = 0x84FA;
pub const UNSIGNED_INT_10F_11F_11F_REV: u32 = 0x8C3B;
pub const UNSIGNED_INT_5_9_9_9_REV: u32 = 0x8C3E;
pub const FLOAT_32_UNSIGNED_INT_24_8_REV: u32 = 0x8DAD;

/// Default `GL_UNPACK_ALIGNMENT`
pub const DEFAULT_UNPACK_ALIGNMENT: u32 = 4;

/// Human-readable name of a buffer binding target
pub fn buffer_target_name(target: u32) -> &'static str {
    match target {
        ARRAY_BUFFER => "GL_ARRAY_BUFFER",
        ELEMENT_ARRAY_BUFFER => "GL_ELEMENT_ARRAY_BUFFER",
        PIXEL_PACK_BUFFER => "GL_PIXEL_PACK_BUFFER",
        PIXEL_UNPACK_BUFFER => "GL_PIXEL_UNPACK_BUFFER",
        UNIFORM_BUFFER => "GL_UNIFORM_BUFFER",
        TEXTURE_BUFFER => "GL_TEXTURE_BUFFER",
        TRANSFORM_FEEDBACK_BUFFER => "GL_TRANSFORM_FEEDBACK_BUFFER",
        COPY_READ_BUFFER => "GL_COPY_READ_BUFFER",
        COPY_WRITE_BUFFER => "GL_COPY_WRITE_BUFFER",
        DRAW_INDIRECT_BUFFER => "GL_DRAW_INDIRECT_BUFFER",
        DISPATCH_INDIRECT_BUFFER => "GL_DISPATCH_INDIRECT_BUFFER",
        SHADER_STORAGE_BUFFER => "GL_SHADER_STORAGE_BUFFER",
        ATOMIC_COUNTER_BUFFER => "GL_ATOMIC_COUNTER_BUFFER",
        _ => "unknown buffer target",
    }
}

/// Parse a buffer binding target from its enumerant name
pub fn buffer_target_from_name(name: &str) -> Option<u32> {
    Some(match name {
        "GL_ARRAY_BUFFER" => ARRAY_BUFFER,
        "GL_ELEMENT_ARRAY_BUFFER" => ELEMENT_ARRAY_BUFFER,
        "GL_PIXEL_PACK_BUFFER" => PIXEL_PACK_BUFFER,
        "GL_PIXEL_UNPACK_BUFFER" => PIXEL_UNPACK_BUFFER,
        "GL_UNIFORM_BUFFER" => UNIFORM_BUFFER,
        "GL_TEXTURE_BUFFER" => TEXTURE_BUFFER,
        "GL_TRANSFORM_FEEDBACK_BUFFER" => TRANSFORM_FEEDBACK_BUFFER,
        "GL_COPY_READ_BUFFER" => COPY_READ_BUFFER,
        "GL_COPY_WRITE_BUFFER" => COPY_WRITE_BUFFER,
        "GL_DRAW_INDIRECT_BUFFER" => DRAW_INDIRECT_BUFFER,
        "GL_DISPATCH_INDIRECT_BUFFER" => DISPATCH_INDIRECT_BUFFER,
        "GL_SHADER_STORAGE_BUFFER" => SHADER_STORAGE_BUFFER,
        "GL_ATOMIC_COUNTER_BUFFER" => ATOMIC_COUNTER_BUFFER,
        _ => return None,
    })
}

/// Whether a map access mask lets the application write to the mapping
pub fn access_is_writable(access: u32) -> bool {
    access == WRITE_ONLY_OES || access & MAP_WRITE_BIT != 0
}

fn format_channels(format: u32) -> u32 {
    match format {
        ALPHA | LUMINANCE | DEPTH_COMPONENT | RED | RED_INTEGER | STENCIL_INDEX => 1,
        LUMINANCE_ALPHA | DEPTH_STENCIL | RG | RG_INTEGER => 2,
        RGB | RGB_INTEGER => 3,
        RGBA | RGBA_INTEGER | BGRA_EXT => 4,
        _ => 0,
    }
}

/// Bits per element and bits per pixel for a format/type pair
///
/// Unknown combinations yield `(0, 0)`; the caller then captures nothing rather
/// than guessing.
pub fn format_size(format: u32, ty: u32) -> (u32, u32) {
    let channels = format_channels(format);
    match ty {
        BYTE | UNSIGNED_BYTE => (8, 8 * channels),
        SHORT | UNSIGNED_SHORT | HALF_FLOAT | HALF_FLOAT_OES => (16, 16 * channels),
        INT | UNSIGNED_INT | FLOAT => (32, 32 * channels),
        UNSIGNED_SHORT_4_4_4_4 | UNSIGNED_SHORT_5_5_5_1 | UNSIGNED_SHORT_5_6_5 => (16, 16),
        UNSIGNED_INT_2_10_10_10_REV
        | UNSIGNED_INT_24_8
        | UNSIGNED_INT_10F_11F_11F_REV
        | UNSIGNED_INT_5_9_9_9_REV => (32, 32),
        FLOAT_32_UNSIGNED_INT_24_8_REV => (64, 64),
        _ => (0, 0),
    }
}

fn align(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Number of bytes the driver reads for a pixel rectangle
///
/// Rows are padded to `alignment` when the element size is a power of two smaller
/// than the alignment. The last row and image are not padded, so this never asks
/// for bytes past the end of a tightly sized client buffer.
pub fn image_size(
    format: u32,
    ty: u32,
    width: u32,
    height: u32,
    depth: u32,
    alignment: u32,
) -> usize {
    let (bits_per_element, bits_per_pixel) = format_size(format, ty);
    if bits_per_pixel == 0 || width == 0 || height == 0 || depth == 0 {
        return 0;
    }
    let (width, height, depth) = (width as u64, height as u64, depth as u64);
    let bits_per_pixel = bits_per_pixel as u64;

    let mut row_stride = (width * bits_per_pixel).div_ceil(8);
    if matches!(bits_per_element, 8 | 16 | 32 | 64) && bits_per_element < alignment * 8 {
        row_stride = align(row_stride, alignment as u64);
    }
    let image_stride = height * row_stride;

    let mut size = (width * bits_per_pixel).div_ceil(8);
    if height > 1 {
        size += (height - 1) * row_stride;
    }
    if depth > 1 {
        size += (depth - 1) * image_stride;
    }
    size as usize
}
