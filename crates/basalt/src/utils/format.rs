use ash::vk;

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatType {
    /// Value will be converted to a float in the range of [0, 1]
    UNorm,
    /// Value will be converted to as a float in the range of [-1, 1]
    SNorm,
    UScaled,
    SScaled,
    UInt,
    SInt,
    sRGB,
    SFloat,
    UFloat,
}

/// Bit decomposition of a texel or vertex attribute format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Format {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
    pub depth: u8,
    pub stencil: u8,
    /// Unused bits packed alongside the components, e.g. the X8 of `X8_D24_UNORM_PACK32`.
    pub padding: u8,
    pub ty: FormatType,
}

const fn color(r: u8, g: u8, b: u8, a: u8, ty: FormatType) -> Format {
    Format {
        r,
        g,
        b,
        a,
        depth: 0,
        stencil: 0,
        padding: 0,
        ty,
    }
}

const fn depth_stencil(depth: u8, stencil: u8, padding: u8, ty: FormatType) -> Format {
    Format {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
        depth,
        stencil,
        padding,
        ty,
    }
}

impl Format {
    /// Returns `None` for `UNDEFINED`, block-compressed and multi-planar formats,
    /// none of which have a per-texel width.
    #[rustfmt::skip]
    pub const fn from_vk(value: vk::Format) -> Option<Self> {
        use FormatType::*;
        Some(match value {
            vk::Format::R4G4_UNORM_PACK8 => color(4, 4, 0, 0, UNorm),
            vk::Format::R4G4B4A4_UNORM_PACK16 | vk::Format::B4G4R4A4_UNORM_PACK16 => color(4, 4, 4, 4, UNorm),
            vk::Format::R5G6B5_UNORM_PACK16 | vk::Format::B5G6R5_UNORM_PACK16 => color(5, 6, 5, 0, UNorm),
            vk::Format::R5G5B5A1_UNORM_PACK16 | vk::Format::B5G5R5A1_UNORM_PACK16 | vk::Format::A1R5G5B5_UNORM_PACK16 => color(5, 5, 5, 1, UNorm),

            vk::Format::R8_UNORM => color(8, 0, 0, 0, UNorm),
            vk::Format::R8_SNORM => color(8, 0, 0, 0, SNorm),
            vk::Format::R8_USCALED => color(8, 0, 0, 0, UScaled),
            vk::Format::R8_SSCALED => color(8, 0, 0, 0, SScaled),
            vk::Format::R8_UINT => color(8, 0, 0, 0, UInt),
            vk::Format::R8_SINT => color(8, 0, 0, 0, SInt),
            vk::Format::R8_SRGB => color(8, 0, 0, 0, sRGB),

            vk::Format::R8G8_UNORM => color(8, 8, 0, 0, UNorm),
            vk::Format::R8G8_SNORM => color(8, 8, 0, 0, SNorm),
            vk::Format::R8G8_UINT => color(8, 8, 0, 0, UInt),
            vk::Format::R8G8_SINT => color(8, 8, 0, 0, SInt),
            vk::Format::R8G8_SRGB => color(8, 8, 0, 0, sRGB),

            vk::Format::R8G8B8_UNORM | vk::Format::B8G8R8_UNORM => color(8, 8, 8, 0, UNorm),
            vk::Format::R8G8B8_SNORM | vk::Format::B8G8R8_SNORM => color(8, 8, 8, 0, SNorm),
            vk::Format::R8G8B8_UINT | vk::Format::B8G8R8_UINT => color(8, 8, 8, 0, UInt),
            vk::Format::R8G8B8_SINT | vk::Format::B8G8R8_SINT => color(8, 8, 8, 0, SInt),
            vk::Format::R8G8B8_SRGB | vk::Format::B8G8R8_SRGB => color(8, 8, 8, 0, sRGB),

            vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM | vk::Format::A8B8G8R8_UNORM_PACK32 => color(8, 8, 8, 8, UNorm),
            vk::Format::R8G8B8A8_SNORM | vk::Format::B8G8R8A8_SNORM | vk::Format::A8B8G8R8_SNORM_PACK32 => color(8, 8, 8, 8, SNorm),
            vk::Format::R8G8B8A8_USCALED | vk::Format::B8G8R8A8_USCALED => color(8, 8, 8, 8, UScaled),
            vk::Format::R8G8B8A8_SSCALED | vk::Format::B8G8R8A8_SSCALED => color(8, 8, 8, 8, SScaled),
            vk::Format::R8G8B8A8_UINT | vk::Format::B8G8R8A8_UINT | vk::Format::A8B8G8R8_UINT_PACK32 => color(8, 8, 8, 8, UInt),
            vk::Format::R8G8B8A8_SINT | vk::Format::B8G8R8A8_SINT | vk::Format::A8B8G8R8_SINT_PACK32 => color(8, 8, 8, 8, SInt),
            vk::Format::R8G8B8A8_SRGB | vk::Format::B8G8R8A8_SRGB | vk::Format::A8B8G8R8_SRGB_PACK32 => color(8, 8, 8, 8, sRGB),

            vk::Format::A2R10G10B10_UNORM_PACK32 | vk::Format::A2B10G10R10_UNORM_PACK32 => color(10, 10, 10, 2, UNorm),
            vk::Format::A2R10G10B10_UINT_PACK32 | vk::Format::A2B10G10R10_UINT_PACK32 => color(10, 10, 10, 2, UInt),
            vk::Format::B10G11R11_UFLOAT_PACK32 => color(11, 11, 10, 0, UFloat),
            vk::Format::E5B9G9R9_UFLOAT_PACK32 => Format { padding: 5, ..color(9, 9, 9, 0, UFloat) },

            vk::Format::R16_UNORM => color(16, 0, 0, 0, UNorm),
            vk::Format::R16_SNORM => color(16, 0, 0, 0, SNorm),
            vk::Format::R16_UINT => color(16, 0, 0, 0, UInt),
            vk::Format::R16_SINT => color(16, 0, 0, 0, SInt),
            vk::Format::R16_SFLOAT => color(16, 0, 0, 0, SFloat),
            vk::Format::R16G16_UNORM => color(16, 16, 0, 0, UNorm),
            vk::Format::R16G16_SNORM => color(16, 16, 0, 0, SNorm),
            vk::Format::R16G16_UINT => color(16, 16, 0, 0, UInt),
            vk::Format::R16G16_SINT => color(16, 16, 0, 0, SInt),
            vk::Format::R16G16_SFLOAT => color(16, 16, 0, 0, SFloat),
            vk::Format::R16G16B16_UNORM => color(16, 16, 16, 0, UNorm),
            vk::Format::R16G16B16_UINT => color(16, 16, 16, 0, UInt),
            vk::Format::R16G16B16_SINT => color(16, 16, 16, 0, SInt),
            vk::Format::R16G16B16_SFLOAT => color(16, 16, 16, 0, SFloat),
            vk::Format::R16G16B16A16_UNORM => color(16, 16, 16, 16, UNorm),
            vk::Format::R16G16B16A16_SNORM => color(16, 16, 16, 16, SNorm),
            vk::Format::R16G16B16A16_UINT => color(16, 16, 16, 16, UInt),
            vk::Format::R16G16B16A16_SINT => color(16, 16, 16, 16, SInt),
            vk::Format::R16G16B16A16_SFLOAT => color(16, 16, 16, 16, SFloat),

            vk::Format::R32_UINT => color(32, 0, 0, 0, UInt),
            vk::Format::R32_SINT => color(32, 0, 0, 0, SInt),
            vk::Format::R32_SFLOAT => color(32, 0, 0, 0, SFloat),
            vk::Format::R32G32_UINT => color(32, 32, 0, 0, UInt),
            vk::Format::R32G32_SINT => color(32, 32, 0, 0, SInt),
            vk::Format::R32G32_SFLOAT => color(32, 32, 0, 0, SFloat),
            vk::Format::R32G32B32_UINT => color(32, 32, 32, 0, UInt),
            vk::Format::R32G32B32_SINT => color(32, 32, 32, 0, SInt),
            vk::Format::R32G32B32_SFLOAT => color(32, 32, 32, 0, SFloat),
            vk::Format::R32G32B32A32_UINT => color(32, 32, 32, 32, UInt),
            vk::Format::R32G32B32A32_SINT => color(32, 32, 32, 32, SInt),
            vk::Format::R32G32B32A32_SFLOAT => color(32, 32, 32, 32, SFloat),

            vk::Format::R64_UINT => color(64, 0, 0, 0, UInt),
            vk::Format::R64_SINT => color(64, 0, 0, 0, SInt),
            vk::Format::R64_SFLOAT => color(64, 0, 0, 0, SFloat),
            vk::Format::R64G64_SFLOAT => color(64, 64, 0, 0, SFloat),
            vk::Format::R64G64B64_SFLOAT => color(64, 64, 64, 0, SFloat),
            vk::Format::R64G64B64A64_SFLOAT => color(64, 64, 64, 64, SFloat),

            vk::Format::D16_UNORM => depth_stencil(16, 0, 0, UNorm),
            vk::Format::X8_D24_UNORM_PACK32 => depth_stencil(24, 0, 8, UNorm),
            vk::Format::D32_SFLOAT => depth_stencil(32, 0, 0, SFloat),
            vk::Format::S8_UINT => depth_stencil(0, 8, 0, UInt),
            vk::Format::D16_UNORM_S8_UINT => depth_stencil(16, 8, 0, UNorm),
            vk::Format::D24_UNORM_S8_UINT => depth_stencil(24, 8, 0, UNorm),
            vk::Format::D32_SFLOAT_S8_UINT => depth_stencil(32, 8, 0, SFloat),
            _ => return None,
        })
    }

    pub const fn bits(&self) -> u32 {
        self.r as u32
            + self.g as u32
            + self.b as u32
            + self.a as u32
            + self.depth as u32
            + self.stencil as u32
            + self.padding as u32
    }

    /// Bytes occupied by one texel or one vertex attribute of this format.
    pub const fn byte_width(&self) -> u32 {
        self.bits().div_ceil(8)
    }

    pub const fn is_depth(&self) -> bool {
        self.depth > 0
    }

    pub const fn has_stencil(&self) -> bool {
        self.stencil > 0
    }

    pub const fn is_depth_stencil(&self) -> bool {
        self.is_depth() || self.has_stencil()
    }
}

/// Byte width of `format`, or `None` if the format has no fixed per-texel width.
pub fn byte_width(format: vk::Format) -> Option<u32> {
    Format::from_vk(format).map(|format| format.byte_width())
}

pub fn is_depth_stencil(format: vk::Format) -> bool {
    Format::from_vk(format).map_or(false, |format| format.is_depth_stencil())
}
