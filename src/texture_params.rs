// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use serde::{Deserialize, Serialize};

/// Sampling policy used when a texture is magnified or minified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl FilterMode {
    pub fn to_gl(self) -> u32 {
        match self {
            FilterMode::Nearest => glow::NEAREST,
            FilterMode::Linear => glow::LINEAR,
            FilterMode::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
            FilterMode::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
            FilterMode::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
            FilterMode::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
        }
    }

    pub fn from_gl(value: u32) -> Option<Self> {
        match value {
            glow::NEAREST => Some(FilterMode::Nearest),
            glow::LINEAR => Some(FilterMode::Linear),
            glow::NEAREST_MIPMAP_NEAREST => Some(FilterMode::NearestMipmapNearest),
            glow::LINEAR_MIPMAP_NEAREST => Some(FilterMode::LinearMipmapNearest),
            glow::NEAREST_MIPMAP_LINEAR => Some(FilterMode::NearestMipmapLinear),
            glow::LINEAR_MIPMAP_LINEAR => Some(FilterMode::LinearMipmapLinear),
            _ => None,
        }
    }
}

/// A texture unit, stored as its zero-based index.
///
/// The index is bounded so that `GL_TEXTURE0 + index` always fits in a `u32`.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TextureUnit(u32);

impl TextureUnit {
    pub const ZERO: TextureUnit = TextureUnit(0);
    pub const MAX_INDEX: u32 = u32::MAX - glow::TEXTURE0;

    pub const fn new(index: u32) -> Option<Self> {
        if index > Self::MAX_INDEX {
            return None;
        }
        Some(TextureUnit(index))
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// The `GL_TEXTUREn` enum passed to `glActiveTexture`.
    pub fn gl_enum(self) -> u32 {
        glow::TEXTURE0 + self.0
    }

    pub fn from_gl_enum(value: u32) -> Option<Self> {
        value.checked_sub(glow::TEXTURE0).map(TextureUnit)
    }
}

/// Texel layout of an allocated texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Four channels, one unsigned byte each.
    Rgba8,
    /// Single depth channel stored as floats.
    DepthFloat,
}

impl PixelFormat {
    pub fn internal_format(self) -> i32 {
        self.format() as i32
    }

    pub fn format(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => glow::RGBA,
            PixelFormat::DepthFloat => glow::DEPTH_COMPONENT,
        }
    }

    pub fn texel_type(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => glow::UNSIGNED_BYTE,
            PixelFormat::DepthFloat => glow::FLOAT,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}
