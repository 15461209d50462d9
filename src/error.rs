// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use image::ImageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("Image loading error: {0}")]
    Image(#[from] ImageError),

    #[error("Invalid texture dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Pixel data size mismatch: expected {expected} bytes, got {actual}")]
    PixelDataSize { expected: usize, actual: usize },

    #[error("Graphics backend error: {0}")]
    Backend(String),

    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),
}

/// Errors that can occur while building the textured-quad program.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    #[error("shader compile error ({stage}):\n{log}")]
    Compile { stage: String, log: String },

    #[error("shader link error:\n{0}")]
    Link(String),

    #[error("unable to create shader object: {0}")]
    Backend(String),
}
