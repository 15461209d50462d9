// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

//! A 2D GPU texture with bind/unbind helpers and a full-screen draw path.
//!
//! All GPU work goes through a [`GraphicsBackend`]: `glow::Context` for real
//! rendering, [`NullBackend`] for headless use and tests.

pub mod backend;
pub mod error;
pub mod image_loader;
pub mod null_backend;
pub mod quad;
pub mod settings;
pub mod shader;
pub mod texture;
pub mod texture_params;

pub use backend::GraphicsBackend;
pub use error::{ShaderError, TextureError};
pub use image_loader::DecodedImage;
pub use null_backend::NullBackend;
pub use quad::FullScreenQuad;
pub use settings::{SettingsError, TextureSettings};
pub use shader::TexturedQuadProgram;
pub use texture::Texture;
pub use texture_params::{FilterMode, PixelFormat, TextureUnit};
