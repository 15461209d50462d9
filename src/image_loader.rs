// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::error::TextureError;

/// Pixel data decoded to RGBA, one byte per channel, rows in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn from_dynamic(img: DynamicImage, flip_vertically: bool) -> Self {
        let img = if flip_vertically { img.flipv() } else { img };
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.to_rgba8().into_raw(),
        }
    }
}

pub fn load_rgba8(path: &Path, flip_vertically: bool) -> Result<DecodedImage, TextureError> {
    // Load image with the `image` crate
    let img = image::open(path)?;
    Ok(DecodedImage::from_dynamic(img, flip_vertically))
}
