// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::path::Path;
use std::rc::Rc;

use log::{debug, warn};

use crate::backend::GraphicsBackend;
use crate::error::TextureError;
use crate::image_loader;
use crate::quad::FullScreenQuad;
use crate::settings::TextureSettings;
use crate::shader::TexturedQuadProgram;
use crate::texture_params::{FilterMode, PixelFormat, TextureUnit};

/// One 2D texture object plus the helpers needed to draw it full-screen.
///
/// Construction allocates nothing on the GPU. The handle exists once one of
/// the `create*` methods has succeeded and is released when the texture is
/// dropped or re-created.
pub struct Texture<B: GraphicsBackend> {
    gl: Rc<B>,
    settings: TextureSettings,
    id: Option<B::Texture>,
    width: u32,
    height: u32,
    format: PixelFormat,
    mag_filter: FilterMode,
    min_filter: FilterMode,
    // Built together on the first render_full_screen call.
    quad: Option<FullScreenQuad<B>>,
    program: Option<TexturedQuadProgram<B>>,
}

fn validate_dimensions(width: u32, height: u32) -> Result<(i32, i32), TextureError> {
    let invalid = TextureError::InvalidDimensions { width, height };
    if width == 0 || height == 0 {
        return Err(invalid);
    }
    match (i32::try_from(width), i32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(invalid),
    }
}

impl<B: GraphicsBackend> Texture<B> {
    pub fn new(gl: Rc<B>) -> Self {
        Self::with_settings(gl, TextureSettings::default())
    }

    pub fn with_settings(gl: Rc<B>, settings: TextureSettings) -> Self {
        Self {
            gl,
            settings,
            id: None,
            width: 0,
            height: 0,
            format: PixelFormat::Rgba8,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::NearestMipmapLinear,
            quad: None,
            program: None,
        }
    }

    /// Creates a texture containing the image stored at `image_file`.
    pub fn create(
        &mut self,
        image_file: impl AsRef<Path>,
        mag_filter: FilterMode,
        min_filter: FilterMode,
    ) -> Result<(), TextureError> {
        let image = image_loader::load_rgba8(image_file.as_ref(), self.settings.flip_vertically)?;
        debug!(
            "Decoded {:?}: {}x{}",
            image_file.as_ref(),
            image.width,
            image.height
        );
        self.create_from_rgba(image.width, image.height, &image.pixels, mag_filter, min_filter)
    }

    /// Same as [`Texture::create`] with the filters from the settings.
    pub fn create_with_default_filters(
        &mut self,
        image_file: impl AsRef<Path>,
    ) -> Result<(), TextureError> {
        let (mag, min) = (
            self.settings.default_mag_filter,
            self.settings.default_min_filter,
        );
        self.create(image_file, mag, min)
    }

    /// Creates a texture from tightly packed RGBA bytes.
    pub fn create_from_rgba(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
        mag_filter: FilterMode,
        min_filter: FilterMode,
    ) -> Result<(), TextureError> {
        self.allocate(
            Some(pixels),
            PixelFormat::Rgba8,
            width,
            height,
            mag_filter,
            min_filter,
        )
    }

    /// Creates an RGBA texture with undefined contents.
    pub fn create_color_texture(
        &mut self,
        width: u32,
        height: u32,
        mag_filter: FilterMode,
        min_filter: FilterMode,
    ) -> Result<(), TextureError> {
        self.allocate(
            None,
            PixelFormat::Rgba8,
            width,
            height,
            mag_filter,
            min_filter,
        )
    }

    /// Creates a float depth texture. Filtering is always nearest.
    pub fn create_depth_texture(&mut self, width: u32, height: u32) -> Result<(), TextureError> {
        self.allocate(
            None,
            PixelFormat::DepthFloat,
            width,
            height,
            FilterMode::Nearest,
            FilterMode::Nearest,
        )
    }

    fn allocate(
        &mut self,
        pixels: Option<&[u8]>,
        format: PixelFormat,
        width: u32,
        height: u32,
        mag_filter: FilterMode,
        min_filter: FilterMode,
    ) -> Result<(), TextureError> {
        let (gl_width, gl_height) = validate_dimensions(width, height)?;
        // The driver reads exactly this many bytes from `pixels`.
        if let Some(pixels) = pixels {
            let expected = (width as usize)
                .checked_mul(height as usize)
                .and_then(|texels| texels.checked_mul(format.bytes_per_pixel()))
                .ok_or(TextureError::InvalidDimensions { width, height })?;
            if pixels.len() != expected {
                return Err(TextureError::PixelDataSize {
                    expected,
                    actual: pixels.len(),
                });
            }
        }

        let tex = unsafe {
            let tex = self.gl.create_texture().map_err(TextureError::Backend)?;
            self.gl.bind_texture_2d(Some(tex));
            self.gl.tex_image_2d(
                format.internal_format(),
                gl_width,
                gl_height,
                format.format(),
                format.texel_type(),
                pixels,
            );
            self.gl
                .tex_parameter_i32(glow::TEXTURE_MAG_FILTER, mag_filter.to_gl() as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_MIN_FILTER, min_filter.to_gl() as i32);
            self.gl.bind_texture_2d(None);
            tex
        };

        if let Some(previous) = self.id.replace(tex) {
            warn!(
                "Texture {:?} re-created as {:?}; releasing the previous handle",
                previous, tex
            );
            unsafe { self.gl.delete_texture(previous) };
        }
        self.width = width;
        self.height = height;
        self.format = format;
        self.mag_filter = mag_filter;
        self.min_filter = min_filter;
        debug!(
            "Allocated {:?} texture {:?} ({}x{}, mag {:?}, min {:?})",
            format, tex, width, height, mag_filter, min_filter
        );
        Ok(())
    }

    /// Binds this texture on `unit`, then selects unit 0 again.
    pub fn bind(&self, unit: TextureUnit) {
        if self.id.is_none() {
            warn!("Binding a texture that has not been created yet");
        }
        unsafe {
            self.gl.active_texture(unit.gl_enum());
            self.gl.bind_texture_2d(self.id);
            self.gl.active_texture(TextureUnit::ZERO.gl_enum());
        }
    }

    /// Clears the 2D binding of `unit`, then selects unit 0 again.
    pub fn unbind(&self, unit: TextureUnit) {
        unsafe {
            self.gl.active_texture(unit.gl_enum());
            self.gl.bind_texture_2d(None);
            self.gl.active_texture(TextureUnit::ZERO.gl_enum());
        }
    }

    /// Draws this texture over the whole viewport.
    ///
    /// The quad and program are built on the first call and reused after that.
    /// No program and no unit-0 texture are bound when this returns.
    pub fn render_full_screen(&mut self) -> Result<(), TextureError> {
        self.ensure_full_screen_resources()?;
        let (Some(quad), Some(program)) = (&self.quad, &self.program) else {
            return Ok(());
        };

        program.bind();
        self.bind(TextureUnit::ZERO);
        let location = program.uniform_location(&self.settings.sampler_uniform);
        if location.is_none() {
            warn!(
                "Sampler uniform '{}' not found in the full-screen program",
                self.settings.sampler_uniform
            );
        }
        unsafe { self.gl.uniform_1_i32(location.as_ref(), 0) };
        quad.draw();
        self.unbind(TextureUnit::ZERO);
        program.unbind();
        Ok(())
    }

    fn ensure_full_screen_resources(&mut self) -> Result<(), TextureError> {
        if self.has_full_screen_resources() {
            return Ok(());
        }
        // Both slots are filled together or not at all.
        let quad = FullScreenQuad::new(&self.gl)?;
        let program = TexturedQuadProgram::create(&self.gl)?;
        self.quad = Some(quad);
        self.program = Some(program);
        debug!("Created full-screen quad and textured-quad program");
        Ok(())
    }

    pub fn id(&self) -> Option<B::Texture> {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn mag_filter(&self) -> FilterMode {
        self.mag_filter
    }

    pub fn min_filter(&self) -> FilterMode {
        self.min_filter
    }

    pub fn has_full_screen_resources(&self) -> bool {
        self.quad.is_some() && self.program.is_some()
    }
}

impl<B: GraphicsBackend> Drop for Texture<B> {
    fn drop(&mut self) {
        if let Some(tex) = self.id.take() {
            unsafe { self.gl.delete_texture(tex) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null_backend::{NullBackend, NullHandle};
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn setup() -> (Rc<NullBackend>, Texture<NullBackend>) {
        let gl = Rc::new(NullBackend::new());
        let texture = Texture::new(gl.clone());
        (gl, texture)
    }

    fn handle(texture: &Texture<NullBackend>) -> NullHandle {
        texture.id().expect("texture should be created")
    }

    #[test]
    fn test_new_allocates_nothing() {
        let (gl, texture) = setup();
        assert!(!texture.is_created());
        assert!(!texture.has_full_screen_resources());
        assert_eq!(gl.textures_created(), 0);
        assert_eq!(gl.vertex_arrays_created(), 0);
        assert_eq!(gl.programs_created(), 0);
    }

    #[test]
    fn test_create_color_texture() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(64, 32, FilterMode::Linear, FilterMode::Nearest)
            .unwrap();

        let info = gl.texture_info(handle(&texture)).unwrap();
        assert_eq!((info.width, info.height), (64, 32));
        assert_eq!(info.mag_filter, glow::LINEAR);
        assert_eq!(info.min_filter, glow::NEAREST);
        assert_eq!(info.format, glow::RGBA);
        assert_eq!(info.texel_type, glow::UNSIGNED_BYTE);
        assert!(!info.has_data);

        assert_eq!((texture.width(), texture.height()), (64, 32));
        assert_eq!(texture.format(), PixelFormat::Rgba8);
        assert_eq!(texture.mag_filter(), FilterMode::Linear);
        assert_eq!(texture.min_filter(), FilterMode::Nearest);
        assert_eq!(gl.texture_binding_2d(glow::TEXTURE0), None);
        assert!(gl.invalid_operations().is_empty());
    }

    #[test]
    fn test_create_depth_texture_forces_nearest() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(8, 8, FilterMode::Linear, FilterMode::LinearMipmapLinear)
            .unwrap();
        texture.create_depth_texture(16, 16).unwrap();

        let info = gl.texture_info(handle(&texture)).unwrap();
        assert_eq!(info.mag_filter, glow::NEAREST);
        assert_eq!(info.min_filter, glow::NEAREST);
        assert_eq!(info.format, glow::DEPTH_COMPONENT);
        assert_eq!(info.texel_type, glow::FLOAT);
        assert_eq!((info.width, info.height), (16, 16));
        assert_eq!(texture.format(), PixelFormat::DepthFloat);
    }

    #[test]
    fn test_create_from_image_file() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let path = dir.path().join("checker.png");
        RgbaImage::from_fn(5, 3, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
        .save(&path)
        .unwrap();

        let (gl, mut texture) = setup();
        texture
            .create(&path, FilterMode::Nearest, FilterMode::Linear)
            .unwrap();

        let info = gl.texture_info(handle(&texture)).unwrap();
        assert_eq!((info.width, info.height), (5, 3));
        assert!(info.has_data);
        assert_eq!(info.mag_filter, glow::NEAREST);
        assert_eq!(info.min_filter, glow::LINEAR);
    }

    #[test]
    fn test_create_with_default_filters_uses_settings() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let path = dir.path().join("pixel.png");
        RgbaImage::new(2, 2).save(&path).unwrap();

        let gl = Rc::new(NullBackend::new());
        let settings = TextureSettings {
            default_mag_filter: FilterMode::Nearest,
            default_min_filter: FilterMode::NearestMipmapNearest,
            ..TextureSettings::default()
        };
        let mut texture = Texture::with_settings(gl.clone(), settings);
        texture.create_with_default_filters(&path).unwrap();

        let info = gl.texture_info(handle(&texture)).unwrap();
        assert_eq!(info.mag_filter, glow::NEAREST);
        assert_eq!(info.min_filter, glow::NEAREST_MIPMAP_NEAREST);
    }

    #[test]
    fn test_create_missing_image_leaves_texture_untouched() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let (gl, mut texture) = setup();

        let result = texture.create(
            dir.path().join("nope.png"),
            FilterMode::Linear,
            FilterMode::Linear,
        );
        assert!(matches!(result, Err(TextureError::Image(_))));
        assert!(!texture.is_created());
        assert_eq!(gl.textures_created(), 0);
    }

    #[test]
    fn test_zero_dimensions_are_rejected() {
        let (gl, mut texture) = setup();
        let result = texture.create_color_texture(0, 4, FilterMode::Linear, FilterMode::Linear);
        assert!(matches!(
            result,
            Err(TextureError::InvalidDimensions {
                width: 0,
                height: 4
            })
        ));
        assert!(texture.create_depth_texture(4, 0).is_err());
        assert_eq!(gl.textures_created(), 0);
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let (gl, mut texture) = setup();
        let result = texture.create_depth_texture(u32::MAX, 1);
        assert!(matches!(result, Err(TextureError::InvalidDimensions { .. })));
        assert_eq!(gl.textures_created(), 0);
    }

    #[test]
    fn test_create_from_rgba_checks_length() {
        let (gl, mut texture) = setup();
        let result = texture.create_from_rgba(
            2,
            2,
            &[0u8; 15],
            FilterMode::Linear,
            FilterMode::Linear,
        );
        assert!(matches!(
            result,
            Err(TextureError::PixelDataSize {
                expected: 16,
                actual: 15
            })
        ));
        assert_eq!(gl.textures_created(), 0);

        texture
            .create_from_rgba(2, 2, &[7u8; 16], FilterMode::Linear, FilterMode::Linear)
            .unwrap();
        assert!(gl.texture_info(handle(&texture)).unwrap().has_data);
    }

    #[test]
    fn test_recreate_releases_previous_handle() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Linear, FilterMode::Linear)
            .unwrap();
        let first = handle(&texture);

        texture
            .create_color_texture(8, 8, FilterMode::Linear, FilterMode::Linear)
            .unwrap();

        assert!(!gl.is_texture(first));
        assert_ne!(handle(&texture), first);
        assert_eq!(gl.live_textures(), 1);
        assert_eq!(texture.width(), 8);
    }

    #[test]
    fn test_failed_create_keeps_previous_texture() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Nearest, FilterMode::LinearMipmapNearest)
            .unwrap();
        let first = handle(&texture);

        assert!(matches!(
            texture.create(
                dir.path().join("missing.png"),
                FilterMode::Linear,
                FilterMode::Linear
            ),
            Err(TextureError::Image(_))
        ));
        assert!(matches!(
            texture.create_color_texture(0, 4, FilterMode::Linear, FilterMode::Linear),
            Err(TextureError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            texture.create_from_rgba(2, 2, &[0u8; 3], FilterMode::Linear, FilterMode::Linear),
            Err(TextureError::PixelDataSize { .. })
        ));

        assert_eq!(texture.id(), Some(first));
        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert_eq!(texture.format(), PixelFormat::Rgba8);
        assert_eq!(texture.mag_filter(), FilterMode::Nearest);
        assert_eq!(texture.min_filter(), FilterMode::LinearMipmapNearest);
        assert!(gl.is_texture(first));
        assert_eq!(gl.live_textures(), 1);
        assert_eq!(gl.textures_created(), 1);
        assert!(gl.invalid_operations().is_empty());
    }

    #[test]
    fn test_pixel_data_is_checked_before_upload() {
        let (gl, mut texture) = setup();
        let result = texture.allocate(
            Some(&[0u8; 4][..]),
            PixelFormat::Rgba8,
            1024,
            1024,
            FilterMode::Linear,
            FilterMode::Linear,
        );
        assert!(matches!(
            result,
            Err(TextureError::PixelDataSize {
                expected: 4_194_304,
                actual: 4
            })
        ));

        let result = texture.allocate(
            Some(&[0u8; 16][..]),
            PixelFormat::DepthFloat,
            2,
            2,
            FilterMode::Nearest,
            FilterMode::Nearest,
        );
        assert!(result.is_ok());
        assert!(gl.texture_info(handle(&texture)).unwrap().has_data);
        assert_eq!(gl.textures_created(), 1);
        assert!(gl.invalid_operations().is_empty());
    }

    #[test]
    fn test_bind_resets_active_unit() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Nearest, FilterMode::Nearest)
            .unwrap();

        texture.bind(TextureUnit::new(1).unwrap());

        assert_eq!(gl.texture_binding_2d(glow::TEXTURE1), Some(handle(&texture)));
        assert_eq!(gl.active_texture_unit(), glow::TEXTURE0);
        assert_eq!(gl.texture_binding_2d(glow::TEXTURE0), None);
    }

    #[test]
    fn test_unbind_clears_unit_and_resets_active_unit() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Nearest, FilterMode::Nearest)
            .unwrap();
        let unit = TextureUnit::new(3).unwrap();
        texture.bind(unit);

        texture.unbind(unit);

        assert_eq!(gl.texture_binding_2d(glow::TEXTURE3), None);
        assert_eq!(gl.active_texture_unit(), glow::TEXTURE0);
    }

    #[test]
    fn test_render_full_screen_draws_with_texture_on_unit_zero() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Linear, FilterMode::Linear)
            .unwrap();

        texture.render_full_screen().unwrap();

        let calls = gl.draw_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mode, glow::TRIANGLE_STRIP);
        assert_eq!(calls[0].unit0_texture, Some(handle(&texture)));

        let program = calls[0].program.unwrap();
        assert_eq!(gl.uniform_i32(program, "tex"), Some(0));

        assert_eq!(gl.current_program(), None);
        assert_eq!(gl.texture_binding_2d(glow::TEXTURE0), None);
        assert_eq!(gl.active_texture_unit(), glow::TEXTURE0);
        assert!(gl.invalid_operations().is_empty());
    }

    #[test]
    fn test_render_full_screen_builds_resources_once() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Linear, FilterMode::Linear)
            .unwrap();

        texture.render_full_screen().unwrap();
        texture.render_full_screen().unwrap();

        assert!(texture.has_full_screen_resources());
        assert_eq!(gl.programs_created(), 1);
        assert_eq!(gl.vertex_arrays_created(), 1);
        assert_eq!(gl.draw_calls().len(), 2);
    }

    #[test]
    fn test_render_full_screen_retries_after_shader_failure() {
        let (gl, mut texture) = setup();
        texture
            .create_color_texture(4, 4, FilterMode::Linear, FilterMode::Linear)
            .unwrap();

        gl.set_fail_shader_compilation(true);
        let result = texture.render_full_screen();
        assert!(matches!(result, Err(TextureError::Shader(_))));
        assert!(!texture.has_full_screen_resources());
        assert!(gl.draw_calls().is_empty());

        assert_eq!(gl.live_vertex_arrays(), 0);
        assert_eq!(gl.live_buffers(), 0);

        gl.set_fail_shader_compilation(false);
        texture.render_full_screen().unwrap();
        assert!(texture.has_full_screen_resources());
        assert_eq!(gl.live_vertex_arrays(), 1);
        assert_eq!(gl.programs_created(), 1);
        assert_eq!(gl.vertex_arrays_created(), 2);
        assert_eq!(gl.draw_calls().len(), 1);
    }

    #[test]
    fn test_sampler_uniform_name_comes_from_settings() {
        let gl = Rc::new(NullBackend::new());
        let settings = TextureSettings {
            sampler_uniform: String::from("missing"),
            ..TextureSettings::default()
        };
        let mut texture = Texture::with_settings(gl.clone(), settings);
        texture
            .create_color_texture(2, 2, FilterMode::Linear, FilterMode::Linear)
            .unwrap();

        texture.render_full_screen().unwrap();

        let program = gl.draw_calls()[0].program.unwrap();
        assert_eq!(gl.uniform_i32(program, "tex"), None);
        assert_eq!(gl.draw_calls().len(), 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let gl = Rc::new(NullBackend::new());
        {
            let mut texture = Texture::new(gl.clone());
            texture
                .create_color_texture(4, 4, FilterMode::Linear, FilterMode::Linear)
                .unwrap();
            texture.render_full_screen().unwrap();
        }
        assert_eq!(gl.live_textures(), 0);
        assert_eq!(gl.live_programs(), 0);
        assert_eq!(gl.live_vertex_arrays(), 0);
        assert_eq!(gl.live_buffers(), 0);
    }
}
