// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

//! The subset of the graphics API used by textures, the full-screen quad and
//! the textured-quad program.
//!
//! Method names and argument order follow `glow::HasContext`. The backend owns
//! the shared pipeline state (active unit, per-unit bindings, current program),
//! so every call that mutates it goes through a backend reference.
//!
//! # Safety
//!
//! Every method is `unsafe` for the same reasons as `glow::HasContext`: the
//! context must be current on the calling thread, handles must come from this
//! backend, and slices handed to uploads must be at least as large as the
//! driver will read (`width * height * bytes_per_pixel` for `tex_image_2d`).

use std::fmt::Debug;

use glow::HasContext;

pub trait GraphicsBackend {
    type Texture: Copy + PartialEq + Debug;
    type Shader: Copy + Debug;
    type Program: Copy + PartialEq + Debug;
    type Buffer: Copy + Debug;
    type VertexArray: Copy + Debug;
    type UniformLocation: Debug;

    // textures
    unsafe fn create_texture(&self) -> Result<Self::Texture, String>;
    unsafe fn delete_texture(&self, texture: Self::Texture);
    unsafe fn active_texture(&self, unit: u32);
    /// Binds to the `TEXTURE_2D` target of the active unit.
    unsafe fn bind_texture_2d(&self, texture: Option<Self::Texture>);
    /// Allocates level 0 of the `TEXTURE_2D` target of the active unit.
    unsafe fn tex_image_2d(
        &self,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    unsafe fn tex_parameter_i32(&self, parameter: u32, value: i32);

    // shaders
    unsafe fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String>;
    unsafe fn shader_source(&self, shader: Self::Shader, source: &str);
    unsafe fn compile_shader(&self, shader: Self::Shader);
    unsafe fn get_shader_compile_status(&self, shader: Self::Shader) -> bool;
    unsafe fn get_shader_info_log(&self, shader: Self::Shader) -> String;
    unsafe fn delete_shader(&self, shader: Self::Shader);

    // programs
    unsafe fn create_program(&self) -> Result<Self::Program, String>;
    unsafe fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    unsafe fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    unsafe fn link_program(&self, program: Self::Program);
    unsafe fn get_program_link_status(&self, program: Self::Program) -> bool;
    unsafe fn get_program_info_log(&self, program: Self::Program) -> String;
    unsafe fn delete_program(&self, program: Self::Program);
    unsafe fn use_program(&self, program: Option<Self::Program>);
    unsafe fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    unsafe fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32);

    // geometry
    unsafe fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    unsafe fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    unsafe fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    unsafe fn create_buffer(&self) -> Result<Self::Buffer, String>;
    unsafe fn delete_buffer(&self, buffer: Self::Buffer);
    /// Binds to the `ARRAY_BUFFER` target.
    unsafe fn bind_array_buffer(&self, buffer: Option<Self::Buffer>);
    /// Uploads `STATIC_DRAW` data to the bound `ARRAY_BUFFER`.
    unsafe fn array_buffer_data_u8_slice(&self, data: &[u8]);
    unsafe fn enable_vertex_attrib_array(&self, index: u32);
    unsafe fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32);
    unsafe fn draw_arrays(&self, mode: u32, first: i32, count: i32);
}

impl GraphicsBackend for glow::Context {
    type Texture = glow::Texture;
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Buffer = glow::Buffer;
    type VertexArray = glow::VertexArray;
    type UniformLocation = glow::UniformLocation;

    unsafe fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { HasContext::create_texture(self) }
    }

    unsafe fn delete_texture(&self, texture: Self::Texture) {
        unsafe { HasContext::delete_texture(self, texture) }
    }

    unsafe fn active_texture(&self, unit: u32) {
        unsafe { HasContext::active_texture(self, unit) }
    }

    unsafe fn bind_texture_2d(&self, texture: Option<Self::Texture>) {
        unsafe { HasContext::bind_texture(self, glow::TEXTURE_2D, texture) }
    }

    unsafe fn tex_image_2d(
        &self,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        unsafe {
            HasContext::tex_image_2d(
                self,
                glow::TEXTURE_2D,
                0,
                internal_format,
                width,
                height,
                0,
                format,
                ty,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

    unsafe fn tex_parameter_i32(&self, parameter: u32, value: i32) {
        unsafe { HasContext::tex_parameter_i32(self, glow::TEXTURE_2D, parameter, value) }
    }

    unsafe fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String> {
        unsafe { HasContext::create_shader(self, shader_type) }
    }

    unsafe fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { HasContext::shader_source(self, shader, source) }
    }

    unsafe fn compile_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::compile_shader(self, shader) }
    }

    unsafe fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { HasContext::get_shader_compile_status(self, shader) }
    }

    unsafe fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { HasContext::get_shader_info_log(self, shader) }
    }

    unsafe fn delete_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::delete_shader(self, shader) }
    }

    unsafe fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { HasContext::create_program(self) }
    }

    unsafe fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { HasContext::attach_shader(self, program, shader) }
    }

    unsafe fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { HasContext::detach_shader(self, program, shader) }
    }

    unsafe fn link_program(&self, program: Self::Program) {
        unsafe { HasContext::link_program(self, program) }
    }

    unsafe fn get_program_link_status(&self, program: Self::Program) -> bool {
        unsafe { HasContext::get_program_link_status(self, program) }
    }

    unsafe fn get_program_info_log(&self, program: Self::Program) -> String {
        unsafe { HasContext::get_program_info_log(self, program) }
    }

    unsafe fn delete_program(&self, program: Self::Program) {
        unsafe { HasContext::delete_program(self, program) }
    }

    unsafe fn use_program(&self, program: Option<Self::Program>) {
        unsafe { HasContext::use_program(self, program) }
    }

    unsafe fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { HasContext::get_uniform_location(self, program, name) }
    }

    unsafe fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32) {
        unsafe { HasContext::uniform_1_i32(self, location, x) }
    }

    unsafe fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { HasContext::create_vertex_array(self) }
    }

    unsafe fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe { HasContext::delete_vertex_array(self, vertex_array) }
    }

    unsafe fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { HasContext::bind_vertex_array(self, vertex_array) }
    }

    unsafe fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { HasContext::create_buffer(self) }
    }

    unsafe fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { HasContext::delete_buffer(self, buffer) }
    }

    unsafe fn bind_array_buffer(&self, buffer: Option<Self::Buffer>) {
        unsafe { HasContext::bind_buffer(self, glow::ARRAY_BUFFER, buffer) }
    }

    unsafe fn array_buffer_data_u8_slice(&self, data: &[u8]) {
        unsafe {
            HasContext::buffer_data_u8_slice(self, glow::ARRAY_BUFFER, data, glow::STATIC_DRAW)
        }
    }

    unsafe fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { HasContext::enable_vertex_attrib_array(self, index) }
    }

    unsafe fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe {
            HasContext::vertex_attrib_pointer_f32(
                self,
                index,
                size,
                glow::FLOAT,
                false,
                stride,
                offset,
            )
        }
    }

    unsafe fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { HasContext::draw_arrays(self, mode, first, count) }
    }
}
