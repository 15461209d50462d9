// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::mem::{offset_of, size_of};
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use crate::backend::GraphicsBackend;
use crate::error::TextureError;

pub const POSITION_LOCATION: u32 = 0;
pub const UV_LOCATION: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Triangle strip covering clip space, uv (0,0) in the bottom-left corner.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 1.0],
    },
];

pub struct FullScreenQuad<B: GraphicsBackend> {
    gl: Rc<B>,
    vao: B::VertexArray,
    vbo: B::Buffer,
}

impl<B: GraphicsBackend> FullScreenQuad<B> {
    pub fn new(gl: &Rc<B>) -> Result<Self, TextureError> {
        unsafe {
            let vao = gl.create_vertex_array().map_err(TextureError::Backend)?;
            let vbo = match gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(e) => {
                    gl.delete_vertex_array(vao);
                    return Err(TextureError::Backend(e));
                }
            };

            gl.bind_vertex_array(Some(vao));
            gl.bind_array_buffer(Some(vbo));
            gl.array_buffer_data_u8_slice(bytemuck::cast_slice(&QUAD_VERTICES[..]));

            let stride = size_of::<QuadVertex>() as i32;
            gl.enable_vertex_attrib_array(POSITION_LOCATION);
            gl.vertex_attrib_pointer_f32(
                POSITION_LOCATION,
                2,
                stride,
                offset_of!(QuadVertex, position) as i32,
            );
            gl.enable_vertex_attrib_array(UV_LOCATION);
            gl.vertex_attrib_pointer_f32(UV_LOCATION, 2, stride, offset_of!(QuadVertex, uv) as i32);

            gl.bind_vertex_array(None);
            gl.bind_array_buffer(None);

            Ok(Self {
                gl: gl.clone(),
                vao,
                vbo,
            })
        }
    }

    pub fn draw(&self) {
        unsafe {
            self.gl.bind_vertex_array(Some(self.vao));
            self.gl
                .draw_arrays(glow::TRIANGLE_STRIP, 0, QUAD_VERTICES.len() as i32);
            self.gl.bind_vertex_array(None);
        }
    }
}

impl<B: GraphicsBackend> Drop for FullScreenQuad<B> {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_vertex_array(self.vao);
            self.gl.delete_buffer(self.vbo);
        }
    }
}
