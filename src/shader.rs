// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::rc::Rc;

use crate::backend::GraphicsBackend;
use crate::error::ShaderError;

pub const TEXTURED_QUAD_VERTEX_SHADER: &str = r#"#version 330 core
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 uv;
out vec2 v_uv;
void main() {
    v_uv = uv;
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

pub const TEXTURED_QUAD_FRAGMENT_SHADER: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 frag_color;
uniform sampler2D tex;
void main() {
    frag_color = texture(tex, v_uv);
}
"#;

/// Prepends line numbers to `source` so driver logs can be matched to it.
pub fn format_shader_error(source: &str, log: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let width = lines.len().max(1).to_string().len();
    let numbered = lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}: {line}", i + 1, width = width))
        .collect::<Vec<_>>()
        .join("\n");

    match (numbered.is_empty(), log.is_empty()) {
        (true, _) => log.to_string(),
        (false, true) => numbered,
        (false, false) => format!("{numbered}\n\n{log}"),
    }
}

fn compile_shader<B: GraphicsBackend>(
    gl: &B,
    shader_type: u32,
    source: &str,
) -> Result<B::Shader, ShaderError> {
    let stage = match shader_type {
        glow::VERTEX_SHADER => "vertex",
        glow::FRAGMENT_SHADER => "fragment",
        _ => "unknown",
    };

    unsafe {
        let shader = gl.create_shader(shader_type).map_err(ShaderError::Backend)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(ShaderError::Compile {
                stage: stage.to_string(),
                log: format_shader_error(source, &log),
            });
        }
        Ok(shader)
    }
}

/// Shader program that samples `tex` across a full-screen quad.
pub struct TexturedQuadProgram<B: GraphicsBackend> {
    gl: Rc<B>,
    id: B::Program,
}

impl<B: GraphicsBackend> TexturedQuadProgram<B> {
    pub fn create(gl: &Rc<B>) -> Result<Self, ShaderError> {
        Self::from_sources(gl, TEXTURED_QUAD_VERTEX_SHADER, TEXTURED_QUAD_FRAGMENT_SHADER)
    }

    pub fn from_sources(
        gl: &Rc<B>,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self, ShaderError> {
        unsafe {
            let vertex = compile_shader(gl.as_ref(), glow::VERTEX_SHADER, vertex_src)?;
            let fragment = match compile_shader(gl.as_ref(), glow::FRAGMENT_SHADER, fragment_src) {
                Ok(fragment) => fragment,
                Err(e) => {
                    gl.delete_shader(vertex);
                    return Err(e);
                }
            };

            let linked = gl.create_program().map_err(ShaderError::Backend).and_then(|program| {
                gl.attach_shader(program, vertex);
                gl.attach_shader(program, fragment);
                gl.link_program(program);
                gl.detach_shader(program, vertex);
                gl.detach_shader(program, fragment);

                if gl.get_program_link_status(program) {
                    Ok(program)
                } else {
                    let log = gl.get_program_info_log(program);
                    gl.delete_program(program);
                    Err(ShaderError::Link(log))
                }
            });

            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            Ok(Self {
                gl: gl.clone(),
                id: linked?,
            })
        }
    }

    pub fn id(&self) -> B::Program {
        self.id
    }

    pub fn bind(&self) {
        unsafe { self.gl.use_program(Some(self.id)) }
    }

    pub fn unbind(&self) {
        unsafe { self.gl.use_program(None) }
    }

    pub fn uniform_location(&self, name: &str) -> Option<B::UniformLocation> {
        unsafe { self.gl.get_uniform_location(self.id, name) }
    }
}

impl<B: GraphicsBackend> Drop for TexturedQuadProgram<B> {
    fn drop(&mut self) {
        unsafe { self.gl.delete_program(self.id) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null_backend::NullBackend;

    #[test]
    fn test_create_links_and_releases_stages() {
        let gl = Rc::new(NullBackend::new());
        let program = TexturedQuadProgram::create(&gl).unwrap();

        assert_eq!(gl.live_programs(), 1);
        assert_eq!(gl.live_shaders(), 0);
        assert!(program.uniform_location("tex").is_some());
    }

    #[test]
    fn test_bind_and_unbind() {
        let gl = Rc::new(NullBackend::new());
        let program = TexturedQuadProgram::create(&gl).unwrap();

        program.bind();
        assert_eq!(gl.current_program(), Some(program.id()));
        program.unbind();
        assert_eq!(gl.current_program(), None);
    }

    #[test]
    fn test_drop_deletes_program() {
        let gl = Rc::new(NullBackend::new());
        {
            let _program = TexturedQuadProgram::create(&gl).unwrap();
        }
        assert_eq!(gl.live_programs(), 0);
    }

    #[test]
    fn test_compile_failure_cleans_up() {
        let gl = Rc::new(NullBackend::new());
        gl.set_fail_shader_compilation(true);

        let result = TexturedQuadProgram::create(&gl);
        assert!(matches!(result, Err(ShaderError::Compile { ref stage, .. }) if stage == "vertex"));
        assert_eq!(gl.live_shaders(), 0);
        assert_eq!(gl.live_programs(), 0);
    }

    #[test]
    fn test_fragment_failure_reports_stage() {
        let gl = Rc::new(NullBackend::new());
        let result = TexturedQuadProgram::from_sources(&gl, TEXTURED_QUAD_VERTEX_SHADER, "  ");
        assert!(matches!(result, Err(ShaderError::Compile { ref stage, .. }) if stage == "fragment"));
        assert_eq!(gl.live_shaders(), 0);
    }

    #[test]
    fn test_format_shader_error_numbers_lines() {
        let formatted = format_shader_error("a\nb\n", "ERROR: 0:2: oops");
        assert!(formatted.contains("1: a"));
        assert!(formatted.contains("2: b"));
        assert!(formatted.ends_with("ERROR: 0:2: oops"));
        assert_eq!(format_shader_error("", "log only"), "log only");
    }

    #[test]
    fn test_sources_declare_sampler() {
        assert!(TEXTURED_QUAD_FRAGMENT_SHADER.contains("uniform sampler2D tex;"));
        assert!(TEXTURED_QUAD_VERTEX_SHADER.contains("layout(location = 0) in vec2 position;"));
    }
}
