// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

//! A headless [`GraphicsBackend`] that tracks the GL state the crate touches
//! without talking to a driver.
//!
//! Calls that a real driver would reject with `GL_INVALID_OPERATION` or
//! `GL_INVALID_VALUE` are recorded in [`NullBackend::invalid_operations`]
//! and otherwise ignored.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use log::debug;

use crate::backend::GraphicsBackend;

#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NullHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NullUniformLocation {
    pub program: NullHandle,
    pub name: String,
}

/// Storage and sampling state of one texture object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullTextureInfo {
    pub width: i32,
    pub height: i32,
    pub internal_format: i32,
    pub format: u32,
    pub texel_type: u32,
    pub mag_filter: u32,
    pub min_filter: u32,
    /// Whether the last upload carried pixel data.
    pub has_data: bool,
}

impl Default for NullTextureInfo {
    fn default() -> Self {
        // GL defaults for a freshly generated texture.
        Self {
            width: 0,
            height: 0,
            internal_format: 0,
            format: 0,
            texel_type: 0,
            mag_filter: glow::LINEAR,
            min_filter: glow::NEAREST_MIPMAP_LINEAR,
            has_data: false,
        }
    }
}

/// Pipeline state captured when a draw call was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullDrawCall {
    pub mode: u32,
    pub first: i32,
    pub count: i32,
    pub program: Option<NullHandle>,
    pub vertex_array: Option<NullHandle>,
    pub unit0_texture: Option<NullHandle>,
}

#[derive(Debug)]
struct NullShader {
    source: String,
    compiled: bool,
    info_log: String,
}

#[derive(Debug, Default)]
struct NullProgram {
    attached: Vec<NullHandle>,
    linked: bool,
    info_log: String,
    uniforms: HashSet<String>,
}

#[derive(Debug)]
struct NullState {
    next_handle: u32,
    textures: HashMap<NullHandle, NullTextureInfo>,
    shaders: HashMap<NullHandle, NullShader>,
    programs: HashMap<NullHandle, NullProgram>,
    vertex_arrays: HashMap<NullHandle, HashSet<u32>>,
    buffers: HashMap<NullHandle, usize>,
    active_unit: u32,
    unit_bindings: HashMap<u32, NullHandle>,
    current_program: Option<NullHandle>,
    bound_vertex_array: Option<NullHandle>,
    bound_array_buffer: Option<NullHandle>,
    uniform_values: HashMap<NullUniformLocation, i32>,
    draw_calls: Vec<NullDrawCall>,
    invalid_operations: Vec<String>,
    textures_created: usize,
    programs_created: usize,
    vertex_arrays_created: usize,
    fail_shader_compilation: bool,
}

impl Default for NullState {
    fn default() -> Self {
        Self {
            next_handle: 1,
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            buffers: HashMap::new(),
            active_unit: glow::TEXTURE0,
            unit_bindings: HashMap::new(),
            current_program: None,
            bound_vertex_array: None,
            bound_array_buffer: None,
            uniform_values: HashMap::new(),
            draw_calls: Vec::new(),
            invalid_operations: Vec::new(),
            textures_created: 0,
            programs_created: 0,
            vertex_arrays_created: 0,
            fail_shader_compilation: false,
        }
    }
}

impl NullState {
    fn allocate(&mut self) -> NullHandle {
        let handle = NullHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn invalid(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("NullBackend: {}", message);
        self.invalid_operations.push(message);
    }

    fn bound_texture_info(&mut self) -> Option<&mut NullTextureInfo> {
        let handle = *self.unit_bindings.get(&self.active_unit)?;
        self.textures.get_mut(&handle)
    }
}

/// Collects `uniform <type> <name>;` declarations from GLSL source.
fn declared_uniforms(source: &str) -> impl Iterator<Item = String> + '_ {
    source.lines().filter_map(|line| {
        let declaration = line.trim().strip_prefix("uniform ")?;
        let name = declaration.split_whitespace().last()?;
        let name = name.trim_end_matches(';');
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Bytes per texel for the client formats the crate uploads.
fn texel_size(format: u32, ty: u32) -> Option<usize> {
    let channels = match format {
        glow::RGBA => 4,
        glow::RGB => 3,
        glow::RG => 2,
        glow::RED | glow::DEPTH_COMPONENT => 1,
        _ => return None,
    };
    let size = match ty {
        glow::UNSIGNED_BYTE => 1,
        glow::FLOAT => 4,
        _ => return None,
    };
    Some(channels * size)
}

#[derive(Debug, Default)]
pub struct NullBackend {
    state: RefCell<NullState>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent shader compilation fail.
    pub fn set_fail_shader_compilation(&self, fail: bool) {
        self.state.borrow_mut().fail_shader_compilation = fail;
    }

    pub fn texture_info(&self, texture: NullHandle) -> Option<NullTextureInfo> {
        self.state.borrow().textures.get(&texture).cloned()
    }

    pub fn is_texture(&self, texture: NullHandle) -> bool {
        self.state.borrow().textures.contains_key(&texture)
    }

    /// The `GL_TEXTUREn` enum selected by the last `active_texture` call.
    pub fn active_texture_unit(&self) -> u32 {
        self.state.borrow().active_unit
    }

    /// The 2D texture bound on `unit`, given as a `GL_TEXTUREn` enum.
    pub fn texture_binding_2d(&self, unit: u32) -> Option<NullHandle> {
        self.state.borrow().unit_bindings.get(&unit).copied()
    }

    pub fn current_program(&self) -> Option<NullHandle> {
        self.state.borrow().current_program
    }

    pub fn bound_vertex_array(&self) -> Option<NullHandle> {
        self.state.borrow().bound_vertex_array
    }

    pub fn enabled_attributes(&self, vertex_array: NullHandle) -> Vec<u32> {
        let state = self.state.borrow();
        let mut enabled: Vec<u32> = state
            .vertex_arrays
            .get(&vertex_array)
            .map(|attributes| attributes.iter().copied().collect())
            .unwrap_or_default();
        enabled.sort_unstable();
        enabled
    }

    pub fn buffer_size(&self, buffer: NullHandle) -> Option<usize> {
        self.state.borrow().buffers.get(&buffer).copied()
    }

    pub fn uniform_i32(&self, program: NullHandle, name: &str) -> Option<i32> {
        let location = NullUniformLocation {
            program,
            name: name.to_string(),
        };
        self.state.borrow().uniform_values.get(&location).copied()
    }

    pub fn draw_calls(&self) -> Vec<NullDrawCall> {
        self.state.borrow().draw_calls.clone()
    }

    pub fn invalid_operations(&self) -> Vec<String> {
        self.state.borrow().invalid_operations.clone()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn textures_created(&self) -> usize {
        self.state.borrow().textures_created
    }

    pub fn programs_created(&self) -> usize {
        self.state.borrow().programs_created
    }

    pub fn vertex_arrays_created(&self) -> usize {
        self.state.borrow().vertex_arrays_created
    }
}

impl GraphicsBackend for NullBackend {
    type Texture = NullHandle;
    type Shader = NullHandle;
    type Program = NullHandle;
    type Buffer = NullHandle;
    type VertexArray = NullHandle;
    type UniformLocation = NullUniformLocation;

    unsafe fn create_texture(&self) -> Result<Self::Texture, String> {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        state.textures.insert(handle, NullTextureInfo::default());
        state.textures_created += 1;
        Ok(handle)
    }

    unsafe fn delete_texture(&self, texture: Self::Texture) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        // Deleting a bound texture reverts every binding of it to zero.
        state.unit_bindings.retain(|_, bound| *bound != texture);
    }

    unsafe fn active_texture(&self, unit: u32) {
        let mut state = self.state.borrow_mut();
        if unit < glow::TEXTURE0 {
            state.invalid(format!("active_texture: {unit:#x} is not a texture unit"));
            return;
        }
        state.active_unit = unit;
    }

    unsafe fn bind_texture_2d(&self, texture: Option<Self::Texture>) {
        let mut state = self.state.borrow_mut();
        let unit = state.active_unit;
        match texture {
            Some(handle) if !state.textures.contains_key(&handle) => {
                state.invalid(format!("bind_texture: {handle:?} is not a texture"));
            }
            Some(handle) => {
                state.unit_bindings.insert(unit, handle);
            }
            None => {
                state.unit_bindings.remove(&unit);
            }
        }
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
        let mut state = self.state.borrow_mut();
        if width < 0 || height < 0 {
            state.invalid(format!("tex_image_2d: negative size {width}x{height}"));
            return;
        }
        if let (Some(pixels), Some(texel)) = (pixels, texel_size(format, ty)) {
            let needed = width as usize * height as usize * texel;
            if pixels.len() < needed {
                state.invalid(format!(
                    "tex_image_2d: {} bytes supplied, {needed} read",
                    pixels.len()
                ));
                return;
            }
        }
        let Some(info) = state.bound_texture_info() else {
            state.invalid("tex_image_2d: no texture bound");
            return;
        };
        info.width = width;
        info.height = height;
        info.internal_format = internal_format;
        info.format = format;
        info.texel_type = ty;
        info.has_data = pixels.is_some();
    }

    unsafe fn tex_parameter_i32(&self, parameter: u32, value: i32) {
        let mut state = self.state.borrow_mut();
        let Some(info) = state.bound_texture_info() else {
            state.invalid("tex_parameter_i32: no texture bound");
            return;
        };
        match parameter {
            glow::TEXTURE_MAG_FILTER => info.mag_filter = value as u32,
            glow::TEXTURE_MIN_FILTER => info.min_filter = value as u32,
            _ => {}
        }
    }

    unsafe fn create_shader(&self, _shader_type: u32) -> Result<Self::Shader, String> {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        state.shaders.insert(
            handle,
            NullShader {
                source: String::new(),
                compiled: false,
                info_log: String::new(),
            },
        );
        Ok(handle)
    }

    unsafe fn shader_source(&self, shader: Self::Shader, source: &str) {
        if let Some(entry) = self.state.borrow_mut().shaders.get_mut(&shader) {
            entry.source = source.to_string();
        }
    }

    unsafe fn compile_shader(&self, shader: Self::Shader) {
        let mut state = self.state.borrow_mut();
        let fail = state.fail_shader_compilation;
        let Some(entry) = state.shaders.get_mut(&shader) else {
            state.invalid(format!("compile_shader: {shader:?} is not a shader"));
            return;
        };
        if fail {
            entry.compiled = false;
            entry.info_log = "0:1(1): error: compilation disabled".to_string();
        } else if entry.source.trim().is_empty() {
            entry.compiled = false;
            entry.info_log = "0:0(0): error: empty source".to_string();
        } else {
            entry.compiled = true;
            entry.info_log.clear();
        }
    }

    unsafe fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        self.state
            .borrow()
            .shaders
            .get(&shader)
            .is_some_and(|entry| entry.compiled)
    }

    unsafe fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        self.state
            .borrow()
            .shaders
            .get(&shader)
            .map(|entry| entry.info_log.clone())
            .unwrap_or_default()
    }

    unsafe fn delete_shader(&self, shader: Self::Shader) {
        self.state.borrow_mut().shaders.remove(&shader);
    }

    unsafe fn create_program(&self) -> Result<Self::Program, String> {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        state.programs.insert(handle, NullProgram::default());
        state.programs_created += 1;
        Ok(handle)
    }

    unsafe fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(entry) = self.state.borrow_mut().programs.get_mut(&program) {
            entry.attached.push(shader);
        }
    }

    unsafe fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        if let Some(entry) = self.state.borrow_mut().programs.get_mut(&program) {
            entry.attached.retain(|attached| *attached != shader);
        }
    }

    unsafe fn link_program(&self, program: Self::Program) {
        let mut state = self.state.borrow_mut();
        let Some(attached) = state.programs.get(&program).map(|p| p.attached.clone()) else {
            state.invalid(format!("link_program: {program:?} is not a program"));
            return;
        };
        let mut linked = !attached.is_empty();
        let mut uniforms = HashSet::new();
        for shader in &attached {
            match state.shaders.get(shader) {
                Some(entry) if entry.compiled => {
                    uniforms.extend(declared_uniforms(&entry.source));
                }
                _ => linked = false,
            }
        }
        if let Some(entry) = state.programs.get_mut(&program) {
            entry.linked = linked;
            entry.info_log = if linked {
                String::new()
            } else {
                "error: attached shaders are missing or not compiled".to_string()
            };
            entry.uniforms = if linked { uniforms } else { HashSet::new() };
        }
    }

    unsafe fn get_program_link_status(&self, program: Self::Program) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program)
            .is_some_and(|entry| entry.linked)
    }

    unsafe fn get_program_info_log(&self, program: Self::Program) -> String {
        self.state
            .borrow()
            .programs
            .get(&program)
            .map(|entry| entry.info_log.clone())
            .unwrap_or_default()
    }

    unsafe fn delete_program(&self, program: Self::Program) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        state.uniform_values.retain(|location, _| location.program != program);
    }

    unsafe fn use_program(&self, program: Option<Self::Program>) {
        let mut state = self.state.borrow_mut();
        match program {
            Some(handle) if !state.programs.get(&handle).is_some_and(|p| p.linked) => {
                state.invalid(format!("use_program: {handle:?} is not a linked program"));
            }
            _ => state.current_program = program,
        }
    }

    unsafe fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        let state = self.state.borrow();
        let entry = state.programs.get(&program)?;
        entry.uniforms.contains(name).then(|| NullUniformLocation {
            program,
            name: name.to_string(),
        })
    }

    unsafe fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32) {
        let Some(location) = location else {
            return;
        };
        let mut state = self.state.borrow_mut();
        if state.current_program != Some(location.program) {
            state.invalid(format!(
                "uniform_1_i32: {} set while its program is not in use",
                location.name
            ));
            return;
        }
        state.uniform_values.insert(location.clone(), x);
    }

    unsafe fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        state.vertex_arrays.insert(handle, HashSet::new());
        state.vertex_arrays_created += 1;
        Ok(handle)
    }

    unsafe fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array);
        if state.bound_vertex_array == Some(vertex_array) {
            state.bound_vertex_array = None;
        }
    }

    unsafe fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        let mut state = self.state.borrow_mut();
        match vertex_array {
            Some(handle) if !state.vertex_arrays.contains_key(&handle) => {
                state.invalid(format!("bind_vertex_array: {handle:?} is not a vertex array"));
            }
            _ => state.bound_vertex_array = vertex_array,
        }
    }

    unsafe fn create_buffer(&self) -> Result<Self::Buffer, String> {
        let mut state = self.state.borrow_mut();
        let handle = state.allocate();
        state.buffers.insert(handle, 0);
        Ok(handle)
    }

    unsafe fn delete_buffer(&self, buffer: Self::Buffer) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer);
        if state.bound_array_buffer == Some(buffer) {
            state.bound_array_buffer = None;
        }
    }

    unsafe fn bind_array_buffer(&self, buffer: Option<Self::Buffer>) {
        let mut state = self.state.borrow_mut();
        match buffer {
            Some(handle) if !state.buffers.contains_key(&handle) => {
                state.invalid(format!("bind_buffer: {handle:?} is not a buffer"));
            }
            _ => state.bound_array_buffer = buffer,
        }
    }

    unsafe fn array_buffer_data_u8_slice(&self, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some(buffer) = state.bound_array_buffer else {
            state.invalid("buffer_data: no array buffer bound");
            return;
        };
        state.buffers.insert(buffer, data.len());
    }

    unsafe fn enable_vertex_attrib_array(&self, index: u32) {
        let mut state = self.state.borrow_mut();
        let Some(vertex_array) = state.bound_vertex_array else {
            state.invalid("enable_vertex_attrib_array: no vertex array bound");
            return;
        };
        if let Some(enabled) = state.vertex_arrays.get_mut(&vertex_array) {
            enabled.insert(index);
        }
    }

    unsafe fn vertex_attrib_pointer_f32(&self, _index: u32, _size: i32, _stride: i32, _offset: i32) {
        let mut state = self.state.borrow_mut();
        if state.bound_vertex_array.is_none() || state.bound_array_buffer.is_none() {
            state.invalid("vertex_attrib_pointer: vertex array or array buffer not bound");
        }
    }

    unsafe fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        let mut state = self.state.borrow_mut();
        if state.current_program.is_none() {
            state.invalid("draw_arrays: no program in use");
            return;
        }
        let call = NullDrawCall {
            mode,
            first,
            count,
            program: state.current_program,
            vertex_array: state.bound_vertex_array,
            unit0_texture: state.unit_bindings.get(&glow::TEXTURE0).copied(),
        };
        state.draw_calls.push(call);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_binding_follows_active_unit() {
        let gl = NullBackend::new();
        let tex = unsafe {
            let tex = gl.create_texture().unwrap();
            gl.active_texture(glow::TEXTURE2);
            gl.bind_texture_2d(Some(tex));
            tex
        };

        assert_eq!(gl.active_texture_unit(), glow::TEXTURE2);
        assert_eq!(gl.texture_binding_2d(glow::TEXTURE2), Some(tex));
        assert_eq!(gl.texture_binding_2d(glow::TEXTURE0), None);
        assert!(gl.invalid_operations().is_empty());
    }

    #[test]
    fn test_tex_image_requires_bound_texture() {
        let gl = NullBackend::new();
        unsafe { gl.tex_image_2d(glow::RGBA as i32, 2, 2, glow::RGBA, glow::UNSIGNED_BYTE, None) };
        assert_eq!(gl.invalid_operations().len(), 1);
    }

    #[test]
    fn test_tex_image_and_parameters_are_recorded() {
        let gl = NullBackend::new();
        let tex = unsafe {
            let tex = gl.create_texture().unwrap();
            gl.bind_texture_2d(Some(tex));
            gl.tex_image_2d(
                glow::RGBA as i32,
                8,
                4,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(&[0u8; 8 * 4 * 4]),
            );
            gl.tex_parameter_i32(glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            tex
        };

        let info = gl.texture_info(tex).unwrap();
        assert_eq!((info.width, info.height), (8, 4));
        assert_eq!(info.mag_filter, glow::NEAREST);
        assert_eq!(info.min_filter, glow::NEAREST_MIPMAP_LINEAR);
        assert!(info.has_data);
    }

    #[test]
    fn test_tex_image_rejects_short_pixel_data() {
        let gl = NullBackend::new();
        let tex = unsafe {
            let tex = gl.create_texture().unwrap();
            gl.bind_texture_2d(Some(tex));
            gl.tex_image_2d(
                glow::RGBA as i32,
                1024,
                1024,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(&[0u8; 4][..]),
            );
            tex
        };

        assert_eq!(gl.invalid_operations().len(), 1);
        let info = gl.texture_info(tex).unwrap();
        assert_eq!((info.width, info.height), (0, 0));
        assert!(!info.has_data);
    }

    #[test]
    fn test_deleting_texture_clears_bindings() {
        let gl = NullBackend::new();
        let tex = unsafe {
            let tex = gl.create_texture().unwrap();
            gl.active_texture(glow::TEXTURE1);
            gl.bind_texture_2d(Some(tex));
            gl.delete_texture(tex);
            tex
        };

        assert!(!gl.is_texture(tex));
        assert_eq!(gl.texture_binding_2d(glow::TEXTURE1), None);
        assert_eq!(gl.live_textures(), 0);
        assert_eq!(gl.textures_created(), 1);
    }

    #[test]
    fn test_link_collects_declared_uniforms() {
        let gl = NullBackend::new();
        unsafe {
            let vs = gl.create_shader(glow::VERTEX_SHADER).unwrap();
            gl.shader_source(vs, "void main() {}\n");
            gl.compile_shader(vs);
            let fs = gl.create_shader(glow::FRAGMENT_SHADER).unwrap();
            gl.shader_source(fs, "uniform sampler2D tex;\nvoid main() {}\n");
            gl.compile_shader(fs);

            let program = gl.create_program().unwrap();
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);

            assert!(gl.get_program_link_status(program));
            assert!(gl.get_uniform_location(program, "tex").is_some());
            assert!(gl.get_uniform_location(program, "other").is_none());
        }
    }

    #[test]
    fn test_uniform_requires_program_in_use() {
        let gl = NullBackend::new();
        let location = NullUniformLocation {
            program: NullHandle(7),
            name: "tex".to_string(),
        };
        unsafe { gl.uniform_1_i32(Some(&location), 0) };
        assert_eq!(gl.uniform_i32(NullHandle(7), "tex"), None);
        assert_eq!(gl.invalid_operations().len(), 1);
    }

    #[test]
    fn test_forced_compile_failure() {
        let gl = NullBackend::new();
        gl.set_fail_shader_compilation(true);
        unsafe {
            let shader = gl.create_shader(glow::VERTEX_SHADER).unwrap();
            gl.shader_source(shader, "void main() {}");
            gl.compile_shader(shader);
            assert!(!gl.get_shader_compile_status(shader));
            assert!(!gl.get_shader_info_log(shader).is_empty());
        }
    }

    #[test]
    fn test_draw_without_program_is_rejected() {
        let gl = NullBackend::new();
        unsafe { gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4) };
        assert!(gl.draw_calls().is_empty());
        assert_eq!(gl.invalid_operations().len(), 1);
    }
}
