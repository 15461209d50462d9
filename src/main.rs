// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use gl_texture::{Texture, TextureSettings};
use glow::HasContext;
use log::{error, info};

fn create_sdl2_context() -> Result<
    (
        glow::Context,
        sdl2::video::Window,
        sdl2::EventPump,
        sdl2::video::GLContext,
    ),
    String,
> {
    let sdl = sdl2::init()?;
    let video = sdl.video()?;
    let gl_attr = video.gl_attr();
    gl_attr.set_context_profile(sdl2::video::GLProfile::Core);
    gl_attr.set_context_version(3, 3);
    gl_attr.set_context_flags().forward_compatible().set();
    let window = video
        .window("texview", 1024, 768)
        .opengl()
        .resizable()
        .build()
        .map_err(|e| e.to_string())?;
    let gl_context = window.gl_create_context()?;
    window.gl_make_current(&gl_context)?;
    let gl = unsafe {
        glow::Context::from_loader_function(|s| video.gl_get_proc_address(s) as *const _)
    };
    let event_loop = sdl.event_pump()?;

    Ok((gl, window, event_loop, gl_context))
}

fn run(image_path: &Path, settings: TextureSettings) -> Result<(), String> {
    let (gl, window, mut events_loop, _context) = create_sdl2_context()?;
    let gl = Rc::new(gl);
    unsafe {
        info!("OpenGL Version: {}", gl.get_parameter_string(glow::VERSION));
    }

    let mut texture = Texture::with_settings(gl.clone(), settings);
    texture
        .create_with_default_filters(image_path)
        .map_err(|e| e.to_string())?;
    info!(
        "Loaded {:?} ({}x{})",
        image_path,
        texture.width(),
        texture.height()
    );

    let target_frame = Duration::from_millis(16); // ~60 FPS max
    'render: loop {
        let frame_start = Instant::now();
        for event in events_loop.poll_iter() {
            if let sdl2::event::Event::Quit { .. } = event {
                break 'render;
            }
        }

        let (width, height) = window.drawable_size();
        unsafe {
            gl.viewport(0, 0, width as i32, height as i32);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);
        }
        texture.render_full_screen().map_err(|e| e.to_string())?;
        window.gl_swap_window();

        let frame_time = frame_start.elapsed();
        if frame_time < target_frame {
            sleep(target_frame - frame_time);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(image_path) = args.next() else {
        eprintln!("usage: texview <image> [settings.toml]");
        return ExitCode::FAILURE;
    };

    let settings = match args.next() {
        Some(path) => match TextureSettings::load_from_file(Path::new(&path)) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to load settings from {}: {}. Using defaults.", path, e);
                TextureSettings::default()
            }
        },
        None => TextureSettings::default(),
    };

    match run(Path::new(&image_path), settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
