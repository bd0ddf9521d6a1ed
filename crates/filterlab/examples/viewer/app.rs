//! Application event handler for the filter viewer

use super::overlay::{KeyboardDrawer, OverlayAction};
use filterlab::backend::WgpuDevice;
use filterlab::device::{Extent, SharedDevice};
use filterlab::presets::{SamplePreset, create_sample};
use filterlab::{FilterSample, SampleContext, SampleOptions, assets::ImageAssetSource, shaders::FsShaderLoader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

type BoxError = Box<dyn std::error::Error>;

/// Startup configuration taken from the command line
#[derive(Debug)]
pub struct ViewerOptions {
    pub preset: SamplePreset,
    pub shader_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub sample: SampleOptions,
}

/// A window, the device presenting into it and the sample drawn there
struct ViewerContext {
    window: Arc<Window>,
    sample: Box<dyn FilterSample>,
}

/// Viewer application driven by the winit event loop
pub struct ViewerApp {
    options: ViewerOptions,
    context: Option<ViewerContext>,
    drawer: KeyboardDrawer,
    /// Print the overlay text after the next frame
    print_overlay: bool,
    last_frame: Instant,
    /// First fatal error; the event loop exits when it is set
    error: Option<BoxError>,
}

impl ViewerApp {
    pub fn new(options: ViewerOptions) -> Self {
        Self {
            options,
            context: None,
            drawer: KeyboardDrawer::default(),
            print_overlay: false,
            last_frame: Instant::now(),
            error: None,
        }
    }

    /// Consumes the app and returns the error that stopped it, if any
    pub fn into_error(self) -> Option<BoxError> {
        self.error
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<ViewerContext, BoxError> {
        let attributes = Window::default_attributes()
            .with_title(format!("filterlab - {}", self.options.preset))
            .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let size = window.inner_size();
        let device: SharedDevice = Arc::new(WgpuDevice::windowed(window.clone(), Extent::new(size.width, size.height))?);
        let context = SampleContext {
            device,
            shaders: Box::new(FsShaderLoader::new(&self.options.shader_dir)),
            assets: Box::new(ImageAssetSource::new(&self.options.asset_dir)),
        };

        let mut sample = create_sample(self.options.preset, context)?;
        if !sample.prepare(&self.options.sample)? {
            tracing::warn!("Window is empty, waiting for a resize");
        }
        window.request_redraw();
        Ok(ViewerContext { window, sample })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: BoxError) {
        tracing::error!("{error}");
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<(), BoxError> {
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };
        let delta_time = self.last_frame.elapsed().as_secs_f32();
        self.last_frame = Instant::now();

        if context.sample.is_prepared() {
            self.drawer.begin_pass();
            context.sample.on_update_ui_overlay(&mut self.drawer)?;
            self.drawer.end_pass();

            context.window.pre_present_notify();
            context.sample.render(delta_time)?;

            if std::mem::take(&mut self.print_overlay) {
                println!();
                for line in self.drawer.lines() {
                    println!("{line}");
                }
            }
        }
        context.window.request_redraw();
        Ok(())
    }

    fn print_shortcuts(&self) {
        println!();
        println!("Keyboard shortcuts:");
        println!("  - Esc: Quit");
        println!("  - 1-9: Select kernel size");
        println!("  - Tab: Next strategy");
        println!("  - S: Next sampler");
        println!("  - Up/Down, PageUp/PageDown: Change draw count by 1 or 16");
        println!("  - =/-: Change the first parameter");
        println!("  - ]/[: Change the second parameter");
        println!("  - T: Print the overlay (selection, parameters and frame times)");
        println!();
    }
}

fn action_for(key: KeyCode) -> Option<OverlayAction> {
    let action = match key {
        KeyCode::Digit1 => OverlayAction::Kernel(0),
        KeyCode::Digit2 => OverlayAction::Kernel(1),
        KeyCode::Digit3 => OverlayAction::Kernel(2),
        KeyCode::Digit4 => OverlayAction::Kernel(3),
        KeyCode::Digit5 => OverlayAction::Kernel(4),
        KeyCode::Digit6 => OverlayAction::Kernel(5),
        KeyCode::Digit7 => OverlayAction::Kernel(6),
        KeyCode::Digit8 => OverlayAction::Kernel(7),
        KeyCode::Digit9 => OverlayAction::Kernel(8),
        KeyCode::Tab => OverlayAction::NextStrategy,
        KeyCode::KeyS => OverlayAction::NextSampler,
        KeyCode::ArrowUp => OverlayAction::DrawCount(1),
        KeyCode::ArrowDown => OverlayAction::DrawCount(-1),
        KeyCode::PageUp => OverlayAction::DrawCount(16),
        KeyCode::PageDown => OverlayAction::DrawCount(-16),
        KeyCode::Equal => OverlayAction::Parameter { index: 0, steps: 1.0 },
        KeyCode::Minus => OverlayAction::Parameter { index: 0, steps: -1.0 },
        KeyCode::BracketRight => OverlayAction::Parameter { index: 1, steps: 1.0 },
        KeyCode::BracketLeft => OverlayAction::Parameter { index: 1, steps: -1.0 },
        _ => return None,
    };
    Some(action)
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(context) => {
                self.context = Some(context);
                self.print_shortcuts();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    ..
                },
                ..
            }
            | WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(KeyCode::KeyT),
                    ..
                },
                ..
            } => {
                self.print_overlay = true;
            }

            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(keycode),
                    ..
                },
                ..
            } => {
                if let Some(action) = action_for(keycode) {
                    self.drawer.queue(action);
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::Resized(size) => {
                let resized = self.context.as_mut().map(|context| context.sample.resize(size.width, size.height));
                if let Some(Err(e)) = resized {
                    self.fail(event_loop, e.into());
                }
            }

            _ => {}
        }
    }
}
