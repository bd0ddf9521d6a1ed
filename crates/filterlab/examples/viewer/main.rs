//! Interactive filter viewer
//!
//! Opens a window showing one filter sample. The overlay is driven from the
//! keyboard and its text is printed to the terminal on request.
//!
//! # Usage
//! ```bash
//! cargo run --example viewer -- gaussian_filter --strategy linear --kernel 2
//! ```

/// Window and event handling
#[cfg(native)]
mod app;

/// Keyboard-driven overlay input
#[cfg(native)]
mod overlay;

#[cfg(native)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use crate::app::{ViewerApp, ViewerOptions};
    use clap::Parser;
    use filterlab::presets::{ASSET_DIR, SHADER_DIR, SamplePreset};
    use filterlab::strategy::Strategy;
    use filterlab::SampleOptions;
    use std::path::PathBuf;
    use winit::event_loop::{ControlFlow, EventLoop};

    /// Command-line arguments for the viewer
    #[derive(Parser)]
    #[command(version, about, long_about = None)]
    struct Args {
        /// Sample to show (bilateral_filter, gaussian_filter or taa_stats)
        #[arg(default_value = "gaussian_filter")]
        preset: SamplePreset,

        /// Texture path relative to the asset directory, replacing the sample's
        #[arg(long)]
        texture: Option<String>,

        /// Directory the WGSL shaders are loaded from
        #[arg(long, default_value = SHADER_DIR)]
        shader_dir: PathBuf,

        /// Directory textures are loaded from
        #[arg(long, default_value = ASSET_DIR)]
        asset_dir: PathBuf,

        /// Initial window width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Initial window height
        #[arg(long, default_value_t = 720)]
        height: u32,

        /// Initial strategy
        #[arg(long, short)]
        strategy: Option<Strategy>,

        /// Initial kernel index (0 is 3x3)
        #[arg(long, short)]
        kernel: Option<usize>,

        /// Log per-frame work
        #[arg(long, short)]
        verbose: bool,
    }

    let args = Args::parse();

    let level = if args.verbose { tracing::Level::TRACE } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!("Starting viewer for {}", args.preset);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(ViewerOptions {
        preset: args.preset,
        shader_dir: args.shader_dir,
        asset_dir: args.asset_dir,
        width: args.width,
        height: args.height,
        sample: SampleOptions {
            strategy: args.strategy,
            kernel: args.kernel,
            texture: args.texture,
        },
    });
    event_loop.run_app(&mut app)?;

    match app.into_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(not(native))]
fn main() {
    println!("The viewer needs a native window system");
}
