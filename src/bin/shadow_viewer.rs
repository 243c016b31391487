// src/bin/shadow_viewer.rs
// Demo binary: renders the comparison scene with the technique chosen on
// the command line, either into a window or headless into a PNG.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use shadowlab::demo::build_demo_scene;
use shadowlab::{
    BlitPass, ForwardRenderer, GpuContext, Material, RendererConfig, ShadowSettings,
    ShadowTechnique,
};

struct Args {
    technique: ShadowTechnique,
    width: u32,
    height: u32,
    blur_radius: u32,
    specular_weight: f32,
    snapshot: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            technique: ShadowTechnique::Standard,
            width: 1280,
            height: 720,
            blur_radius: 4,
            specular_weight: 0.0,
            snapshot: None,
        }
    }
}

const USAGE: &str = "shadow_viewer [options]
  --technique <standard|pcf|variance>   shadow technique (default standard)
  --blur-radius <n>                     variance blur kernel radius (default 4)
  --specular <weight>                   Blinn-Phong specular weight (default 0)
  --width <px> / --height <px>          window or snapshot size
  --snapshot <file.png>                 render one frame headless and exit";

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--technique" => {
                let value = iter.next().context("--technique needs a value")?;
                args.technique = ShadowTechnique::from_name(&value)
                    .ok_or_else(|| anyhow!("unknown technique '{value}'"))?;
            }
            "--blur-radius" => {
                args.blur_radius = iter
                    .next()
                    .context("--blur-radius needs a value")?
                    .parse()
                    .context("--blur-radius expects an integer")?;
            }
            "--specular" => {
                args.specular_weight = iter
                    .next()
                    .context("--specular needs a value")?
                    .parse()
                    .context("--specular expects a number")?;
            }
            "--width" => {
                args.width = iter
                    .next()
                    .context("--width needs a value")?
                    .parse()
                    .context("--width expects an integer")?;
            }
            "--height" => {
                args.height = iter
                    .next()
                    .context("--height needs a value")?
                    .parse()
                    .context("--height expects an integer")?;
            }
            "--snapshot" => {
                args.snapshot = Some(PathBuf::from(
                    iter.next().context("--snapshot needs a path")?,
                ));
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    Ok(args)
}

fn renderer_config(args: &Args) -> RendererConfig {
    RendererConfig {
        width: args.width,
        height: args.height,
        shadow: ShadowSettings {
            technique: args.technique,
            blur_radius: args.blur_radius,
            specular_weight: args.specular_weight,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;
    log::info!("shadow technique: {}", args.technique.name());

    match args.snapshot.clone() {
        Some(path) => run_snapshot(&args, &path),
        None => run_windowed(args),
    }
}

fn run_snapshot(args: &Args, path: &std::path::Path) -> Result<()> {
    let ctx = GpuContext::new()?;

    let material_layout = Material::bind_group_layout(&ctx);
    let mut scene = build_demo_scene(&ctx, &material_layout, args.width as f32 / args.height as f32)?;
    let renderer = ForwardRenderer::new(
        &ctx,
        renderer_config(args),
        scene.bind_group_layout(),
        material_layout,
    )?;

    scene.update(&ctx);
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("snapshot_encoder"),
        });
    renderer.render(&ctx, &mut encoder, &scene)?;
    ctx.queue.submit(Some(encoder.finish()));

    let pixels = renderer.read_back_rgba(&ctx)?;
    image::save_buffer(path, &pixels, args.width, args.height, image::ColorType::Rgba8)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn run_windowed(args: Args) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(format!("shadowlab - {}", args.technique.name()))
            .with_inner_size(LogicalSize::new(args.width as f64, args.height as f64))
            .build(&event_loop)?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let surface = instance.create_surface(Arc::clone(&window))?;
    let ctx = pollster::block_on(GpuContext::request(&instance, Some(&surface)))?;

    let surface_caps = surface.get_capabilities(&ctx.adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(surface_caps.formats[0]);
    let size = window.inner_size();
    let mut surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&ctx.device, &surface_config);

    let material_layout = Material::bind_group_layout(&ctx);
    let mut scene = build_demo_scene(
        &ctx,
        &material_layout,
        surface_config.width as f32 / surface_config.height as f32,
    )?;
    let mut renderer = ForwardRenderer::new(
        &ctx,
        renderer_config(&args),
        scene.bind_group_layout(),
        material_layout,
    )?;
    let blit = BlitPass::new(&ctx, surface_format)?;

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::KeyboardInput {
                event: key_event, ..
            } => {
                if key_event.state == ElementState::Pressed {
                    if let PhysicalKey::Code(KeyCode::Escape) = key_event.physical_key {
                        elwt.exit();
                    }
                }
            }
            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    surface_config.width = new_size.width;
                    surface_config.height = new_size.height;
                    surface.configure(&ctx.device, &surface_config);
                    renderer.resize(&ctx, new_size.width, new_size.height);
                    scene
                        .camera
                        .set_aspect(new_size.width as f32 / new_size.height as f32);
                }
            }
            WindowEvent::RedrawRequested => {
                scene.update(&ctx);

                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        surface.configure(&ctx.device, &surface_config);
                        return;
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("surface out of memory");
                        elwt.exit();
                        return;
                    }
                    Err(e) => {
                        log::warn!("dropped frame: {e:?}");
                        return;
                    }
                };
                let frame_view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());

                let mut encoder =
                    ctx.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("frame_encoder"),
                        });

                match renderer
                    .render(&ctx, &mut encoder, &scene)
                    .and_then(|()| renderer.color_view())
                {
                    Ok(color_view) => {
                        blit.draw(&ctx, &mut encoder, color_view, &frame_view);
                        ctx.queue.submit(Some(encoder.finish()));
                        frame.present();
                    }
                    Err(e) => {
                        log::error!("render failed: {e}");
                        elwt.exit();
                    }
                }
            }
            _ => {}
        },
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}
