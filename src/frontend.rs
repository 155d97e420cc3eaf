use crate::draw::{self, Scene};
use crate::game::{HEIGHT, WIDTH};
use crate::sprite::Sprites;
use anyhow::Context;
use pixels::{Pixels, SurfaceTexture};
use std::time::{Duration, Instant};
use winit::dpi::LogicalSize;
use winit::event::VirtualKeyCode;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::{Window, WindowBuilder};
use winit_input_helper::WinitInputHelper;

/// Where frames go and where the quit signal comes from.
pub trait Frontend {
    /// Pumps pending input. True once the player asked to quit.
    fn quit_requested(&mut self) -> bool;
    /// Blocks until the next frame is due.
    fn wait_frame(&mut self);
    fn present(&mut self, sprites: &Sprites, scene: &Scene<'_>) -> anyhow::Result<()>;
}

/// Trains as fast as the CPU allows; nothing is drawn.
pub struct Headless;

impl Frontend for Headless {
    fn quit_requested(&mut self) -> bool {
        false
    }

    fn wait_frame(&mut self) {}

    fn present(&mut self, _: &Sprites, _: &Scene<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sleeps away whatever is left of the frame budget.
pub struct FramePacer {
    frame: Duration,
    last: Instant,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self { frame: Duration::from_secs(1) / fps.max(1), last: Instant::now() }
    }

    pub fn tick(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.frame {
            std::thread::sleep(self.frame - elapsed);
        }
        self.last = Instant::now();
    }
}

pub struct WindowFrontend {
    // pixels must drop before the window it renders into, which is only
    // held to keep the surface alive
    pixels: Pixels,
    _window: Window,
    event_loop: EventLoop<()>,
    input: WinitInputHelper,
    pacer: FramePacer,
}

impl WindowFrontend {
    pub fn new(fps: u32) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_title("AI Flappy Bird")
            .with_inner_size(LogicalSize::new(WIDTH, HEIGHT))
            .with_resizable(false)
            .build(&event_loop)
            .context("failed to create window")?;

        let pixels = {
            let window_size = window.inner_size();
            let surface_texture = SurfaceTexture::new(window_size.width, window_size.height, &window);
            Pixels::new(WIDTH, HEIGHT, surface_texture).context("failed to create pixel surface")?
        };

        Ok(Self { pixels, _window: window, event_loop, input: WinitInputHelper::new(), pacer: FramePacer::new(fps) })
    }
}

impl Frontend for WindowFrontend {
    fn quit_requested(&mut self) -> bool {
        let Self { event_loop, input, .. } = self;
        let mut quit = false;
        event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Poll;
            if input.update(&event) {
                if input.key_pressed(VirtualKeyCode::Escape) || input.close_requested() || input.destroyed() {
                    quit = true;
                }
                *control_flow = ControlFlow::Exit;
            }
        });
        quit
    }

    fn wait_frame(&mut self) {
        self.pacer.tick();
    }

    fn present(&mut self, sprites: &Sprites, scene: &Scene<'_>) -> anyhow::Result<()> {
        draw::draw_scene(self.pixels.frame_mut(), sprites, scene);
        self.pixels.render().context("failed to render frame")?;
        Ok(())
    }
}
