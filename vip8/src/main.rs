use std::{io, path::PathBuf, process, thread};

use clap::Parser;
use pixels::{Pixels, SurfaceTexture};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::ParseError, EnvFilter};
use vip8_base::{
    key::{Key, KeyState},
    processor::{Processor, ProcessorBuilderError, Quirks},
    runner::{ControlEvent, MachineEvent, Runner, RunnerConfig, RunnerError, RunnerHandle},
    screen::Screen,
};
use winit::{
    dpi::{LogicalPosition, LogicalSize, PhysicalSize},
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use crate::tone::Beeper;

mod tone;

/// RGBA color of a set pixel
const COLOR_PIXEL_ON: [u8; 4] = [220, 220, 220, 0xFF];
/// RGBA color of an unset pixel
const COLOR_PIXEL_OFF: [u8; 4] = [22, 22, 22, 0xFF];

#[derive(Debug, Error)]
pub enum AppError {
    #[error("could not read the ROM file {path:?}")]
    ReadRom {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Program(#[from] ProcessorBuilderError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("invalid log filter directive")]
    LogFilter(#[from] ParseError),
    #[error("could not create the window")]
    Window(#[from] winit::error::OsError),
    #[error("could not set up the pixel buffer")]
    Pixels(#[from] pixels::Error),
    #[error("could not spawn the event forwarder thread")]
    Forwarder(#[source] io::Error),
    #[cfg(feature = "sound")]
    #[error("could not open an audio output stream")]
    AudioStream(#[from] rodio::StreamError),
    #[cfg(feature = "sound")]
    #[error("could not set up audio playback")]
    AudioPlay(#[from] rodio::PlayError),
}

/// Map the left four columns of a QWERTY keyboard onto the hex keypad.
///
/// ```text
/// 1 2 3 4    1 2 3 C
/// Q W E R    4 5 6 D
/// A S D F    7 8 9 E
/// Z X C V    A 0 B F
/// ```
fn keypad_key(virtual_keycode: VirtualKeyCode) -> Option<Key> {
    use VirtualKeyCode::*;

    let key = match virtual_keycode {
        Key1 => Key::K1,
        Key2 => Key::K2,
        Key3 => Key::K3,
        Key4 => Key::KC,
        Q => Key::K4,
        W => Key::K5,
        E => Key::K6,
        R => Key::KD,
        A => Key::K7,
        S => Key::K8,
        D => Key::K9,
        F => Key::KE,
        Z => Key::KA,
        X => Key::K0,
        C => Key::KB,
        V => Key::KF,
        _ => return None,
    };
    Some(key)
}

fn key_state(state: ElementState) -> KeyState {
    match state {
        ElementState::Pressed => KeyState::Pressed,
        ElementState::Released => KeyState::NotPressed,
    }
}

#[derive(Debug, Parser)]
#[clap(version, about)]
struct CliOpts {
    /// The path to the file containing the ROM.
    /// The file's contents will be loaded into the machine's memory,
    /// starting at address 0x200.
    rom_file: PathBuf,
    /// Instructions executed per second.
    #[clap(long, default_value_t = RunnerConfig::DEFAULT_INSTRUCTIONS_PER_SECOND)]
    rate: f64,
    /// Log every executed instruction at debug level.
    #[clap(short, long)]
    trace: bool,
    /// 8XY6/8XYE shift VY into VX instead of shifting VX in place.
    #[clap(long)]
    quirk_shift_vy: bool,
    /// FX55/FX65 increment I past the last register transferred.
    #[clap(long)]
    quirk_load_store_increment: bool,
    /// FX55/FX65 transfer only V0 through VX.
    #[clap(long)]
    quirk_load_store_up_to_x: bool,
    /// BNNN jumps to NNN + V0.
    #[clap(long)]
    quirk_jump_v0: bool,
    /// Skip 0NNN machine subroutine calls instead of stopping with an error.
    #[clap(long)]
    skip_machine_subroutines: bool,
}

impl CliOpts {
    fn quirks(&self) -> Quirks {
        Quirks {
            shift_copies_vy: self.quirk_shift_vy,
            load_store_increments_i: self.quirk_load_store_increment,
            load_store_up_to_x: self.quirk_load_store_up_to_x,
            jump_offset_uses_v0: self.quirk_jump_v0,
        }
    }
}

fn init_logging(trace: bool) -> Result<(), AppError> {
    let mut filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new("info"),
    };
    if trace {
        filter = filter.add_directive("vip8_base::processor=debug".parse()?);
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn main() {
    let cli_opts = CliOpts::parse();

    if let Err(error) = run(cli_opts) {
        error!(%error, "vip8 failed to start");
        eprintln!("error: {}", error);
        process::exit(1);
    }
}

fn run(cli_opts: CliOpts) -> Result<(), AppError> {
    init_logging(cli_opts.trace)?;

    let program = std::fs::read(&cli_opts.rom_file).map_err(|source| AppError::ReadRom {
        path: cli_opts.rom_file.clone(),
        source,
    })?;
    info!(rom_file = ?cli_opts.rom_file, len = program.len(), "ROM loaded");

    let mut builder = Processor::builder()
        .program(&program)?
        .quirks(cli_opts.quirks())
        .trace_instructions(cli_opts.trace);
    if cli_opts.skip_machine_subroutines {
        builder = builder.skip_call_machine_subroutine();
    }
    let processor = builder.build();

    let event_loop = EventLoop::<MachineEvent>::with_user_event();
    let (window, size) = create_window(
        &event_loop,
        "vip8",
        PhysicalSize::new(Screen::WIDTH as u32, Screen::HEIGHT as u32),
    )?;
    let surface_texture = SurfaceTexture::new(size.width, size.height, &window);
    let mut pixels = Pixels::new(
        Screen::WIDTH as u32,
        Screen::HEIGHT as u32,
        surface_texture,
    )?;
    let mut beeper = Beeper::new()?;

    let mut screen = *processor.screen();
    let machine = Runner::start(
        processor,
        RunnerConfig {
            instructions_per_second: cli_opts.rate,
        },
    )?;
    let controls = machine.controls;
    let mut handle = Some(machine.handle);

    let event_loop_proxy = event_loop.create_proxy();
    let events = machine.events;
    thread::Builder::new()
        .name("machine event forwarder".to_owned())
        .spawn(move || {
            forward_events(&events, |event| event_loop_proxy.send_event(event).is_ok())
        })
        .map_err(AppError::Forwarder)?;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::Resized(size) => pixels.resize_surface(size.width, size.height),
                WindowEvent::CloseRequested => {
                    info!("window closed, exiting...");
                    let _ = controls.send(ControlEvent::Quit);
                    *control_flow = ControlFlow::Exit;
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state,
                            virtual_keycode: Some(virtual_keycode),
                            ..
                        },
                    ..
                } => {
                    if virtual_keycode == VirtualKeyCode::Escape && state == ElementState::Pressed
                    {
                        info!("escape key pressed, exiting...");
                        let _ = controls.send(ControlEvent::Quit);
                        *control_flow = ControlFlow::Exit;
                    } else if let Some(key) = keypad_key(virtual_keycode) {
                        debug!(?key, ?state, "keypad key changed");
                        let control_event = ControlEvent::KeyStateChange {
                            key,
                            new_state: key_state(state),
                        };
                        if controls.send(control_event).is_err() {
                            *control_flow = ControlFlow::Exit;
                        }
                    }
                }
                _ => (),
            },
            Event::UserEvent(MachineEvent::ScreenUpdate { new_screen }) => {
                screen = new_screen;
                window.request_redraw();
            }
            Event::UserEvent(MachineEvent::Tone(tone)) => beeper.set(tone),
            Event::UserEvent(MachineEvent::WaitForKeyPress) => debug!("waiting for a key press"),
            Event::UserEvent(MachineEvent::ErrorEncountered { error }) => {
                error!(%error, "the machine stopped");
                *control_flow = ControlFlow::Exit;
            }
            Event::UserEvent(MachineEvent::Stopped) => *control_flow = ControlFlow::Exit,
            Event::RedrawRequested(_) => {
                draw_screen(&screen, pixels.get_frame());
                if let Err(error) = pixels.render() {
                    error!(%error, "pixels failed to draw pixel buffer to surface texture");
                    *control_flow = ControlFlow::Exit;
                }
            }
            Event::LoopDestroyed => {
                beeper.silence();
                if let Some(handle) = handle.take() {
                    shut_down(handle);
                }
            }
            _ => (),
        }
    });
}

/// Hand machine events to `forward` until it refuses one.
///
/// When the machine side hangs up without announcing it,
/// a final [`MachineEvent::Stopped`] is forwarded so the window closes too.
fn forward_events(
    events: &flume::Receiver<MachineEvent>,
    mut forward: impl FnMut(MachineEvent) -> bool,
) {
    let mut stop_announced = false;
    for event in events.iter() {
        stop_announced = event == MachineEvent::Stopped;
        if !forward(event) {
            // event loop closed
            return;
        }
    }
    if !stop_announced {
        warn!("machine event channel closed unexpectedly");
        forward(MachineEvent::Stopped);
    }
}

/// Stop the machine, exiting with an error code if a fatal error stopped it.
fn shut_down(handle: RunnerHandle) {
    match handle.stop() {
        Ok(()) => info!("machine stopped"),
        Err(error) => {
            warn!(%error, "error occurred running the CHIP-8 ROM");
            process::exit(1);
        }
    }
}

fn draw_screen(screen: &Screen, frame: &mut [u8]) {
    for (frame_pixel, pixel_on) in frame.chunks_exact_mut(4).zip(screen.pixels()) {
        frame_pixel.copy_from_slice(if pixel_on {
            &COLOR_PIXEL_ON
        } else {
            &COLOR_PIXEL_OFF
        });
    }
}

/// Create a hidden window, size it to an integer multiple of the pixel buffer
/// that fills about two thirds of the monitor, center it and show it.
///
/// Returns the window and its physical inner size.
fn create_window<T>(
    event_loop: &EventLoop<T>,
    title: &str,
    pixel_buffer_size: PhysicalSize<u32>,
) -> Result<(Window, PhysicalSize<u32>), winit::error::OsError> {
    let buffer_size: PhysicalSize<f64> = pixel_buffer_size.cast();

    let window = WindowBuilder::new()
        .with_visible(false)
        .with_title(title)
        .build(event_loop)?;

    let scale_factor = window.scale_factor();
    let monitor_size: LogicalSize<f64> = match window.current_monitor() {
        Some(monitor) => monitor.size().to_logical(scale_factor),
        None => LogicalSize::new(buffer_size.width, buffer_size.height),
    };

    let scale = (monitor_size.width / buffer_size.width)
        .min(monitor_size.height / buffer_size.height)
        * 2.0
        / 3.0;
    let scale = scale.round().max(1.0);

    let inner_size = LogicalSize::new(buffer_size.width * scale, buffer_size.height * scale);
    let centered = LogicalPosition::new(
        (monitor_size.width - inner_size.width) / 2.0,
        (monitor_size.height - inner_size.height) / 2.0,
    );

    window.set_min_inner_size(Some(buffer_size.to_logical::<f64>(scale_factor)));
    window.set_inner_size(inner_size);
    window.set_outer_position(centered);
    window.set_visible(true);

    let physical_size = inner_size.to_physical::<f64>(scale_factor);
    Ok((
        window,
        PhysicalSize::new(
            physical_size.width.round() as u32,
            physical_size.height.round() as u32,
        ),
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keymap_covers_keypad() {
        use VirtualKeyCode::*;

        let mut keys: Vec<Key> = [
            Key1, Key2, Key3, Key4, Q, W, E, R, A, S, D, F, Z, X, C, V,
        ]
        .iter()
        .filter_map(|&code| keypad_key(code))
        .collect();
        keys.sort_by_key(|&key| key as u8);
        keys.dedup();

        assert_eq!(keys, Key::ALL.to_vec());
        assert_eq!(keypad_key(Escape), None);
    }

    #[test]
    fn cli_quirks() {
        let cli_opts =
            CliOpts::parse_from(&["vip8", "--quirk-shift-vy", "--quirk-jump-v0", "rom.ch8"]);
        assert_eq!(
            cli_opts.quirks(),
            Quirks {
                shift_copies_vy: true,
                jump_offset_uses_v0: true,
                ..Quirks::default()
            }
        );
        assert_eq!(cli_opts.rate, 60.0);
        assert_eq!(cli_opts.rom_file, PathBuf::from("rom.ch8"));
    }

    #[test]
    fn forwarder_announces_silent_stop() {
        let (event_sender, event_receiver) = flume::bounded(4);
        event_sender.send(MachineEvent::WaitForKeyPress).unwrap();
        drop(event_sender);

        let mut forwarded = Vec::new();
        forward_events(&event_receiver, |event| {
            forwarded.push(event);
            true
        });

        assert_eq!(
            forwarded,
            vec![MachineEvent::WaitForKeyPress, MachineEvent::Stopped]
        );
    }

    #[test]
    fn forwarder_passes_announced_stop_once() {
        let (event_sender, event_receiver) = flume::bounded(4);
        event_sender.send(MachineEvent::Stopped).unwrap();
        drop(event_sender);

        let mut forwarded = Vec::new();
        forward_events(&event_receiver, |event| {
            forwarded.push(event);
            true
        });

        assert_eq!(forwarded, vec![MachineEvent::Stopped]);
    }

    #[test]
    fn screen_to_frame() {
        let mut screen = Screen::default();
        screen.draw_sprite(1, 0, &[0x80]);
        let mut frame = vec![0; Screen::WIDTH as usize * Screen::HEIGHT as usize * 4];

        draw_screen(&screen, &mut frame);

        assert_eq!(&frame[0..4], &COLOR_PIXEL_OFF);
        assert_eq!(&frame[4..8], &COLOR_PIXEL_ON);
    }
}
