//! Drives a [`Processor`] at a configurable instruction rate,
//! next to the [`TimerDriver`] and a frontend's render/input loop.
//!
//! All three activities share one [`Shutdown`] token.
//! The first one to stop, for whatever reason, triggers it
//! and the others stop on their next iteration.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use flume::TryRecvError;
use spin_sleep::LoopHelper;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::{
    key::{Key, KeyState},
    processor::{Processor, ProcessorError},
    screen::Screen,
    timer::{TimerDriver, Tone},
};

/// Cooperative cancellation token shared by all activities of a running machine.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// Request every activity to stop. Idempotent.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sent by the frontend to the running machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    KeyStateChange { key: Key, new_state: KeyState },
    Quit,
}

/// Sent by the running machine to the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// A copy of the screen, taken after an instruction changed it.
    ScreenUpdate { new_screen: Screen },
    /// Tone signal of the timer driver, see [`TimerDriver::tick`].
    Tone(Tone),
    /// The program started waiting for a key press.
    WaitForKeyPress,
    /// A fatal error stopped the machine. Followed by [`MachineEvent::Stopped`].
    ErrorEncountered { error: ProcessorError },
    /// The processor stopped stepping.
    Stopped,
}

impl MachineEvent {
    /// Capacity of the event channel. Past it, frequent events are dropped
    /// instead of queueing up behind a frontend that stopped draining.
    pub const CHANNEL_CAPACITY: usize = 64;

    /// How long a state change event waits for room in a full channel.
    const SEND_TIMEOUT: Duration = Duration::from_secs(1);

    /// Superseded by the next event of the same kind, so losing one is harmless.
    fn is_superseded_by_next(&self) -> bool {
        matches!(self, Self::ScreenUpdate { .. } | Self::Tone(Tone::On))
    }

    /// Send this event without blocking the sending activity for long.
    pub(crate) fn publish(self, events: &flume::Sender<MachineEvent>) {
        if self.is_superseded_by_next() {
            let _ = events.try_send(self);
        } else {
            let _ = events.send_timeout(self, Self::SEND_TIMEOUT);
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error("the instruction rate must be a positive number of instructions per second with a representable period, got {0}")]
    InvalidInstructionRate(f64),
    #[error("could not spawn the {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("the {0} thread panicked")]
    Panicked(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    pub instructions_per_second: f64,
}

impl RunnerConfig {
    pub const DEFAULT_INSTRUCTIONS_PER_SECOND: f64 = 60.0;

    /// The rate must be positive and its period must fit a [`Duration`].
    fn validate(&self) -> Result<(), RunnerError> {
        let rate = self.instructions_per_second;
        let period_fits = rate.is_finite()
            && rate > 0.0
            && Duration::try_from_secs_f64(1.0 / rate).is_ok();
        if period_fits {
            Ok(())
        } else {
            Err(RunnerError::InvalidInstructionRate(rate))
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            instructions_per_second: Self::DEFAULT_INSTRUCTIONS_PER_SECOND,
        }
    }
}

/// The frontend's side of a running machine.
pub struct RunningMachine {
    /// Key state changes and quit requests.
    /// Dropping every sender stops the machine as well.
    pub controls: flume::Sender<ControlEvent>,
    /// Screen snapshots, tone signals and the reason for stopping.
    pub events: flume::Receiver<MachineEvent>,
    pub handle: RunnerHandle,
}

/// Joins the threads of a running machine.
pub struct RunnerHandle {
    shutdown: Shutdown,
    processor_thread: JoinHandle<Result<(), ProcessorError>>,
    timer_thread: JoinHandle<()>,
}

impl RunnerHandle {
    /// The token shared by all activities, e.g. for the render/input loop to observe.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Wait for the machine to stop on its own, returning the fatal error that stopped it, if any.
    pub fn join(self) -> Result<(), RunnerError> {
        let processor_result = self
            .processor_thread
            .join()
            .map_err(|_| RunnerError::Panicked("processor"));
        // The processor thread always triggers shutdown when leaving, even by panic.
        self.shutdown.trigger();
        self.timer_thread
            .join()
            .map_err(|_| RunnerError::Panicked("timer driver"))?;

        Ok(processor_result??)
    }

    /// Stop the machine and wait for it.
    pub fn stop(self) -> Result<(), RunnerError> {
        self.shutdown.trigger();
        self.join()
    }
}

/// Triggers the shutdown and announces [`MachineEvent::Stopped`] when dropped,
/// so both also happen when the processor thread unwinds.
struct StopOnDrop {
    shutdown: Shutdown,
    events: flume::Sender<MachineEvent>,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.shutdown.trigger();
        MachineEvent::Stopped.publish(&self.events);
        debug!("processor stopped");
    }
}

pub struct Runner;

impl Runner {
    /// Start stepping `processor` and decaying its timers, each on its own thread.
    pub fn start(processor: Processor, config: RunnerConfig) -> Result<RunningMachine, RunnerError> {
        config.validate()?;

        let shutdown = Shutdown::default();
        let (control_sender, control_receiver) = flume::unbounded();
        let (event_sender, event_receiver) = flume::bounded(MachineEvent::CHANNEL_CAPACITY);

        let timer_thread = TimerDriver::new(processor.timers().clone())
            .spawn(event_sender.clone(), shutdown.clone())
            .map_err(|source| RunnerError::Spawn {
                name: "timer driver",
                source,
            })?;

        let processor_shutdown = shutdown.clone();
        let processor_thread = thread::Builder::new()
            .name("processor".to_owned())
            .spawn(move || {
                run_processor(
                    processor,
                    config,
                    control_receiver,
                    event_sender,
                    processor_shutdown,
                )
            });
        let processor_thread = match processor_thread {
            Ok(processor_thread) => processor_thread,
            Err(source) => {
                shutdown.trigger();
                let _ = timer_thread.join();
                return Err(RunnerError::Spawn {
                    name: "processor",
                    source,
                });
            }
        };

        info!(
            instructions_per_second = config.instructions_per_second,
            "machine started"
        );

        Ok(RunningMachine {
            controls: control_sender,
            events: event_receiver,
            handle: RunnerHandle {
                shutdown,
                processor_thread,
                timer_thread,
            },
        })
    }
}

#[instrument(name = "processor", skip(processor, controls, events, shutdown))]
fn run_processor(
    mut processor: Processor,
    config: RunnerConfig,
    controls: flume::Receiver<ControlEvent>,
    events: flume::Sender<MachineEvent>,
    shutdown: Shutdown,
) -> Result<(), ProcessorError> {
    let _stop_on_drop = StopOnDrop {
        shutdown: shutdown.clone(),
        events: events.clone(),
    };
    let mut loop_helper =
        LoopHelper::builder().build_with_target_rate(config.instructions_per_second);
    let mut was_waiting_for_key = false;

    'stepping: loop {
        loop_helper.loop_start();

        loop {
            match controls.try_recv() {
                Ok(ControlEvent::KeyStateChange { key, new_state }) => {
                    debug!(?key, ?new_state, "key state changed");
                    processor.set_key_state(key, new_state);
                }
                Ok(ControlEvent::Quit) => {
                    info!("quit requested");
                    shutdown.trigger();
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("control event senders dropped");
                    shutdown.trigger();
                    break;
                }
            }
        }

        if shutdown.is_triggered() {
            break 'stepping Ok(());
        }

        match processor.step() {
            Ok(outcome) => {
                if outcome.screen_changed {
                    MachineEvent::ScreenUpdate {
                        new_screen: *processor.screen(),
                    }
                    .publish(&events);
                }
                if outcome.waiting_for_key && !was_waiting_for_key {
                    MachineEvent::WaitForKeyPress.publish(&events);
                }
                was_waiting_for_key = outcome.waiting_for_key;
            }
            Err(error) => {
                // Stop the other activities before anyone gets to see the error.
                shutdown.trigger();
                error!(%error, "fatal error running the program");
                error!("machine state at the time of the error:\n{}", processor.dump());
                MachineEvent::ErrorEncountered {
                    error: error.clone(),
                }
                .publish(&events);
                break 'stepping Err(error);
            }
        }

        loop_helper.loop_sleep();
    }
}
