//! The delay and sound timers and the driver decaying them at 60 Hz.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use spin_sleep::LoopHelper;
use tracing::{debug, instrument, trace};

use crate::runner::{MachineEvent, Shutdown};

/// Whether the tone should sound during a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    On,
    Off,
}

#[derive(Default)]
struct TimerRegisters {
    delay: AtomicU8,
    sound: AtomicU8,
}

/// Handle to the two 8-bit countdown timers.
///
/// Clones share the same timers: the processor sets and reads them,
/// the [`TimerDriver`] counts them down.
#[derive(Clone, Default)]
pub struct Timers(Arc<TimerRegisters>);

impl Timers {
    pub fn delay(&self) -> u8 {
        self.0.delay.load(Ordering::Acquire)
    }

    pub fn set_delay(&self, val: u8) {
        self.0.delay.store(val, Ordering::Release);
    }

    pub fn sound(&self) -> u8 {
        self.0.sound.load(Ordering::Acquire)
    }

    pub fn set_sound(&self, val: u8) {
        self.0.sound.store(val, Ordering::Release);
    }

    /// Count both timers down by one, stopping at zero.
    ///
    /// The tone is on for this tick if the sound timer was non-zero.
    pub fn tick(&self) -> Tone {
        decrement_to_zero(&self.0.delay);
        if decrement_to_zero(&self.0.sound) > 0 {
            Tone::On
        } else {
            Tone::Off
        }
    }
}

/// Returns the value before decrementing.
fn decrement_to_zero(counter: &AtomicU8) -> u8 {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |val| val.checked_sub(1))
        .unwrap_or_else(|val| val)
}

impl PartialEq for Timers {
    fn eq(&self, other: &Self) -> bool {
        self.delay() == other.delay() && self.sound() == other.sound()
    }
}

impl Eq for Timers {}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("delay", &self.delay())
            .field("sound", &self.sound())
            .finish()
    }
}

/// Decays the timers at a fixed rate, independent of the instruction rate,
/// and forwards the tone signal to the frontend.
pub struct TimerDriver {
    timers: Timers,
    tone_on: bool,
}

impl TimerDriver {
    /// Ticks per second.
    pub const TICK_RATE: f64 = 60.0;

    pub fn new(timers: Timers) -> Self {
        Self {
            timers,
            tone_on: false,
        }
    }

    /// Run one tick. Returns the tone signal to forward, if any:
    /// [`Tone::On`] for every tick with the sound timer running,
    /// [`Tone::Off`] once when it ran out.
    pub fn tick(&mut self) -> Option<Tone> {
        let tone = self.timers.tick();
        let was_on = std::mem::replace(&mut self.tone_on, tone == Tone::On);
        match tone {
            Tone::On => Some(Tone::On),
            Tone::Off if was_on => Some(Tone::Off),
            Tone::Off => None,
        }
    }

    /// Tick on a separate thread until `shutdown` is triggered.
    pub fn spawn(
        self,
        events: flume::Sender<MachineEvent>,
        shutdown: Shutdown,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("timer driver".to_owned())
            .spawn(move || self.run(events, shutdown))
    }

    #[instrument(name = "timer_driver", skip(self, events, shutdown))]
    fn run(mut self, events: flume::Sender<MachineEvent>, shutdown: Shutdown) {
        let mut loop_helper = LoopHelper::builder().build_with_target_rate(Self::TICK_RATE);

        while !shutdown.is_triggered() {
            loop_helper.loop_start();

            if let Some(tone) = self.tick() {
                trace!(?tone, "tone signal");
                // Nobody listening for the tone is not a reason to stop counting down.
                MachineEvent::Tone(tone).publish(&events);
            }

            loop_helper.loop_sleep();
        }

        if self.tone_on {
            MachineEvent::Tone(Tone::Off).publish(&events);
        }
        debug!("timer driver stopped");
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn tick_stops_at_zero() {
        let timers = Timers::default();
        timers.set_delay(2);
        timers.set_sound(1);

        assert_eq!(timers.tick(), Tone::On);
        assert_eq!((timers.delay(), timers.sound()), (1, 0));
        assert_eq!(timers.tick(), Tone::Off);
        assert_eq!((timers.delay(), timers.sound()), (0, 0));
        assert_eq!(timers.tick(), Tone::Off);
        assert_eq!((timers.delay(), timers.sound()), (0, 0));
    }

    #[test]
    fn clones_share_state() {
        let timers = Timers::default();
        let driver_timers = timers.clone();
        timers.set_delay(5);
        driver_timers.tick();
        assert_eq!(timers.delay(), 4);
    }

    #[test]
    fn driver_tone_signals() {
        let timers = Timers::default();
        let mut driver = TimerDriver::new(timers.clone());

        assert_eq!(driver.tick(), None);

        timers.set_sound(2);
        assert_eq!(driver.tick(), Some(Tone::On));
        assert_eq!(driver.tick(), Some(Tone::On));
        assert_eq!(driver.tick(), Some(Tone::Off));
        assert_eq!(driver.tick(), None);
    }

    #[test]
    fn spawned_driver_decays_and_stops() {
        let timers = Timers::default();
        timers.set_delay(u8::MAX);
        let shutdown = Shutdown::default();
        let (event_sender, _event_receiver) = flume::bounded(MachineEvent::CHANNEL_CAPACITY);

        let handle = TimerDriver::new(timers.clone())
            .spawn(event_sender, shutdown.clone())
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));
        shutdown.trigger();
        handle.join().unwrap();

        let delay_after_stop = timers.delay();
        assert!(delay_after_stop < u8::MAX);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(timers.delay(), delay_after_stop);
    }

    #[test]
    fn undrained_tone_signals_do_not_pile_up() {
        let timers = Timers::default();
        timers.set_sound(u8::MAX);
        let shutdown = Shutdown::default();
        let (event_sender, event_receiver) = flume::bounded(MachineEvent::CHANNEL_CAPACITY);

        let handle = TimerDriver::new(timers)
            .spawn(event_sender, shutdown.clone())
            .unwrap();
        // More ticks than fit into the channel.
        std::thread::sleep(Duration::from_millis(1500));
        shutdown.trigger();
        handle.join().unwrap();

        assert!(event_receiver.len() <= MachineEvent::CHANNEL_CAPACITY);
        assert!(event_receiver
            .try_iter()
            .all(|event| matches!(event, MachineEvent::Tone(_))));
    }
}
