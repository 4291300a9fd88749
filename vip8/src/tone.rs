use tracing::trace;
use vip8_base::timer::Tone;

/// Turns the tone signals of the timer driver into audible output.
///
/// Without the `sound` feature the tone is only traced.
pub struct Beeper {
    #[cfg(feature = "sound")]
    output: audio::Output,
    sounding: bool,
}

impl Beeper {
    /// Pitch of the beep in Hz.
    pub const FREQUENCY: f32 = 440.0;

    #[cfg(feature = "sound")]
    pub fn new() -> Result<Self, crate::AppError> {
        Ok(Self {
            output: audio::Output::open(Self::FREQUENCY)?,
            sounding: false,
        })
    }

    #[cfg(not(feature = "sound"))]
    pub fn new() -> Result<Self, crate::AppError> {
        Ok(Self { sounding: false })
    }

    pub fn set(&mut self, tone: Tone) {
        let sounding = tone == Tone::On;
        if sounding == self.sounding {
            return;
        }
        self.sounding = sounding;
        trace!(?tone, "beeper switched");

        #[cfg(feature = "sound")]
        self.output.set_playing(sounding);
    }

    pub fn silence(&mut self) {
        self.set(Tone::Off);
    }
}

#[cfg(feature = "sound")]
mod audio {
    use std::time::Duration;

    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

    use crate::AppError;

    pub struct Output {
        // Dropping the stream stops all playback.
        _stream: OutputStream,
        _stream_handle: OutputStreamHandle,
        sink: Sink,
    }

    impl Output {
        pub fn open(frequency: f32) -> Result<Self, AppError> {
            let (stream, stream_handle) = OutputStream::try_default()?;
            let sink = Sink::try_new(&stream_handle)?;
            sink.set_volume(0.25);
            sink.pause();
            sink.append(SquareWave::new(frequency));

            Ok(Self {
                _stream: stream,
                _stream_handle: stream_handle,
                sink,
            })
        }

        pub fn set_playing(&self, playing: bool) {
            if playing {
                self.sink.play();
            } else {
                self.sink.pause();
            }
        }
    }

    /// An endless square wave, mono at 44.1kHz.
    #[derive(Clone, Debug)]
    pub struct SquareWave {
        samples_per_half_period: f32,
        sample: u64,
    }

    impl SquareWave {
        const SAMPLE_RATE: u32 = 44_100;

        pub fn new(frequency: f32) -> Self {
            Self {
                samples_per_half_period: Self::SAMPLE_RATE as f32 / frequency / 2.0,
                sample: 0,
            }
        }
    }

    impl Iterator for SquareWave {
        type Item = f32;

        fn next(&mut self) -> Option<f32> {
            let half_period = (self.sample as f32 / self.samples_per_half_period) as u64;
            self.sample = self.sample.wrapping_add(1);

            Some(if half_period % 2 == 0 { 1.0 } else { -1.0 })
        }
    }

    impl Source for SquareWave {
        fn current_frame_len(&self) -> Option<usize> {
            None
        }

        fn channels(&self) -> u16 {
            1
        }

        fn sample_rate(&self) -> u32 {
            Self::SAMPLE_RATE
        }

        fn total_duration(&self) -> Option<Duration> {
            None
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn square_wave_alternates() {
            // 4 samples per period
            let wave = SquareWave::new(SquareWave::SAMPLE_RATE as f32 / 4.0);
            let samples: Vec<f32> = wave.take(8).collect();
            assert_eq!(samples, [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0]);
        }
    }
}
