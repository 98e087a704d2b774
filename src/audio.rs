//! Sound output behind a small trait so the ambience logic can run without a device.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::configuration::SoundConfig;
use crate::presets::RainSound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundId {
    Rain(RainSound),
    /// Index into the configured thunder samples.
    Thunder(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    DeviceUnavailable(String),
    MissingSound(SoundId),
    Io(String),
    Decode(String),
    Playback(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::DeviceUnavailable(msg) => write!(f, "No audio device: {}", msg),
            AudioError::MissingSound(id) => write!(f, "No file configured for {:?}", id),
            AudioError::Io(msg) => write!(f, "Could not open sound: {}", msg),
            AudioError::Decode(msg) => write!(f, "Could not decode sound: {}", msg),
            AudioError::Playback(msg) => write!(f, "Playback failed: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::Io(err.to_string())
    }
}

impl From<rodio::decoder::DecoderError> for AudioError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        AudioError::Decode(err.to_string())
    }
}

impl From<rodio::PlayError> for AudioError {
    fn from(err: rodio::PlayError) -> Self {
        AudioError::Playback(err.to_string())
    }
}

/// A sound that keeps playing until stopped.
pub trait PlaybackHandle {
    /// Linear gain, 1.0 is unity.
    fn set_volume(&mut self, gain: f32);
    fn stop(&mut self);
}

pub trait AudioOutput {
    fn play_loop(&mut self, sound: SoundId, gain: f32) -> Result<Box<dyn PlaybackHandle>, AudioError>;
    /// Fire and forget.
    fn play_once(&mut self, sound: SoundId, gain: f32) -> Result<(), AudioError>;
    /// How many thunder samples `SoundId::Thunder` can index.
    fn thunder_count(&self) -> usize;
}

/// rodio-backed output. Without a device every call fails softly with `DeviceUnavailable`.
pub struct RodioOutput {
    _stream: Option<OutputStream>,
    stream_handle: Option<OutputStreamHandle>,
    sounds: SoundConfig,
}

impl RodioOutput {
    pub fn new(sounds: SoundConfig) -> Self {
        let (stream, handle) = match OutputStream::try_default() {
            Ok((s, h)) => (Some(s), Some(h)),
            Err(e) => {
                log::warn!("Audio output unavailable, rain will be silent: {}", e);
                (None, None)
            }
        };
        Self { _stream: stream, stream_handle: handle, sounds }
    }

    fn path_for(&self, sound: SoundId) -> Result<PathBuf, AudioError> {
        let file = match sound {
            SoundId::Rain(RainSound::Soft) => Some(&self.sounds.rain_soft),
            SoundId::Rain(RainSound::Heavy) => Some(&self.sounds.rain_heavy),
            SoundId::Rain(RainSound::Downpour) => Some(&self.sounds.rain_downpour),
            SoundId::Thunder(i) => self.sounds.thunder.get(i),
        };
        file.map(|f| self.sounds.directory.join(f))
            .ok_or(AudioError::MissingSound(sound))
    }

    fn open(&self, sound: SoundId, gain: f32) -> Result<(Sink, Decoder<BufReader<File>>), AudioError> {
        let handle = self
            .stream_handle
            .as_ref()
            .ok_or_else(|| AudioError::DeviceUnavailable("no output stream".to_string()))?;
        let file = File::open(self.path_for(sound)?)?;
        let decoder = Decoder::new(BufReader::new(file))?;
        let sink = Sink::try_new(handle)?;
        sink.set_volume(gain);
        Ok((sink, decoder))
    }
}

struct RodioPlayback {
    sink: Sink,
}

impl PlaybackHandle for RodioPlayback {
    fn set_volume(&mut self, gain: f32) {
        self.sink.set_volume(gain);
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}

impl AudioOutput for RodioOutput {
    fn play_loop(&mut self, sound: SoundId, gain: f32) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        let (sink, decoder) = self.open(sound, gain)?;
        sink.append(decoder.repeat_infinite());
        Ok(Box::new(RodioPlayback { sink }))
    }

    fn play_once(&mut self, sound: SoundId, gain: f32) -> Result<(), AudioError> {
        let (sink, decoder) = self.open(sound, gain)?;
        sink.append(decoder);
        sink.detach();
        Ok(())
    }

    fn thunder_count(&self) -> usize {
        self.sounds.thunder.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sound_paths_resolve_against_directory() {
        let output = RodioOutput { _stream: None, stream_handle: None, sounds: SoundConfig::default() };
        assert_eq!(
            output.path_for(SoundId::Rain(RainSound::Heavy)).unwrap(),
            PathBuf::from("assets/sounds/rain_heavy.ogg")
        );
        assert_eq!(output.path_for(SoundId::Thunder(4)).unwrap(), PathBuf::from("assets/sounds/thunder5.ogg"));
        assert_eq!(output.path_for(SoundId::Thunder(5)), Err(AudioError::MissingSound(SoundId::Thunder(5))));
    }

    #[test]
    fn no_device_fails_softly() {
        let mut output = RodioOutput { _stream: None, stream_handle: None, sounds: SoundConfig::default() };
        assert!(matches!(
            output.play_once(SoundId::Thunder(0), 1.0),
            Err(AudioError::DeviceUnavailable(_))
        ));
        assert_eq!(output.thunder_count(), 5);
    }
}
