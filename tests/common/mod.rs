#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use rainglass::audio::{AudioError, AudioOutput, PlaybackHandle, SoundId};
use rainglass::renderer::SessionDescriptor;
use rainglass::texture::RgbaImage;
use rainglass::uniforms::RainUniforms;
use rainglass::{GraphicsBackend, GraphicsSession, RenderError};

/// What the fake GPU saw. Shared between the backend, its sessions and the test.
#[derive(Debug, Default)]
pub struct GpuLog {
    pub sessions_created: u32,
    pub sessions_released: u32,
    pub draws: u32,
    pub failures_left: u32,
    pub lose_next_draw: bool,
    pub last_intensity: Option<f32>,
}

pub struct FakeBackend {
    pub log: Rc<RefCell<GpuLog>>,
}

impl FakeBackend {
    pub fn new() -> (Self, Rc<RefCell<GpuLog>>) {
        let log = Rc::new(RefCell::new(GpuLog::default()));
        (Self { log: log.clone() }, log)
    }

    /// The first `n` session creations fail with a shader error.
    pub fn failing(n: u32) -> (Self, Rc<RefCell<GpuLog>>) {
        let (backend, log) = Self::new();
        log.borrow_mut().failures_left = n;
        (backend, log)
    }
}

pub struct FakeSession {
    log: Rc<RefCell<GpuLog>>,
}

impl GraphicsBackend for FakeBackend {
    type Session = FakeSession;

    fn create_session(&mut self, _desc: &SessionDescriptor) -> Result<FakeSession, RenderError> {
        let mut log = self.log.borrow_mut();
        if log.failures_left > 0 {
            log.failures_left -= 1;
            return Err(RenderError::ShaderCompile("fake compile error".into()));
        }
        log.sessions_created += 1;
        Ok(FakeSession { log: self.log.clone() })
    }
}

impl GraphicsSession for FakeSession {
    fn resize(&mut self, _width: u32, _height: u32) {}

    fn upload_background(&mut self, _image: &RgbaImage) -> Result<(), RenderError> {
        Ok(())
    }

    fn upload_reflection(&mut self, _image: &RgbaImage) -> Result<(), RenderError> {
        Ok(())
    }

    fn upload_puddle_mask(&mut self, _image: &RgbaImage) -> Result<(), RenderError> {
        Ok(())
    }

    fn draw(&mut self, uniforms: &RainUniforms) -> Result<(), RenderError> {
        let mut log = self.log.borrow_mut();
        if log.lose_next_draw {
            log.lose_next_draw = false;
            return Err(RenderError::ContextLost);
        }
        log.draws += 1;
        log.last_intensity = Some(uniforms.intensity);
        Ok(())
    }

    fn release(self) {
        self.log.borrow_mut().sessions_released += 1;
    }
}

#[derive(Debug, Default)]
pub struct AudioLog {
    pub loops: Vec<SoundId>,
    pub loops_stopped: u32,
    pub claps: u32,
    pub gain: f32,
}

pub struct FakeAudio {
    pub log: Rc<RefCell<AudioLog>>,
}

impl FakeAudio {
    pub fn new() -> (Self, Rc<RefCell<AudioLog>>) {
        let log = Rc::new(RefCell::new(AudioLog::default()));
        (Self { log: log.clone() }, log)
    }
}

struct FakeLoop {
    log: Rc<RefCell<AudioLog>>,
}

impl PlaybackHandle for FakeLoop {
    fn set_volume(&mut self, gain: f32) {
        self.log.borrow_mut().gain = gain;
    }

    fn stop(&mut self) {
        self.log.borrow_mut().loops_stopped += 1;
    }
}

impl AudioOutput for FakeAudio {
    fn play_loop(&mut self, sound: SoundId, gain: f32) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        let mut log = self.log.borrow_mut();
        log.loops.push(sound);
        log.gain = gain;
        Ok(Box::new(FakeLoop { log: self.log.clone() }))
    }

    fn play_once(&mut self, _sound: SoundId, _gain: f32) -> Result<(), AudioError> {
        self.log.borrow_mut().claps += 1;
        Ok(())
    }

    fn thunder_count(&self) -> usize {
        3
    }
}

/// Handles a test keeps after moving the fakes into a host.
pub struct FakeLogs {
    pub gpu: Rc<RefCell<GpuLog>>,
    pub sound: Rc<RefCell<AudioLog>>,
}
