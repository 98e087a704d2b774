//! Rain renderer: owns the graphics session and drives the frame loop.
//!
//! The graphics API sits behind [`GraphicsBackend`] / [`GraphicsSession`] so
//! the lifecycle (setup, cleanup, context loss, retry backoff) is independent
//! of wgpu. A session is all-or-nothing: it is created whole and released
//! whole, and a lost session is never patched up, only replaced.

use std::fmt;

use crate::background::BackgroundSource;
use crate::scheduler::{FrameId, Scheduler, TimerId};
use crate::state::{NoticeLevel, SharedState};
use crate::texture::{blur_downsample, puddle_mask, RgbaImage, PUDDLE_MASK_SIZE, REFLECTION_BLUR_RADIUS, REFLECTION_DOWNSAMPLE};
use crate::uniforms::RainUniforms;

/// Failed setups or losses tolerated before the effect turns itself off.
pub const MAX_RETRIES: u32 = 3;
/// First retry delay; each further retry doubles it.
pub const RETRY_BASE_DELAY_MS: f64 = 2_000.0;
const PUDDLE_SEED: u32 = 1337;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// No adapter, device or surface could be obtained.
    ContextUnavailable(String),
    /// Shader module or pipeline creation failed validation.
    ShaderCompile(String),
    /// The device or surface went away; every resource of the session is gone.
    ContextLost,
    /// A single frame could not be acquired; the session is still usable.
    Surface(String),
    Upload(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderError::ContextUnavailable(msg) => write!(f, "Graphics context unavailable: {}", msg),
            RenderError::ShaderCompile(msg) => write!(f, "Rain shader failed to build: {}", msg),
            RenderError::ContextLost => write!(f, "Graphics context lost"),
            RenderError::Surface(msg) => write!(f, "Surface error: {}", msg),
            RenderError::Upload(msg) => write!(f, "Texture upload failed: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub width: u32,
    pub height: u32,
}

/// Creates graphics sessions. One backend outlives many sessions.
pub trait GraphicsBackend {
    type Session: GraphicsSession;

    fn create_session(&mut self, desc: &SessionDescriptor) -> Result<Self::Session, RenderError>;
}

/// Surface, device, pipeline and textures, created together.
pub trait GraphicsSession {
    fn resize(&mut self, width: u32, height: u32);
    fn upload_background(&mut self, image: &RgbaImage) -> Result<(), RenderError>;
    fn upload_reflection(&mut self, image: &RgbaImage) -> Result<(), RenderError>;
    fn upload_puddle_mask(&mut self, image: &RgbaImage) -> Result<(), RenderError>;
    fn draw(&mut self, uniforms: &RainUniforms) -> Result<(), RenderError>;
    /// Frees every GPU resource the session holds.
    fn release(self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// Nothing was presented this frame; the loop keeps going unless the context was lost.
    Skipped,
    Lost,
}

pub struct RainRenderer<B: GraphicsBackend> {
    shared: SharedState,
    backend: B,
    session: Option<B::Session>,
    background: Option<Box<dyn BackgroundSource>>,
    puddle_mask: RgbaImage,
    size: (u32, u32),
    session_start_ms: f64,
    uploaded_version: Option<u64>,
    frame: Option<FrameId>,
    retry_timer: Option<TimerId>,
    retry_count: u32,
    context_lost: bool,
    frames_drawn: u64,
}

impl<B: GraphicsBackend> RainRenderer<B> {
    pub fn new(shared: SharedState, backend: B, background: Option<Box<dyn BackgroundSource>>, size: (u32, u32)) -> Self {
        Self {
            shared,
            backend,
            session: None,
            background,
            puddle_mask: puddle_mask(PUDDLE_MASK_SIZE, PUDDLE_SEED),
            size,
            session_start_ms: 0.0,
            uploaded_version: None,
            frame: None,
            retry_timer: None,
            retry_count: 0,
            context_lost: false,
            frames_drawn: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some() && !self.context_lost && self.frame.is_some()
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_timer.is_some()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Brings up a session and starts the frame loop.
    ///
    /// Does nothing when a live session already exists. Otherwise any leftover
    /// session is torn down first. Failures are logged, reported once as a
    /// notice and retried with backoff; this never returns an error.
    pub fn setup(&mut self, sched: &mut Scheduler) -> bool {
        if !self.shared.borrow().settings.show_background {
            log::info!("Rain renderer disabled in settings, skipping setup");
            return false;
        }
        if self.session.is_some() && !self.context_lost {
            return true;
        }

        self.cleanup(sched);

        match self.create_session() {
            Ok(session) => {
                self.session = Some(session);
                self.session_start_ms = sched.now();
                self.retry_count = 0;
                self.frame = Some(sched.request_frame());
                log::info!("Rain renderer ready at {}x{}", self.size.0, self.size.1);
                true
            }
            Err(e) => {
                log::error!("Rain renderer setup failed: {}", e);
                self.schedule_retry(sched, true);
                false
            }
        }
    }

    fn create_session(&mut self) -> Result<B::Session, RenderError> {
        let desc = SessionDescriptor { width: self.size.0.max(1), height: self.size.1.max(1) };
        let mut session = self.backend.create_session(&desc)?;
        if let Err(e) = session.upload_puddle_mask(&self.puddle_mask) {
            session.release();
            return Err(e);
        }
        Ok(session)
    }

    /// Cancels the frame loop and any pending retry, then releases the session.
    /// Safe to call with nothing set up.
    pub fn cleanup(&mut self, sched: &mut Scheduler) {
        if let Some(id) = self.frame.take() {
            sched.cancel_frame(id);
        }
        if let Some(id) = self.retry_timer.take() {
            sched.clear_timer(id);
        }
        if let Some(session) = self.session.take() {
            session.release();
            log::debug!("Rain renderer session released");
        }
        self.uploaded_version = None;
        self.context_lost = false;
    }

    /// Full teardown and fresh setup with cleared retry counters.
    pub fn reset(&mut self, sched: &mut Scheduler) -> bool {
        self.cleanup(sched);
        self.retry_count = 0;
        self.setup(sched)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        if let Some(session) = self.session.as_mut() {
            session.resize(width, height);
        }
    }

    fn schedule_retry(&mut self, sched: &mut Scheduler, visible: bool) {
        if self.retry_count >= MAX_RETRIES {
            log::error!("Rain renderer gave up after {} retries", MAX_RETRIES);
            let mut state = self.shared.borrow_mut();
            state.settings.show_background = false;
            state.notify(NoticeLevel::Error, "Rain effect turned off: graphics are unavailable.");
            return;
        }

        if visible && self.retry_count == 0 {
            self.shared
                .borrow_mut()
                .notify(NoticeLevel::Error, "Rain effect could not start, retrying.");
        }

        let delay = RETRY_BASE_DELAY_MS * 2f64.powi(self.retry_count as i32);
        self.retry_count += 1;
        self.retry_timer = Some(sched.set_timeout(delay));
        log::warn!("Rain renderer retry {} of {} in {} ms", self.retry_count, MAX_RETRIES, delay);
    }

    /// The device or surface is gone. Stops drawing immediately and schedules a rebuild.
    pub fn handle_context_lost(&mut self, sched: &mut Scheduler) {
        if self.context_lost {
            return;
        }
        self.context_lost = true;
        if let Some(id) = self.frame.take() {
            sched.cancel_frame(id);
        }
        if let Some(session) = self.session.take() {
            session.release();
        }
        self.uploaded_version = None;
        log::warn!("Rain renderer lost its graphics context");

        if self.shared.borrow().settings.show_background {
            self.schedule_retry(sched, false);
        }
    }

    /// The platform says the context can be recreated.
    pub fn handle_context_restored(&mut self, sched: &mut Scheduler) {
        self.retry_count = 0;
        if !self.context_lost {
            return;
        }
        if let Some(id) = self.retry_timer.take() {
            sched.clear_timer(id);
        }
        log::info!("Rain renderer context restored");
        self.setup(sched);
    }

    pub fn on_timer(&mut self, id: TimerId, sched: &mut Scheduler) -> bool {
        if self.retry_timer != Some(id) {
            return false;
        }
        self.retry_timer = None;
        if self.shared.borrow().settings.show_background {
            self.setup(sched);
        }
        true
    }

    /// Draws one frame if `id` is ours. `None` means the id belongs to someone else.
    pub fn on_frame(&mut self, id: FrameId, sched: &mut Scheduler) -> Option<FrameOutcome> {
        if self.frame != Some(id) {
            return None;
        }
        self.frame = None;
        if self.context_lost || self.session.is_none() {
            return Some(FrameOutcome::Skipped);
        }

        let now = sched.now();
        let result = self.refresh_background(now).and_then(|_| self.draw(now));

        match result {
            Ok(()) => {
                self.frames_drawn += 1;
                self.frame = Some(sched.request_frame());
                Some(FrameOutcome::Drawn)
            }
            Err(RenderError::ContextLost) => {
                self.handle_context_lost(sched);
                Some(FrameOutcome::Lost)
            }
            Err(e) => {
                log::warn!("Rain frame skipped: {}", e);
                self.frame = Some(sched.request_frame());
                Some(FrameOutcome::Skipped)
            }
        }
    }

    fn draw(&mut self, now: f64) -> Result<(), RenderError> {
        let time_s = ((now - self.session_start_ms) / 1000.0) as f32;
        let uniforms = RainUniforms::from_state(&self.shared.borrow(), time_s, self.size);
        match self.session.as_mut() {
            Some(session) => session.draw(&uniforms),
            None => Ok(()),
        }
    }

    /// Re-uploads the background only when its content changed; a static
    /// source is uploaded once per session.
    fn refresh_background(&mut self, now: f64) -> Result<(), RenderError> {
        let Some(source) = self.background.as_mut() else {
            return Ok(());
        };
        if source.is_static() && self.uploaded_version.is_some() {
            return Ok(());
        }
        if source.current_frame(now).is_none() {
            return Ok(());
        }
        let version = source.content_version();
        if self.uploaded_version == Some(version) {
            return Ok(());
        }

        if let (Some(frame), Some(session)) = (source.current_frame(now), self.session.as_mut()) {
            session.upload_background(frame)?;
            session.upload_reflection(&blur_downsample(frame, REFLECTION_DOWNSAMPLE, REFLECTION_BLUR_RADIUS))?;
            self.uploaded_version = Some(version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::StaticBackground;
    use crate::configuration::Settings;
    use crate::state::EffectState;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        created: u32,
        released: u32,
        draws: u32,
        backgrounds: u32,
    }

    struct FakeBackend {
        log: Rc<RefCell<Log>>,
        fail_next: u32,
    }

    struct FakeSession {
        log: Rc<RefCell<Log>>,
    }

    impl GraphicsBackend for FakeBackend {
        type Session = FakeSession;

        fn create_session(&mut self, _desc: &SessionDescriptor) -> Result<FakeSession, RenderError> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(RenderError::ShaderCompile("bad".into()));
            }
            self.log.borrow_mut().created += 1;
            Ok(FakeSession { log: self.log.clone() })
        }
    }

    impl GraphicsSession for FakeSession {
        fn resize(&mut self, _width: u32, _height: u32) {}
        fn upload_background(&mut self, _image: &RgbaImage) -> Result<(), RenderError> {
            self.log.borrow_mut().backgrounds += 1;
            Ok(())
        }
        fn upload_reflection(&mut self, _image: &RgbaImage) -> Result<(), RenderError> {
            Ok(())
        }
        fn upload_puddle_mask(&mut self, _image: &RgbaImage) -> Result<(), RenderError> {
            Ok(())
        }
        fn draw(&mut self, _uniforms: &RainUniforms) -> Result<(), RenderError> {
            self.log.borrow_mut().draws += 1;
            Ok(())
        }
        fn release(self) {
            self.log.borrow_mut().released += 1;
        }
    }

    fn renderer(fail_next: u32) -> (RainRenderer<FakeBackend>, Rc<RefCell<Log>>, SharedState) {
        let log = Rc::new(RefCell::new(Log::default()));
        let shared = EffectState::shared(Settings::default());
        let background: Box<dyn BackgroundSource> = Box::new(StaticBackground::new(RgbaImage::solid(4, 4, [1, 2, 3, 255])));
        let backend = FakeBackend { log: log.clone(), fail_next };
        (RainRenderer::new(shared.clone(), backend, Some(background), (64, 32)), log, shared)
    }

    fn pump_frames(renderer: &mut RainRenderer<FakeBackend>, sched: &mut Scheduler) {
        for id in sched.take_frames() {
            renderer.on_frame(id, sched);
        }
    }

    #[test]
    fn static_background_uploads_once() {
        let (mut renderer, log, _) = renderer(0);
        let mut sched = Scheduler::new(0.0);
        assert!(renderer.setup(&mut sched));
        for _ in 0..5 {
            pump_frames(&mut renderer, &mut sched);
        }
        assert_eq!(log.borrow().draws, 5);
        assert_eq!(log.borrow().backgrounds, 1);
    }

    #[test]
    fn disabled_feature_skips_setup() {
        let (mut renderer, log, shared) = renderer(0);
        shared.borrow_mut().settings.show_background = false;
        let mut sched = Scheduler::new(0.0);
        assert!(!renderer.setup(&mut sched));
        assert_eq!(log.borrow().created, 0);
        assert!(sched.is_idle());
    }

    #[test]
    fn failed_setup_retries_with_doubling_delay_then_gives_up() {
        let (mut renderer, log, shared) = renderer(10);
        let mut sched = Scheduler::new(0.0);
        assert!(!renderer.setup(&mut sched));
        assert_eq!(sched.next_deadline(), Some(2_000.0));
        assert_eq!(shared.borrow_mut().take_notices().len(), 1);

        let mut now = 0.0;
        for expected in [4_000.0, 8_000.0] {
            now = sched.next_deadline().unwrap();
            for id in sched.advance_to(now) {
                renderer.on_timer(id, &mut sched);
            }
            assert_eq!(sched.next_deadline(), Some(now + expected));
        }

        now = sched.next_deadline().unwrap();
        for id in sched.advance_to(now) {
            renderer.on_timer(id, &mut sched);
        }
        assert!(sched.is_idle());
        assert_eq!(log.borrow().created, 0);
        let state = shared.borrow();
        assert!(!state.settings.show_background);
    }

    #[test]
    fn resize_keeps_session() {
        let (mut renderer, log, _) = renderer(0);
        let mut sched = Scheduler::new(0.0);
        renderer.setup(&mut sched);
        renderer.resize(1920, 1080);
        renderer.resize(0, 10);
        assert_eq!(renderer.size(), (1920, 1080));
        assert_eq!(log.borrow().created, 1);
    }

    #[test]
    fn reset_replaces_session() {
        let (mut renderer, log, _) = renderer(0);
        let mut sched = Scheduler::new(0.0);
        renderer.setup(&mut sched);
        renderer.reset(&mut sched);
        assert_eq!(log.borrow().created, 2);
        assert_eq!(log.borrow().released, 1);
        assert_eq!(sched.pending_frames(), 1);
    }
}
