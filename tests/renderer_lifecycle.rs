mod common;

use common::FakeBackend;
use rainglass::renderer::{FrameOutcome, MAX_RETRIES};
use rainglass::state::NoticeLevel;
use rainglass::{EffectState, RainRenderer, Scheduler, Settings, SharedState};

fn renderer(backend: FakeBackend) -> (RainRenderer<FakeBackend>, SharedState) {
    let shared = EffectState::shared(Settings::default());
    (RainRenderer::new(shared.clone(), backend, None, (320, 180)), shared)
}

fn pump(renderer: &mut RainRenderer<FakeBackend>, sched: &mut Scheduler) -> Vec<FrameOutcome> {
    sched
        .take_frames()
        .into_iter()
        .filter_map(|id| renderer.on_frame(id, sched))
        .collect()
}

fn fire_next_timer(renderer: &mut RainRenderer<FakeBackend>, sched: &mut Scheduler) -> f64 {
    let deadline = sched.next_deadline().expect("a timer should be pending");
    for id in sched.advance_to(deadline) {
        assert!(renderer.on_timer(id, sched));
    }
    deadline
}

#[test]
fn repeated_setup_keeps_one_session() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, _) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    assert!(renderer.setup(&mut sched));
    assert!(renderer.setup(&mut sched));
    assert_eq!(log.borrow().sessions_created, 1);
    assert_eq!(sched.pending_frames(), 1);
}

#[test]
fn cleanup_without_session_is_a_no_op() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, _) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    renderer.cleanup(&mut sched);
    renderer.cleanup(&mut sched);
    assert_eq!(log.borrow().sessions_released, 0);
    assert!(sched.is_idle());
}

#[test]
fn cleanup_stops_the_frame_loop() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, _) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    renderer.setup(&mut sched);
    assert_eq!(pump(&mut renderer, &mut sched), vec![FrameOutcome::Drawn]);
    renderer.cleanup(&mut sched);
    assert!(sched.is_idle());
    assert!(!renderer.is_running());
    assert_eq!(log.borrow().sessions_released, 1);
}

#[test]
fn disabled_background_skips_setup() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, shared) = renderer(backend);
    shared.borrow_mut().settings.show_background = false;
    let mut sched = Scheduler::new(0.0);

    assert!(!renderer.setup(&mut sched));
    assert_eq!(log.borrow().sessions_created, 0);
    assert!(sched.is_idle());
}

#[test]
fn failed_setup_retries_with_doubling_delay() {
    let (backend, log) = FakeBackend::failing(MAX_RETRIES);
    let (mut renderer, shared) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    assert!(!renderer.setup(&mut sched));
    let notices = shared.borrow_mut().take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);

    assert_eq!(fire_next_timer(&mut renderer, &mut sched), 2_000.0);
    assert_eq!(fire_next_timer(&mut renderer, &mut sched), 6_000.0);
    assert_eq!(fire_next_timer(&mut renderer, &mut sched), 14_000.0);

    // the last retry went through
    assert!(renderer.has_session());
    assert_eq!(renderer.retry_count(), 0);
    assert_eq!(log.borrow().sessions_created, 1);
    // only the first failure was announced
    assert!(shared.borrow_mut().take_notices().is_empty());
}

#[test]
fn gives_up_and_turns_the_effect_off() {
    let (backend, log) = FakeBackend::failing(MAX_RETRIES + 1);
    let (mut renderer, shared) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    renderer.setup(&mut sched);
    for _ in 0..MAX_RETRIES {
        fire_next_timer(&mut renderer, &mut sched);
    }

    assert!(!renderer.has_session());
    assert!(sched.is_idle());
    assert_eq!(log.borrow().sessions_created, 0);
    assert!(!shared.borrow().settings.show_background);
    assert_eq!(shared.borrow_mut().take_notices().len(), 2);
}

#[test]
fn context_loss_pauses_drawing_until_restored() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, _) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    renderer.setup(&mut sched);
    assert_eq!(pump(&mut renderer, &mut sched), vec![FrameOutcome::Drawn]);

    log.borrow_mut().lose_next_draw = true;
    assert_eq!(pump(&mut renderer, &mut sched), vec![FrameOutcome::Lost]);
    assert!(renderer.is_context_lost());
    assert!(renderer.retry_pending());
    assert_eq!(sched.pending_frames(), 0);

    // nothing draws while lost
    assert!(pump(&mut renderer, &mut sched).is_empty());
    assert_eq!(log.borrow().draws, 1);

    renderer.handle_context_restored(&mut sched);
    assert!(!renderer.is_context_lost());
    assert!(!renderer.retry_pending());
    assert_eq!(renderer.retry_count(), 0);
    assert_eq!(log.borrow().sessions_created, 2);
    assert_eq!(log.borrow().sessions_released, 1);

    assert_eq!(pump(&mut renderer, &mut sched), vec![FrameOutcome::Drawn]);
    assert_eq!(log.borrow().draws, 2);
}

#[test]
fn lost_context_rebuilds_itself_on_retry() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, _) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    renderer.setup(&mut sched);
    renderer.handle_context_lost(&mut sched);
    renderer.handle_context_lost(&mut sched);
    assert_eq!(log.borrow().sessions_released, 1);

    fire_next_timer(&mut renderer, &mut sched);
    assert!(renderer.has_session());
    assert_eq!(pump(&mut renderer, &mut sched), vec![FrameOutcome::Drawn]);
}

#[test]
fn reset_rebuilds_from_scratch() {
    let (backend, log) = FakeBackend::new();
    let (mut renderer, _) = renderer(backend);
    let mut sched = Scheduler::new(0.0);

    renderer.setup(&mut sched);
    assert!(renderer.reset(&mut sched));
    assert_eq!(log.borrow().sessions_created, 2);
    assert_eq!(log.borrow().sessions_released, 1);
    assert_eq!(sched.pending_frames(), 1);
}
