use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use dpi::PhysicalSize;
use parking_lot::Mutex;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::engine::engine_api::{PlaybackEngine, RenderApi, RenderContext, TextureKind};
use crate::engine::error::BridgeError;
use crate::engine::frame::{INITIAL_FRONT_SLOT, MailboxWord, SharedFrameState, TRIPLE_BUFFER_COUNT};
use crate::engine::rendering::backend::RenderBackend;
use crate::engine::rendering::texture::VideoTexture;
use crate::engine::testing::{
    CountingCompositor, CountingDevice, DeviceEvent, DeviceLog, MockEngine, WAIT, wait_until,
};

use super::FrameBufferSet;

struct Harness {
    log: Arc<DeviceLog>,
    frame: Arc<SharedFrameState>,
    buffers: FrameBufferSet,
    backend: RenderBackend,
    context: Box<dyn RenderContext>,
}

fn hardware() -> Harness {
    hardware_with(DeviceLog::new(), Arc::new(SharedFrameState::new()))
}

fn hardware_with(log: Arc<DeviceLog>, frame: Arc<SharedFrameState>) -> Harness {
    let engine = MockEngine::default();
    let context = engine
        .create_render_context(1, RenderApi::Software)
        .expect("mock context");
    Harness {
        backend: RenderBackend::Hardware(Box::new(CountingDevice::new(Arc::clone(&log)))),
        buffers: FrameBufferSet::new(Arc::clone(&frame)),
        log,
        frame,
        context,
    }
}

impl Harness {
    fn frame_cycle(&mut self) {
        assert!(self.buffers.render(&mut self.backend, self.context.as_mut()).expect("render"));
        self.buffers.publish();
    }

    /// Share handle of the buffer the next `render` writes into.
    fn back_share_handle(&self) -> u64 {
        let number = self.buffers.current_generation().expect("allocated");
        let generation = self.frame.generation(number).expect("installed");
        generation.slot(self.buffers.back).share_handle()
    }
}

/// Counts `ERROR` events emitted on the thread it is installed on.
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

const SMALL: PhysicalSize<u32> = PhysicalSize::new(640, 360);
const LARGE: PhysicalSize<u32> = PhysicalSize::new(1280, 720);

#[test]
fn resize_to_same_size_is_a_no_op() {
    let mut h = hardware();
    assert!(h.buffers.check_and_resize(&mut h.backend, SMALL).expect("allocate"));
    assert!(!h.buffers.check_and_resize(&mut h.backend, SMALL).expect("same size"));
    assert_eq!(h.log.buffers_created(), 3);
    assert_eq!(h.buffers.current_generation(), Some(1));
}

#[test]
fn render_without_buffers_does_nothing() {
    let mut h = hardware();
    assert!(!h.buffers.render(&mut h.backend, h.context.as_mut()).expect("render"));
    h.buffers.publish();
    assert_eq!(h.frame.take_latest(MailboxWord::clean(0, INITIAL_FRONT_SLOT)), None);
}

#[test]
fn published_frame_carries_its_fence() {
    let mut h = hardware();
    h.buffers.check_and_resize(&mut h.backend, SMALL).expect("allocate");
    h.frame_cycle();

    let taken = h
        .frame
        .take_latest(MailboxWord::clean(0, INITIAL_FRONT_SLOT))
        .expect("published");
    let generation = h.frame.generation(taken.generation).expect("installed");
    assert_ne!(generation.slot(taken.slot).fence(), 0);
    assert_eq!(generation.size(), SMALL);
}

#[test]
fn retired_generation_survives_until_acknowledged() {
    let mut h = hardware();
    h.buffers.check_and_resize(&mut h.backend, SMALL).expect("allocate");
    h.frame_cycle();

    assert!(h.buffers.check_and_resize(&mut h.backend, LARGE).expect("resize"));
    assert_eq!(h.buffers.retired_generations(), 1);
    assert_eq!(h.log.live_textures(), 6);

    h.buffers.collect_retired(&mut h.backend);
    assert_eq!(h.log.live_textures(), 6, "consumer has not switched yet");

    h.frame.acknowledge_generation(2);
    h.buffers.collect_retired(&mut h.backend);
    assert_eq!(h.buffers.retired_generations(), 0);
    assert_eq!(h.log.live_textures(), 3);
    assert_eq!(h.log.live_share_handles(), 3);
    assert!(h.frame.generation(1).is_none());
}

#[test]
fn failed_resize_keeps_previous_generation() {
    let mut h = hardware();
    h.buffers.check_and_resize(&mut h.backend, SMALL).expect("allocate");
    h.log.limit_allocations(2);

    let err = h
        .buffers
        .check_and_resize(&mut h.backend, LARGE)
        .expect_err("third allocation fails");
    assert!(matches!(err, BridgeError::ResourceExhausted(_)));
    assert_eq!(h.buffers.size(), Some(SMALL));
    assert_eq!(h.log.live_textures(), 3, "partial generation was rolled back");
    assert_eq!(h.log.live_share_handles(), 3);
}

#[test]
fn dispose_releases_everything_share_handle_first() {
    let mut h = hardware();
    h.buffers.check_and_resize(&mut h.backend, SMALL).expect("allocate");
    for _ in 0..4 {
        h.frame_cycle();
    }
    h.buffers.check_and_resize(&mut h.backend, LARGE).expect("resize");
    h.frame_cycle();

    h.buffers.dispose(&mut h.backend);
    assert_eq!(h.log.live_textures(), 0);
    assert_eq!(h.log.live_share_handles(), 0);
    assert_eq!(h.log.live_fences(), 0);
    assert_eq!(h.frame.live_generations(), 0);

    let events = h.log.events();
    for (index, event) in events.iter().enumerate() {
        let DeviceEvent::DeleteObjects { texture } = *event else {
            continue;
        };
        let share_handle = events
            .iter()
            .find_map(|event| match *event {
                DeviceEvent::CreateBuffer { texture: t, share_handle } if t == texture => Some(share_handle),
                _ => None,
            })
            .expect("buffer was created");
        assert_eq!(
            events[index - 1],
            DeviceEvent::DestroyShareHandle(share_handle),
            "share handle must go right before its texture"
        );
    }
}

#[test]
fn software_buffers_receive_pixels() {
    let frame = Arc::new(SharedFrameState::new());
    let mut buffers = FrameBufferSet::new(Arc::clone(&frame));
    let mut backend = RenderBackend::Software;
    let mut context = MockEngine::default()
        .create_render_context(1, RenderApi::Software)
        .expect("mock context");

    buffers.check_and_resize(&mut backend, SMALL).expect("allocate");
    assert!(buffers.render(&mut backend, context.as_mut()).expect("render"));
    buffers.publish();

    let taken = frame
        .take_latest(MailboxWord::clean(0, INITIAL_FRONT_SLOT))
        .expect("published");
    let generation = frame.generation(taken.generation).expect("installed");
    assert_eq!(generation.stride(), 640 * 4);
    let pixels = generation.slot(taken.slot).lock_pixels();
    assert_eq!(pixels.len(), 640 * 4 * 360);
    assert_eq!(&pixels[..4], &1u32.to_le_bytes());
}

#[test]
fn next_render_target_is_never_the_displayed_buffer() {
    let mut h = hardware();
    let gpu = CountingCompositor::default();
    let texture = VideoTexture::new(Arc::clone(&h.frame), TextureKind::Gl, || {});

    h.buffers.check_and_resize(&mut h.backend, SMALL).expect("allocate");
    h.frame_cycle();
    texture.populate(&gpu);

    // Imports are only needed when switching generations, so failures here change nothing.
    gpu.fail_imports.store(true, Ordering::SeqCst);
    for _ in 0..4 {
        h.frame_cycle();
        let shown = texture.populate(&gpu);
        let displayed = gpu.share_handle_of(shown.name).expect("imported texture");
        assert_ne!(h.back_share_handle(), displayed, "producer would render into the displayed buffer");
    }
    assert_eq!(gpu.imported_handles.lock().len(), TRIPLE_BUFFER_COUNT);
}

/// Producer thread resizes every few frames while a compositor thread keeps populating. Each
/// buffer carries the number of the frame last rendered into it; whatever the compositor shows
/// must not change while it is shown.
#[test]
fn resizing_under_a_live_compositor_never_writes_the_displayed_buffer() {
    const FRAMES: u64 = 3_000;
    const FRAMES_PER_SIZE: u64 = 7;

    let frame = Arc::new(SharedFrameState::new());
    let log = DeviceLog::new();
    let texture = Arc::new(VideoTexture::new(Arc::clone(&frame), TextureKind::Gl, || {}));
    let gpu = Arc::new(CountingCompositor::default());
    let stamps: Arc<Mutex<HashMap<u64, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let done = Arc::new(AtomicBool::new(false));
    let errors = Arc::new(AtomicUsize::new(0));

    let producer = {
        let frame = Arc::clone(&frame);
        let log = Arc::clone(&log);
        let stamps = Arc::clone(&stamps);
        let done = Arc::clone(&done);
        let errors = Arc::clone(&errors);
        thread::spawn(move || {
            let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors));
            let _guard = tracing::subscriber::set_default(subscriber);

            let mut h = hardware_with(log, frame);
            for number in 1..=FRAMES {
                let size = if (number / FRAMES_PER_SIZE) % 2 == 0 { SMALL } else { LARGE };
                h.buffers.check_and_resize(&mut h.backend, size).expect("allocate");
                h.buffers.collect_retired(&mut h.backend);
                stamps.lock().insert(h.back_share_handle(), number);
                h.frame_cycle();
            }
            done.store(true, Ordering::Release);

            let last = h.buffers.current_generation().expect("allocated");
            assert!(
                wait_until(WAIT, || h.frame.acknowledged_generation() == last),
                "compositor never switched to the last generation"
            );
            h.buffers.collect_retired(&mut h.backend);
            h.log.live_textures()
        })
    };

    let consumer = {
        let texture = Arc::clone(&texture);
        let gpu = Arc::clone(&gpu);
        let stamps = Arc::clone(&stamps);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            loop {
                let finished = done.load(Ordering::Acquire);
                let shown = texture.populate(gpu.as_ref());
                if let Some(displayed) = gpu.share_handle_of(shown.name) {
                    let seen = stamps.lock().get(&displayed).copied();
                    thread::yield_now();
                    assert_eq!(
                        stamps.lock().get(&displayed).copied(),
                        seen,
                        "producer rendered into the displayed buffer"
                    );
                }
                if finished {
                    break;
                }
            }
        })
    };

    consumer.join().expect("compositor thread panicked");
    let live_after_collect = producer.join().expect("producer thread panicked");
    assert_eq!(errors.load(Ordering::SeqCst), 0, "stale mailbox token without a spare buffer");
    assert_eq!(live_after_collect, TRIPLE_BUFFER_COUNT, "retired generations were not released");
    assert_eq!(gpu.live_textures(), TRIPLE_BUFFER_COUNT as isize);
}
