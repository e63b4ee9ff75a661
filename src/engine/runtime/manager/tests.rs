use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use dpi::PhysicalSize;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::*;
use crate::engine::engine_api::{MethodSink, TextureKind, TextureRegistrar};
use crate::engine::protocol::{self, MethodResponse, NOTIFY_RESIZE};
use crate::engine::rendering::texture::VideoTexture;
use crate::engine::rendering::{GpuDevice, GpuDeviceFactory};
use crate::engine::testing::{
    CountingDeviceFactory, MockEngine, MockRegistrar, RecordingSink, WAIT, wait_until,
};

struct Harness {
    engine: Arc<MockEngine>,
    registrar: Arc<MockRegistrar>,
    sink: Arc<RecordingSink>,
    gpu: Arc<CountingDeviceFactory>,
    manager: VideoOutputManager,
}

fn harness_with(tune: impl FnOnce(&mut BridgeConfig, &CountingDeviceFactory)) -> Harness {
    let engine = Arc::new(MockEngine::default());
    let registrar = Arc::new(MockRegistrar::default());
    let sink = Arc::new(RecordingSink::default());
    let gpu = CountingDeviceFactory::new();
    let notifier: Arc<dyn MethodSink> = sink.clone();
    let factory: Arc<dyn GpuDeviceFactory> = gpu.clone();
    let mut config = BridgeConfig::new(engine.clone(), registrar.clone(), notifier, Some(factory));
    config.realtime_priority = false;
    tune(&mut config, &gpu);
    Harness {
        engine,
        registrar,
        sink,
        gpu,
        manager: VideoOutputManager::new(config),
    }
}

fn harness() -> Harness {
    harness_with(|_, _| {})
}

fn resizes(sink: &RecordingSink) -> Vec<Value> {
    sink.calls()
        .into_iter()
        .filter(|(method, _)| method == NOTIFY_RESIZE)
        .map(|(_, payload)| payload)
        .collect()
}

impl Harness {
    fn assert_released(&self, handle: i64) {
        let log = &self.gpu.log;
        assert_eq!(log.live_devices(), 0, "GPU devices leaked");
        assert_eq!(log.live_textures(), 0, "producer textures leaked");
        assert_eq!(log.live_share_handles(), 0, "share handles leaked");
        assert_eq!(log.live_fences(), 0, "fences leaked");
        let player = self.engine.player(handle);
        assert_eq!(player.live_contexts.load(Ordering::SeqCst), 0, "render context leaked");
        assert!(!player.has_callback(), "engine callback still installed");
        assert_eq!(self.registrar.compositor.live_textures(), 0, "compositor textures leaked");
    }
}

#[test]
fn dynamic_size_follows_the_video_with_one_resize() {
    let h = harness();
    let id = h.manager.create(1, SessionConfig::default()).expect("create");
    assert_eq!(h.manager.backend_kind(1), Some(BackendKind::Hardware));

    let placeholder = h.registrar.populate(id).expect("registered");
    assert_eq!((placeholder.width, placeholder.height), (1, 1));

    let player = h.engine.player(1);
    assert!(wait_until(WAIT, || player.has_callback()));
    player.set_video_size(1280, 720);
    assert!(player.fire_update());
    assert!(wait_until(WAIT, || h.registrar.frames_marked(id) >= 1));

    let shown = h.registrar.populate(id).expect("registered");
    assert_eq!((shown.width, shown.height), (1280, 720));

    for _ in 0..3 {
        let before = h.registrar.frames_marked(id);
        player.fire_update();
        assert!(wait_until(WAIT, || h.registrar.frames_marked(id) > before));
    }
    assert_eq!(
        resizes(&h.sink),
        vec![json!({
            "handle": 1,
            "id": id,
            "rect": {"left": 0, "top": 0, "width": 1280, "height": 720},
        })]
    );
    assert!(player.renders().iter().all(|size| *size == PhysicalSize::new(1280, 720)));
}

#[test]
fn fixed_size_wins_over_native_size() {
    let h = harness();
    let player = h.engine.player(2);
    player.set_video_size(1920, 1080);
    let config = SessionConfig {
        size: OutputSize::fixed(640, 360),
        enable_hardware_acceleration: true,
    };
    let id = h.manager.create(2, config).expect("create");
    assert!(wait_until(WAIT, || h.registrar.frames_marked(id) >= 1));

    let shown = h.registrar.populate(id).expect("registered");
    assert_eq!((shown.width, shown.height), (640, 360));
    assert!(!player.renders().is_empty());
    assert!(player.renders().iter().all(|size| *size == PhysicalSize::new(640, 360)));
}

#[test]
fn dispose_releases_everything_and_recreate_starts_clean() {
    let h = harness();
    let player = h.engine.player(3);
    player.set_video_size(320, 240);
    let first = h.manager.create(3, SessionConfig::default()).expect("create");
    assert!(wait_until(WAIT, || h.registrar.frames_marked(first) >= 1));
    h.registrar.populate(first);

    h.manager.dispose(3).expect("dispose");
    assert!(h.manager.is_empty());
    assert_eq!(h.registrar.unregistered(), vec![first]);
    assert!(!player.fire_update());
    h.assert_released(3);

    let second = h.manager.create(3, SessionConfig::default()).expect("re-create");
    assert_ne!(first, second);
    assert!(wait_until(WAIT, || h.registrar.frames_marked(second) >= 1));
    let shown = h.registrar.populate(second).expect("registered");
    assert_eq!((shown.width, shown.height), (320, 240));
    assert_eq!(h.registrar.frames_marked(first), 1);
}

#[test]
fn create_is_idempotent() {
    let h = harness();
    let first = h.manager.create(4, SessionConfig::default()).expect("create");
    let again = h.manager.create(4, SessionConfig::default()).expect("create again");
    assert_eq!(first, again);
    assert_eq!(h.manager.len(), 1);
    assert_eq!(h.registrar.registered(), 1);
    assert_eq!(h.engine.player(4).apis(), vec!["opengl"]);
    assert_eq!(h.gpu.log.live_devices(), 1);
}

#[test]
fn failing_gpu_falls_back_to_clamped_software() {
    let h = harness();
    h.gpu.fail.store(true, Ordering::SeqCst);
    let player = h.engine.player(5);
    player.set_video_size(3840, 2160);
    let id = h.manager.create(5, SessionConfig::default()).expect("create");
    assert_eq!(h.manager.backend_kind(5), Some(BackendKind::Software));
    assert_eq!(player.apis(), vec!["sw"]);

    assert!(wait_until(WAIT, || h.registrar.frames_marked(id) >= 1));
    let view = h.registrar.copy_pixels(id).expect("registered");
    assert_eq!((view.width, view.height), (1920, 1080));
    assert!(!view.pixels.is_null());
    assert_eq!(resizes(&h.sink).len(), 1);
}

#[test]
fn engine_rejecting_gl_falls_back_to_software() {
    let h = harness();
    let player = h.engine.player(6);
    player.reject_opengl.store(true, Ordering::SeqCst);
    h.manager.create(6, SessionConfig::default()).expect("create");
    assert_eq!(h.manager.backend_kind(6), Some(BackendKind::Software));
    assert_eq!(player.apis(), vec!["sw"]);
    assert_eq!(h.gpu.log.live_devices(), 0);
}

#[test]
fn hardware_can_be_disabled_per_session_or_globally() {
    let h = harness();
    let config = SessionConfig {
        size: OutputSize::dynamic(),
        enable_hardware_acceleration: false,
    };
    h.manager.create(7, config).expect("create");
    assert_eq!(h.manager.backend_kind(7), Some(BackendKind::Software));

    let global = harness_with(|config, _| config.hardware_enabled = false);
    global.manager.create(8, SessionConfig::default()).expect("create");
    assert_eq!(global.manager.backend_kind(8), Some(BackendKind::Software));
    assert!(global.gpu.log.events().is_empty());
}

#[test]
fn set_size_reallocates_and_notifies_again() {
    let h = harness();
    let player = h.engine.player(9);
    player.set_video_size(1280, 720);
    let id = h.manager.create(9, SessionConfig::default()).expect("create");
    assert!(wait_until(WAIT, || resizes(&h.sink).len() == 1));

    h.manager.set_size(9, OutputSize::fixed(320, 180)).expect("set size");
    assert!(wait_until(WAIT, || resizes(&h.sink).len() == 2));
    assert_eq!(resizes(&h.sink)[1]["rect"]["width"], json!(320));
    assert!(wait_until(WAIT, || {
        let shown = h.registrar.populate(id).expect("registered");
        (shown.width, shown.height) == (320, 180)
    }));

    h.manager.set_size(9, OutputSize::fixed(320, 180)).expect("same size");
    let before = h.registrar.frames_marked(id);
    player.fire_update();
    assert!(wait_until(WAIT, || h.registrar.frames_marked(id) > before));
    assert_eq!(resizes(&h.sink).len(), 2);
}

#[test]
fn unknown_handles_are_stale() {
    let h = harness();
    assert!(matches!(
        h.manager.set_size(42, OutputSize::dynamic()),
        Err(BridgeError::StaleSession)
    ));
    assert!(matches!(h.manager.dispose(42), Err(BridgeError::StaleSession)));
}

#[test]
fn dispose_gives_up_waiting_for_a_silent_host() {
    let h = harness_with(|config, _| config.unregister_timeout = Duration::from_millis(50));
    h.registrar.hold_unregister.store(true, Ordering::SeqCst);
    h.manager.create(10, SessionConfig::default()).expect("create");

    let started = Instant::now();
    h.manager.dispose(10).expect("dispose");
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(started.elapsed() < WAIT);
    assert_eq!(h.gpu.log.live_devices(), 0);
}

#[test]
fn dispose_races_with_engine_callbacks() {
    let h = harness();
    let player = h.engine.player(11);
    player.set_video_size(640, 480);
    let id = h.manager.create(11, SessionConfig::default()).expect("create");
    assert!(wait_until(WAIT, || player.has_callback()));

    let spammer = {
        let player = Arc::clone(&player);
        std::thread::spawn(move || {
            let mut fired = 0;
            while player.fire_update() {
                fired += 1;
                std::thread::yield_now();
            }
            fired
        })
    };
    assert!(wait_until(WAIT, || h.registrar.frames_marked(id) >= 3));
    h.manager.dispose(11).expect("dispose");
    spammer.join().expect("spammer");
    h.assert_released(11);
}

#[test]
fn shutdown_disposes_every_session() {
    let h = harness();
    h.registrar.hold_unregister.store(true, Ordering::SeqCst);
    for handle in 20..23 {
        h.manager.create(handle, SessionConfig::default()).expect("create");
    }
    h.manager.shutdown();
    assert!(h.manager.is_empty());
    assert_eq!(h.registrar.unregistered().len(), 3);
    assert_eq!(h.gpu.log.live_devices(), 0);
}

#[test]
fn method_calls_drive_the_manager() {
    let h = harness();
    let create = protocol::handle_method_call(
        &h.manager,
        protocol::METHOD_CREATE,
        &json!({"handle": "30", "width": "null", "height": "null", "enableHardwareAcceleration": "true"}),
    );
    assert_eq!(create, MethodResponse::Success(Value::Null));
    assert!(h.manager.texture_id(30).is_some());

    let resize = protocol::handle_method_call(
        &h.manager,
        protocol::METHOD_SET_SIZE,
        &json!({"handle": 30, "width": "800", "height": "600"}),
    );
    assert_eq!(resize, MethodResponse::Success(Value::Null));

    let stale = protocol::handle_method_call(&h.manager, protocol::METHOD_DISPOSE, &json!({"handle": 99}));
    assert_eq!(stale, MethodResponse::Success(Value::Null));

    let malformed = protocol::handle_method_call(&h.manager, protocol::METHOD_DISPOSE, &json!({"handle": "x"}));
    assert!(matches!(malformed, MethodResponse::Error { ref code, .. } if code == "INVALID_ARGUMENTS"));

    let unknown = protocol::handle_method_call(&h.manager, "VideoOutputManager.Seek", &json!({}));
    assert_eq!(unknown, MethodResponse::NotImplemented);

    let dispose = protocol::handle_method_call(&h.manager, protocol::METHOD_DISPOSE, &json!({"handle": 30}));
    assert_eq!(dispose, MethodResponse::Success(Value::Null));
    assert!(h.manager.is_empty());
}

/// Runs `call` on its own thread and fails the test if it does not finish in time.
fn within<R: Send + 'static>(call: impl FnOnce() -> R + Send + 'static) -> R {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let _ = done_tx.send(call());
    });
    done_rx.recv_timeout(WAIT).expect("call did not finish in time")
}

/// Device factory that parks the render thread until the test opens the gate.
struct GatedFactory {
    inner: Arc<CountingDeviceFactory>,
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl GpuDeviceFactory for GatedFactory {
    fn create_device(&self) -> Result<Box<dyn GpuDevice>> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        self.inner.create_device()
    }
}

struct Gated {
    engine: Arc<MockEngine>,
    registrar: Arc<MockRegistrar>,
    devices: Arc<CountingDeviceFactory>,
    manager: Arc<VideoOutputManager>,
    entered: Receiver<()>,
    open: Sender<()>,
}

fn gated() -> Gated {
    let engine = Arc::new(MockEngine::default());
    let registrar = Arc::new(MockRegistrar::default());
    let devices = CountingDeviceFactory::new();
    let (entered_tx, entered) = crossbeam_channel::unbounded();
    let (open, gate) = crossbeam_channel::unbounded();
    let factory: Arc<dyn GpuDeviceFactory> = Arc::new(GatedFactory {
        inner: devices.clone(),
        entered: entered_tx,
        gate,
    });
    let notifier: Arc<dyn MethodSink> = Arc::new(RecordingSink::default());
    let mut config = BridgeConfig::new(engine.clone(), registrar.clone(), notifier, Some(factory));
    config.realtime_priority = false;
    Gated {
        engine,
        registrar,
        devices,
        manager: Arc::new(VideoOutputManager::new(config)),
        entered,
        open,
    }
}

impl Gated {
    fn create_in_background(&self, handle: i64) -> std::thread::JoinHandle<Result<i64>> {
        let manager = Arc::clone(&self.manager);
        let creator = std::thread::spawn(move || manager.create(handle, SessionConfig::default()));
        self.entered.recv_timeout(WAIT).expect("render thread reached GPU init");
        creator
    }
}

#[test]
fn slow_gpu_init_does_not_block_other_handles() {
    let g = gated();
    g.engine.player(40).set_video_size(1280, 720);
    let creator = g.create_in_background(40);

    let manager = Arc::clone(&g.manager);
    let software = SessionConfig {
        size: OutputSize::dynamic(),
        enable_hardware_acceleration: false,
    };
    let other = within(move || manager.create(41, software)).expect("create another handle");
    assert_eq!(g.manager.texture_id(41), Some(other));
    assert_eq!(g.manager.texture_id(40), None, "still being created");

    // Recorded on the reservation and applied once the session exists.
    let manager = Arc::clone(&g.manager);
    within(move || manager.set_size(40, OutputSize::fixed(320, 180))).expect("set size while creating");

    g.open.send(()).expect("gate");
    let id = creator.join().expect("creator thread").expect("create");
    assert_eq!(g.manager.texture_id(40), Some(id));
    assert_eq!(g.manager.len(), 2);
    assert!(wait_until(WAIT, || {
        let shown = g.registrar.populate(id).expect("registered");
        (shown.width, shown.height) == (320, 180)
    }));
}

#[test]
fn dispose_while_creating_tears_the_new_session_down() {
    let g = gated();
    let creator = g.create_in_background(42);

    let manager = Arc::clone(&g.manager);
    within(move || manager.dispose(42)).expect("dispose while creating");
    g.open.send(()).expect("gate");

    let created = creator.join().expect("creator thread");
    assert!(matches!(created, Err(BridgeError::StaleSession)));
    assert!(g.manager.is_empty());
    assert_eq!(g.registrar.unregistered().len(), 1);
    assert_eq!(g.registrar.registered(), 0);
    assert_eq!(g.devices.log.live_devices(), 0);
    assert!(!g.engine.player(42).has_callback());

    // The handle is free again.
    let manager = Arc::clone(&g.manager);
    let creator = std::thread::spawn(move || manager.create(42, SessionConfig::default()));
    g.open.send(()).expect("gate");
    creator.join().expect("creator thread").expect("re-create");
    assert_eq!(g.manager.len(), 1);
}

/// Registrar that calls back into the manager from `register_texture`, like a host that
/// dispatches other method calls while registering.
struct CallingBackRegistrar {
    inner: MockRegistrar,
    manager: OnceLock<Weak<VideoOutputManager>>,
    sessions_seen: Mutex<Vec<usize>>,
}

impl TextureRegistrar for CallingBackRegistrar {
    fn register_texture(&self, kind: TextureKind, texture: Arc<VideoTexture>) -> Result<i64> {
        if let Some(manager) = self.manager.get().and_then(Weak::upgrade) {
            self.sessions_seen.lock().push(manager.len());
            let _ = manager.set_size(50, OutputSize::fixed(64, 64));
        }
        self.inner.register_texture(kind, texture)
    }

    fn unregister_texture(&self, id: i64, on_done: Box<dyn FnOnce() + Send>) {
        self.inner.unregister_texture(id, on_done);
    }

    fn mark_frame_available(&self, id: i64) {
        self.inner.mark_frame_available(id);
    }
}

#[test]
fn host_may_call_back_into_the_manager_while_registering() {
    let registrar = Arc::new(CallingBackRegistrar {
        inner: MockRegistrar::default(),
        manager: OnceLock::new(),
        sessions_seen: Mutex::new(Vec::new()),
    });
    let notifier: Arc<dyn MethodSink> = Arc::new(RecordingSink::default());
    let mut config = BridgeConfig::new(Arc::new(MockEngine::default()), registrar.clone(), notifier, None);
    config.realtime_priority = false;
    let manager = Arc::new(VideoOutputManager::new(config));
    let _ = registrar.manager.set(Arc::downgrade(&manager));

    for handle in [50, 51] {
        let creating = Arc::clone(&manager);
        within(move || creating.create(handle, SessionConfig::default())).expect("create");
    }
    assert_eq!(*registrar.sessions_seen.lock(), vec![0, 1]);
    assert_eq!(manager.len(), 2);
}
