//! Integration tests for the slider → volume routing pipeline.
//!
//! These exercise the application layer end-to-end with the in-memory audio
//! backend: `FrameDecoder` + `SessionDirectory` + `TargetResolver` +
//! `RouteVolumeUseCase`, and finally the whole `Engine` fed through a mock
//! serial transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use deej_core::{
    DecoderSettings, FrameDecoder, RoutingConfig, Session, SessionError, SliderMapping,
};
use deej_host::application::refresh::{RefreshKind, RefreshSignal};
use deej_host::application::route_volume::RouteVolumeUseCase;
use deej_host::application::session_directory::{AudioBackend, SessionDirectory, TrackingMode};
use deej_host::application::target_resolver::TargetResolver;
use deej_host::engine::{Engine, EngineDeps, EngineOptions};
use deej_host::infrastructure::audio_backend::in_memory::InMemoryAudioBackend;
use deej_host::infrastructure::slider_link::mock::MockLineTransport;
use deej_host::infrastructure::slider_link::LinkTiming;
use deej_host::infrastructure::storage::config::{AppConfig, TargetList};
use deej_host::infrastructure::window_focus::unsupported::UnsupportedForegroundWindow;
use proptest::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn mapping(entries: &[(usize, &str)]) -> SliderMapping {
    entries
        .iter()
        .map(|(slider, target)| (*slider, vec![target.to_string()]))
        .collect()
}

fn routing(entries: &[(usize, &str)]) -> RoutingConfig {
    RoutingConfig {
        slider_mapping: mapping(entries),
        ..RoutingConfig::default()
    }
}

struct Pipeline {
    directory: Arc<SessionDirectory>,
    use_case: RouteVolumeUseCase,
    config_tx: watch::Sender<Arc<RoutingConfig>>,
}

fn pipeline(backend: Arc<InMemoryAudioBackend>, config: RoutingConfig) -> Pipeline {
    let directory = Arc::new(
        SessionDirectory::new(
            Arc::clone(&backend) as Arc<dyn AudioBackend>,
            backend.mode(),
            &config,
        )
        .with_min_refresh_interval(Duration::ZERO),
    );
    directory.refresh(true).expect("initial snapshot");

    let (config_tx, config_rx) = watch::channel(Arc::new(config));
    let resolver = TargetResolver::new(Arc::clone(&directory), Arc::new(UnsupportedForegroundWindow));
    let use_case = RouteVolumeUseCase::new(
        config_rx,
        Arc::clone(&directory),
        resolver,
        Arc::new(RefreshSignal::new()),
    );
    Pipeline {
        directory,
        use_case,
        config_tx,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn fast_options() -> EngineOptions {
    EngineOptions {
        link_timing: LinkTiming {
            connect_retry: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
        },
        min_refresh_interval: Duration::ZERO,
        ..EngineOptions::default()
    }
}

// ── Routing scenarios ─────────────────────────────────────────────────────────

#[test]
fn test_five_slider_line_routes_to_firefox_and_master() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::polling());
    let firefox = backend.add_session_with_volume("firefox.exe", 0.1);
    let master = backend.add_session_with_volume("master", 0.1);
    let config = routing(&[(0, "firefox.exe"), (3, "master")]);
    let decoder_settings = config.decoder_settings();
    let p = pipeline(Arc::clone(&backend), config);
    let mut decoder = FrameDecoder::new(decoder_settings);

    // Act
    let outcomes: Vec<_> = decoder
        .decode("512|0|0|1023|0\r\n")
        .iter()
        .map(|event| (event.slider_id, p.use_case.handle_slider_move(event)))
        .collect();

    // Assert
    assert_eq!(firefox.control.set_calls(), vec![0.5]);
    assert_eq!(master.control.set_calls(), vec![1.0]);
    let mapped: Vec<usize> = outcomes
        .iter()
        .filter(|(_, o)| o.slider_mapped)
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(mapped, vec![0, 3]);
    assert!(outcomes.iter().all(|(_, o)| o.refresh.is_none()));
}

#[test]
fn test_repeated_line_does_not_touch_volumes_again() {
    let backend = Arc::new(InMemoryAudioBackend::polling());
    let firefox = backend.add_session_with_volume("firefox.exe", 0.1);
    let p = pipeline(Arc::clone(&backend), routing(&[(0, "firefox.exe")]));
    let mut decoder = FrameDecoder::new(DecoderSettings::default());

    for _ in 0..3 {
        for event in decoder.decode("512\r\n") {
            p.use_case.handle_slider_move(&event);
        }
    }

    assert_eq!(firefox.control.set_calls(), vec![0.5]);
}

#[test]
fn test_unmapped_target_follows_configuration() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::polling());
    let notepad = backend.add_session_with_volume("notepad.exe", 0.1);
    backend.add_session("master");
    let p = pipeline(Arc::clone(&backend), routing(&[(0, "deej.unmapped")]));
    let resolver = TargetResolver::new(Arc::clone(&p.directory), Arc::new(UnsupportedForegroundWindow));

    // Act / Assert – unmapped while nothing names it
    assert_eq!(resolver.resolve("deej.unmapped"), vec!["notepad.exe".to_string()]);
    let mut decoder = FrameDecoder::new(DecoderSettings::default());
    for event in decoder.decode("0\r\n") {
        p.use_case.handle_slider_move(&event);
    }
    assert_eq!(notepad.control.set_calls(), vec![0.0]);

    // Act / Assert – mapped once a slider targets it
    let updated = routing(&[(0, "deej.unmapped"), (1, "notepad.exe")]);
    p.directory.apply_config(&updated);
    p.config_tx.send_replace(Arc::new(updated));
    assert!(resolver.resolve("deej.unmapped").is_empty());
}

#[test]
fn test_app_started_after_snapshot_is_found_after_lazy_refresh() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::polling());
    let p = pipeline(Arc::clone(&backend), routing(&[(0, "vlc.exe")]));
    let vlc = backend.add_session_with_volume("vlc.exe", 0.1);
    let mut decoder = FrameDecoder::new(DecoderSettings::default());
    let events = decoder.decode("1023\r\n");

    // Act
    let first = p.use_case.handle_slider_move(&events[0]);
    p.directory.refresh(false).expect("refresh");
    let second = p.use_case.handle_slider_move(&events[0]);

    // Assert
    assert!(!first.target_found);
    assert_eq!(first.refresh, Some(RefreshKind::Lazy));
    assert!(second.target_found);
    assert_eq!(vlc.control.set_calls(), vec![1.0]);
}

#[test]
fn test_failed_volume_change_requests_forced_refresh_and_continues() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::polling());
    let dead = backend.add_session_with_volume("game.exe", 0.1);
    let alive = backend.add_session_with_volume("game.exe", 0.1);
    let p = pipeline(Arc::clone(&backend), routing(&[(0, "game.exe")]));
    dead.control.set_failing(true);
    let mut decoder = FrameDecoder::new(DecoderSettings::default());

    // Act
    let outcome = p.use_case.handle_slider_move(&decoder.decode("512\r\n")[0]);

    // Assert
    assert!(outcome.adjustment_failed);
    assert_eq!(outcome.adjusted, 1);
    assert_eq!(outcome.refresh, Some(RefreshKind::Forced));
    assert_eq!(alive.control.set_calls(), vec![0.5]);
}

// ── Engine end-to-end ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_engine_routes_serial_lines_and_applies_config_reload() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::polling());
    let firefox = backend.add_session_with_volume("firefox.exe", 0.1);
    let spotify = backend.add_session_with_volume("spotify.exe", 0.2);
    let transport = Arc::new(MockLineTransport::new());
    let mut board = transport.push_stream();

    let mut config = AppConfig::default();
    config.slider_mapping = BTreeMap::from([("0".to_string(), TargetList::One("firefox.exe".to_string()))]);

    let engine = Engine::start(
        config.clone(),
        EngineDeps {
            backend: Arc::clone(&backend) as Arc<dyn AudioBackend>,
            focus: Arc::new(UnsupportedForegroundWindow),
            transport,
        },
        fast_options(),
    )
    .expect("engine starts");

    // Act – first frame
    board.write_all(b"512|1023\r\n").await.unwrap();
    wait_until(|| firefox.control.volume() == 0.5).await;

    // Act – reload moves routing to slider 1, the same frame re-emits
    config.slider_mapping = BTreeMap::from([("1".to_string(), TargetList::One("spotify.exe".to_string()))]);
    engine.apply_config(config);
    tokio::time::sleep(Duration::from_millis(100)).await;
    board.write_all(b"512|1023\r\n").await.unwrap();
    wait_until(|| spotify.control.volume() == 1.0).await;

    // Assert
    assert_eq!(firefox.control.set_calls(), vec![0.5]);
    assert_eq!(spotify.control.set_calls(), vec![1.0]);
    engine.shutdown().await.expect("clean shutdown");
    assert_eq!(backend.backend_release_count(), 1);
}

#[tokio::test]
async fn test_event_driven_engine_tracks_sessions_started_later() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::event_driven());
    let engine = Engine::start(
        AppConfig::default(),
        EngineDeps {
            backend: Arc::clone(&backend) as Arc<dyn AudioBackend>,
            focus: Arc::new(UnsupportedForegroundWindow),
            transport: Arc::new(MockLineTransport::new()),
        },
        fast_options(),
    )
    .expect("engine starts");

    // Act
    let discord = backend.add_session("discord.exe");
    wait_until(|| engine.directory().lookup("discord.exe").is_some()).await;
    backend.remove_session(&discord.id);
    wait_until(|| engine.directory().lookup("discord.exe").is_none()).await;

    // Assert
    assert_eq!(engine.directory().session_count(), 0);
    engine.shutdown().await.expect("clean shutdown");
    assert_eq!(backend.released_session_count(), 0, "event mode never releases handles");
}

#[test]
fn test_removed_event_after_forced_refresh_leaves_no_stale_handle() {
    // Arrange – the Added event is still queued when a forced refresh runs
    let backend = Arc::new(InMemoryAudioBackend::event_driven());
    let mut events = backend.subscribe_events().expect("event stream");
    let directory = SessionDirectory::new(
        Arc::clone(&backend) as Arc<dyn AudioBackend>,
        TrackingMode::EventDriven,
        &RoutingConfig::default(),
    );
    let discord = backend.add_session("discord.exe");
    directory.refresh(true).expect("snapshot");
    directory.handle_event(events.try_recv().expect("queued Added"));

    // Act
    backend.remove_session(&discord.id);
    directory.handle_event(events.try_recv().expect("queued Removed"));

    // Assert
    assert!(directory.lookup("discord.exe").is_none());
    assert_eq!(directory.session_count(), 0);
    assert!(directory.unmapped_keys().is_empty());
}

// ── Directory concurrency property ────────────────────────────────────────────

#[test]
fn test_forced_refresh_never_exposes_a_half_rebuilt_directory() {
    // Arrange
    let backend = Arc::new(InMemoryAudioBackend::polling());
    for key in KEYS {
        backend.add_session(key);
    }
    let directory = Arc::new(SessionDirectory::new(
        Arc::clone(&backend) as Arc<dyn AudioBackend>,
        TrackingMode::Polling,
        &RoutingConfig::default(),
    ));
    directory.refresh(true).expect("initial snapshot");

    // Act
    let refresher = {
        let dir = Arc::clone(&directory);
        std::thread::spawn(move || {
            for _ in 0..300 {
                dir.refresh(true).expect("refresh");
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let dir = Arc::clone(&directory);
            std::thread::spawn(move || {
                for _ in 0..300 {
                    for key in KEYS {
                        let sessions = dir.lookup(key);
                        assert_eq!(sessions.map(|s| s.len()), Some(1), "{key} missing mid-refresh");
                    }
                    assert_eq!(dir.session_count(), KEYS.len());
                }
            })
        })
        .collect();

    // Assert
    refresher.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(directory.session_count(), KEYS.len());
}

#[derive(Debug)]
struct KeyedSession(&'static str);

impl Session for KeyedSession {
    fn key(&self) -> &str {
        self.0
    }
    fn volume(&self) -> f32 {
        0.0
    }
    fn set_volume(&self, _volume: f32) -> Result<(), SessionError> {
        Ok(())
    }
    fn release(&self) {}
}

const KEYS: [&str; 3] = ["chrome.exe", "discord.exe", "master"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_concurrent_add_remove_never_exposes_empty_lists(
        scripts in prop::collection::vec(
            prop::collection::vec((0usize..KEYS.len(), any::<bool>()), 1..40),
            2..5,
        )
    ) {
        let backend = Arc::new(InMemoryAudioBackend::polling());
        let directory = Arc::new(SessionDirectory::new(
            backend as Arc<dyn AudioBackend>,
            TrackingMode::Polling,
            &RoutingConfig::default(),
        ));

        let writers: Vec<_> = scripts
            .into_iter()
            .map(|script| {
                let dir = Arc::clone(&directory);
                std::thread::spawn(move || {
                    let mut held: Vec<Arc<dyn Session>> = Vec::new();
                    for (key, add) in script {
                        if add || held.is_empty() {
                            let session: Arc<dyn Session> = Arc::new(KeyedSession(KEYS[key]));
                            dir.add(Arc::clone(&session));
                            held.push(session);
                        } else {
                            let session = held.remove(key % held.len());
                            assert!(dir.remove(&session));
                        }
                    }
                    held.len()
                })
            })
            .collect();

        let reader = {
            let dir = Arc::clone(&directory);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    for key in KEYS {
                        if let Some(sessions) = dir.lookup(key) {
                            assert!(!sessions.is_empty(), "empty list exposed for {key}");
                        }
                    }
                }
            })
        };

        let held: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
        reader.join().unwrap();

        prop_assert_eq!(directory.session_count(), held);
        for key in directory.keys() {
            prop_assert!(directory.lookup(&key).map_or(false, |s| !s.is_empty()));
        }
    }
}
