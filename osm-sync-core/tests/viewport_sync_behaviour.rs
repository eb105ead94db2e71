//! Behavioural tests for viewport-driven synchronisation.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use geo::Coord;
use osm_sync_core::test_support::{
    FailingConverter, GatedProvider, RecordingObserver, RecordingSurface, ScriptedProvider,
    SurfaceCall, osm_xml_nodes,
};
use osm_sync_core::{
    BuiltinConverter, Checkpoint, DefaultStyles, ElementRef, FormatConverter, LayerName,
    RawPayload, RemoteDataProvider, SessionHandle, SessionOutcome, SyncConfig, SyncController,
    SyncError, SyncEvent, SyncParts,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

const FIRST_CENTRE: Coord<f64> = Coord { x: 10.0, y: 50.0 };
const FAR_CENTRE: Coord<f64> = Coord { x: 13.4, y: 52.5 };

type SessionResult = Result<SessionOutcome, Arc<SyncError>>;

/// Shared state threaded through the steps of one scenario.
#[derive(Default)]
struct SyncWorld {
    staging: Option<TempDir>,
    controller: Option<Arc<SyncController>>,
    scripted: Option<Arc<ScriptedProvider>>,
    gated: Option<Arc<GatedProvider>>,
    surface: Arc<RecordingSurface>,
    observer: Arc<RecordingObserver>,
    stalled: Option<SessionHandle>,
    results: Vec<SessionResult>,
}

impl SyncWorld {
    fn install(&mut self, provider: Arc<dyn RemoteDataProvider>, converter: Arc<dyn FormatConverter>) {
        let dir = TempDir::new().expect("create staging dir");
        let staging =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 staging dir");
        let controller = SyncController::new(
            SyncConfig::with_staging_dir(staging),
            SyncParts {
                provider,
                converter,
                surface: self.surface.clone(),
                styles: Arc::new(DefaultStyles),
                edits: Arc::new(osm_sync_core::test_support::MemoryEditStore::default()),
            },
        );
        controller.subscribe(self.observer.clone());
        self.staging = Some(dir);
        self.controller = Some(controller);
    }

    fn controller(&self) -> Arc<SyncController> {
        Arc::clone(self.controller.as_ref().expect("controller installed"))
    }

    fn requests(&self) -> usize {
        self.scripted
            .as_ref()
            .map(|provider| provider.requests().len())
            .or_else(|| self.gated.as_ref().map(|provider| provider.requests().len()))
            .unwrap_or_default()
    }
}

fn five_benches() -> RawPayload {
    RawPayload::from(
        osm_xml_nodes(&[
            (1, 10.0, 50.0),
            (2, 10.0005, 50.0),
            (3, 10.001, 50.001),
            (4, 9.999, 49.999),
            (5, 10.0015, 49.9985),
        ])
        .as_str(),
    )
}

#[fixture]
fn sync_world() -> RefCell<SyncWorld> {
    RefCell::new(SyncWorld::default())
}

#[given("a server returning five benches around the viewport")]
fn five_bench_server(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let provider = Arc::new(ScriptedProvider::new([Ok(five_benches())]));
    let mut world = world.borrow_mut();
    world.install(provider.clone(), Arc::new(BuiltinConverter));
    world.scripted = Some(provider);
}

#[given("a server rejecting the area twice before answering")]
fn rejecting_server(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let provider = Arc::new(ScriptedProvider::rejecting(2, five_benches()));
    let mut world = world.borrow_mut();
    world.install(provider.clone(), Arc::new(BuiltinConverter));
    world.scripted = Some(provider);
}

#[given("a server that stalls the first download")]
fn stalling_server(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let second_area = osm_xml_nodes(&[(10, 13.4, 52.5), (11, 13.401, 52.501)]);
    let provider = Arc::new(GatedProvider::new([
        Ok(five_benches()),
        Ok(RawPayload::from(second_area.as_str())),
    ]));
    let mut world = world.borrow_mut();
    world.install(provider.clone(), Arc::new(BuiltinConverter));
    world.gated = Some(provider);
}

#[given("a server returning five benches and a converter that fails")]
fn failing_converter(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let provider = Arc::new(ScriptedProvider::new([Ok(five_benches())]));
    let mut world = world.borrow_mut();
    world.install(provider.clone(), Arc::new(FailingConverter));
    world.scripted = Some(provider);
}

#[when("the viewport settles on the first centre")]
fn settle_first(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let controller = world.borrow().controller();
    let handle = controller
        .check_map_center(FIRST_CENTRE)
        .expect("first viewport starts a session");
    let gated = world.borrow().gated.clone();
    if let Some(provider) = gated {
        assert!(
            provider.wait_until_entered(Duration::from_secs(5)),
            "first download never started"
        );
        world.borrow_mut().stalled = Some(handle);
    } else {
        world.borrow_mut().results.push(handle.join());
    }
}

#[when("the viewport moves far away before the first download finishes")]
fn move_far(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let controller = world.borrow().controller();
    let second = controller
        .check_map_center(FAR_CENTRE)
        .expect("far viewport starts a session")
        .join();
    let (gated, stalled) = {
        let mut world = world.borrow_mut();
        (world.gated.clone(), world.stalled.take())
    };
    gated.expect("gated provider installed").release();
    let first = stalled.expect("first session stalled").join();
    let mut world = world.borrow_mut();
    world.results.push(first);
    world.results.push(second);
}

#[when("the viewport nudges within the published area")]
fn nudge(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let controller = world.borrow().controller();
    let started = controller.check_map_center(Coord {
        x: 10.0015,
        y: 49.9991,
    });
    assert!(started.is_none(), "nudge must not start a session");
}

#[then("the index holds 5 features")]
fn index_holds_five(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    assert_eq!(world.borrow().controller().index().len(), 5);
}

#[then("the source layer draws 5 geometries")]
fn source_draws_five(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let world = world.borrow();
    assert_eq!(world.surface.drawn(LayerName::Source).len(), 5);
}

#[then("tapping bench 3 selects only bench 3")]
fn tap_bench_three(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let hits = world
        .borrow()
        .controller()
        .tap_resolver()
        .resolve(Coord { x: 10.001, y: 50.001 }, 1e-5);
    assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![ElementRef::node(3)]);
}

#[then("the half-extent has shrunk to 0.001125")]
fn shrunk(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let half_extent = world.borrow().controller().pipeline().half_extent();
    assert!(
        (half_extent - 0.001_125).abs() < 1e-12,
        "unexpected half-extent {half_extent}"
    );
}

#[then("exactly one download was published")]
fn one_publish(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let world = world.borrow();
    let publishes = world
        .surface
        .calls()
        .into_iter()
        .filter(|call| matches!(call, SurfaceCall::SetGeometry(LayerName::Source, _)))
        .count();
    assert_eq!(publishes, 1);
    assert_eq!(world.requests(), 3);
}

#[then("only features from the second area are visible")]
fn second_area_visible(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let world = world.borrow();
    let expected = vec![ElementRef::node(10), ElementRef::node(11)];
    assert_eq!(world.controller().index().ids(), expected);
    let mut drawn = world.surface.drawn(LayerName::Source);
    drawn.sort_unstable();
    assert_eq!(drawn, expected);
}

#[then("the first session reports that it was superseded")]
fn first_superseded(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let world = world.borrow();
    let first = world.results.first().expect("first session finished");
    assert!(
        matches!(
            first,
            Ok(SessionOutcome::Superseded {
                checkpoint: Checkpoint::Fetched,
                ..
            })
        ),
        "unexpected outcome {first:?}"
    );
    assert!(world.observer.events().iter().any(|event| matches!(
        event,
        SyncEvent::DownloadSuperseded { operation: 1, .. }
    )));
}

#[then("no further download is requested")]
fn no_further_download(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    assert_eq!(world.borrow().requests(), 1);
}

#[then("a conversion failure is reported")]
fn conversion_failure(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    let world = world.borrow();
    let result = world.results.first().expect("session finished");
    match result {
        Err(err) => assert!(
            matches!(**err, SyncError::Conversion { .. }),
            "expected a conversion failure, got {err:?}"
        ),
        Ok(outcome) => panic!("expected a failure, got {outcome:?}"),
    }
    assert!(world
        .observer
        .events()
        .iter()
        .any(|event| matches!(event, SyncEvent::DownloadFailed { .. })));
}

#[then("the index stays empty")]
fn index_empty(#[from(sync_world)] world: &RefCell<SyncWorld>) {
    assert!(world.borrow().controller().index().is_empty());
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/viewport_sync.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "publishing a fresh download",
            "shrinking the area after object-limit rejections",
            "superseding a slow download",
            "staying inside the published area",
            "reporting a broken converter",
        ]
    );
}

#[scenario(path = "tests/features/viewport_sync.feature", index = 0)]
fn publishing_fresh_download(sync_world: RefCell<SyncWorld>) {
    let _ = sync_world;
}

#[scenario(path = "tests/features/viewport_sync.feature", index = 1)]
fn shrinking_after_rejections(sync_world: RefCell<SyncWorld>) {
    let _ = sync_world;
}

#[scenario(path = "tests/features/viewport_sync.feature", index = 2)]
fn superseding_slow_download(sync_world: RefCell<SyncWorld>) {
    let _ = sync_world;
}

#[scenario(path = "tests/features/viewport_sync.feature", index = 3)]
fn staying_inside_published_area(sync_world: RefCell<SyncWorld>) {
    let _ = sync_world;
}

#[scenario(path = "tests/features/viewport_sync.feature", index = 4)]
fn reporting_broken_converter(sync_world: RefCell<SyncWorld>) {
    let _ = sync_world;
}
