use std::sync::{Arc, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::test_support::{
    FailingConverter, RecordingSurface, ScriptedProvider, SurfaceCall, osm_xml_nodes,
};
use crate::{
    BuiltinConverter, ConversionError, DEFAULT_HALF_EXTENT, DefaultStyles, ElementRef,
    TapResolver,
};

const CENTER: Coord<f64> = Coord { x: 10.0, y: 50.0 };

struct Harness {
    _dir: TempDir,
    pipeline: BboxFetchPipeline,
    provider: Arc<ScriptedProvider>,
    surface: Arc<RecordingSurface>,
}

impl Harness {
    fn source_publishes(&self) -> usize {
        self.surface
            .calls()
            .iter()
            .filter(|call| matches!(call, SurfaceCall::SetGeometry(LayerName::Source, _)))
            .count()
    }
}

fn five_benches() -> String {
    osm_xml_nodes(&[
        (1, 10.0, 50.0),
        (2, 10.0005, 50.0),
        (3, 10.001, 50.001),
        (4, 9.999, 49.999),
        (5, 10.0015, 49.9985),
    ])
}

fn assemble(
    provider: Arc<dyn RemoteDataProvider>,
    converter: Arc<dyn FormatConverter>,
    config: impl FnOnce(SyncConfig) -> SyncConfig,
) -> (TempDir, BboxFetchPipeline, Arc<RecordingSurface>) {
    let dir = TempDir::new().expect("create staging dir");
    let staging = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 staging dir");
    let sync_config = config(SyncConfig::with_staging_dir(staging));
    let surface = Arc::new(RecordingSurface::default());
    let layers = Arc::new(GeometryLayerSet::new(surface.clone(), Arc::new(DefaultStyles)));
    let pipeline = BboxFetchPipeline::new(
        sync_config,
        PipelineParts {
            provider,
            converter,
            index: Arc::new(FeatureIndex::default()),
            layers,
        },
    );
    (dir, pipeline, surface)
}

fn build(
    provider: ScriptedProvider,
    converter: Arc<dyn FormatConverter>,
    config: impl FnOnce(SyncConfig) -> SyncConfig,
) -> Harness {
    let provider = Arc::new(provider);
    let (dir, pipeline, surface) = assemble(provider.clone(), converter, config);
    Harness {
        _dir: dir,
        pipeline,
        provider,
        surface,
    }
}

/// Clock of the pipeline under test, handed to collaborators after assembly.
#[derive(Default)]
struct LateClock(OnceLock<GenerationClock>);

impl LateClock {
    fn attach(&self, pipeline: &BboxFetchPipeline) {
        self.0
            .set(pipeline.clock.clone())
            .expect("clock attached once");
    }

    fn start_newer_operation(&self) {
        if let Some(clock) = self.0.get() {
            clock.invalidate();
        }
    }
}

/// Answers from a script and starts a newer operation before returning.
struct InterruptingProvider {
    script: ScriptedProvider,
    clock: LateClock,
}

impl RemoteDataProvider for InterruptingProvider {
    fn fetch(&self, bbox: &BoundingBox) -> Result<RawPayload, FetchError> {
        let response = self.script.fetch(bbox);
        self.clock.start_newer_operation();
        response
    }
}

/// Converts in process and starts a newer operation before returning.
#[derive(Default)]
struct InterruptingConverter {
    clock: LateClock,
}

impl FormatConverter for InterruptingConverter {
    fn convert(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), ConversionError> {
        BuiltinConverter.convert(input, output)?;
        self.clock.start_newer_operation();
        Ok(())
    }
}

#[fixture]
fn harness() -> Harness {
    build(
        ScriptedProvider::new([Ok(RawPayload::from(five_benches().as_str()))]),
        Arc::new(BuiltinConverter),
        |config| config,
    )
}

#[rstest]
fn first_viewport_publishes_downloaded_features(harness: Harness) {
    let outcome = harness.pipeline.sync(CENTER).expect("session succeeds");

    let Some(SessionOutcome::Published(report)) = outcome else {
        panic!("expected a publish, got {outcome:?}");
    };
    assert_eq!(report.indexed, 5);
    assert_eq!(report.rendered, 5);
    assert_eq!(report.attempts, 1);
    assert_eq!(harness.pipeline.index().len(), 5);
    assert_eq!(harness.pipeline.layers().layer(LayerName::Source).len(), 5);
    assert_eq!(harness.pipeline.published_center(), Some(CENTER));

    let tap = TapResolver::new(Arc::clone(harness.pipeline.layers()));
    let hits = tap.resolve(Coord { x: 10.001, y: 50.001 }, 1e-6);
    assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![ElementRef::node(3)]);
}

#[rstest]
fn request_uses_center_and_half_extent(harness: Harness) {
    harness.pipeline.sync(CENTER).expect("session succeeds");
    let requests = harness.provider.requests();
    assert_eq!(requests, vec![BoundingBox::around(CENTER, DEFAULT_HALF_EXTENT)]);
}

#[rstest]
fn object_limit_shrinks_until_accepted() {
    let harness = build(
        ScriptedProvider::rejecting(2, five_benches().as_str()),
        Arc::new(BuiltinConverter),
        |config| config,
    );

    let outcome = harness.pipeline.sync(CENTER).expect("session succeeds");

    assert!(matches!(outcome, Some(SessionOutcome::Published(PublishReport { attempts: 3, .. }))));
    assert!((harness.pipeline.half_extent() - 0.001_125).abs() < 1e-12);
    let extents: Vec<f64> = harness
        .provider
        .requests()
        .iter()
        .map(|bbox| bbox.half_extent)
        .collect();
    assert_eq!(extents.len(), 3);
    assert!(extents.windows(2).all(|pair| pair[1] < pair[0]));
    assert_eq!(harness.source_publishes(), 1);
}

#[rstest]
fn shrinking_stops_at_the_floor() {
    let harness = build(
        ScriptedProvider::rejecting(5, five_benches().as_str()),
        Arc::new(BuiltinConverter),
        |config| {
            config
                .with_min_half_extent(Some(0.0014))
                .expect("valid floor")
        },
    );

    let err = harness.pipeline.sync(CENTER).expect_err("floor reached");

    let SyncError::HalfExtentExhausted { half_extent } = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert!((half_extent - 0.0015).abs() < 1e-12);
    assert!((harness.pipeline.half_extent() - 0.0015).abs() < 1e-12);
    assert_eq!(harness.provider.requests().len(), 2);
    assert!(harness.pipeline.index().is_empty());
}

#[rstest]
fn transport_errors_are_terminal_and_allow_a_new_attempt() {
    let harness = build(
        ScriptedProvider::new([Err(FetchError::Http {
            url: "https://api.example/map".to_owned(),
            status: 509,
            message: "bandwidth limit".to_owned(),
        })]),
        Arc::new(BuiltinConverter),
        |config| config,
    );

    let err = harness.pipeline.sync(CENTER).expect_err("server failure");

    assert!(matches!(err, SyncError::Transport { .. }));
    assert_eq!(harness.provider.requests().len(), 1);
    assert_eq!(harness.source_publishes(), 0);
    assert!(harness.pipeline.on_viewport_changed(CENTER).is_some());
}

#[rstest]
fn conversion_failure_leaves_index_untouched() {
    let harness = build(
        ScriptedProvider::new([Ok(RawPayload::from(five_benches().as_str()))]),
        Arc::new(FailingConverter),
        |config| config,
    );

    let err = harness.pipeline.sync(CENTER).expect_err("converter fails");

    assert!(matches!(err, SyncError::Conversion { .. }));
    assert!(harness.pipeline.index().is_empty());
    assert_eq!(harness.source_publishes(), 0);
}

#[rstest]
fn malformed_payload_is_a_terminal_failure() {
    let harness = build(
        ScriptedProvider::new([Ok(RawPayload::from("<osm><node id=\"x\"/></osm>"))]),
        Arc::new(BuiltinConverter),
        |config| config,
    );

    let err = harness.pipeline.sync(CENTER).expect_err("bad payload");

    assert!(matches!(err, SyncError::Conversion { .. } | SyncError::Decode { .. }));
    assert!(harness.pipeline.index().is_empty());
}

#[rstest]
#[case(Coord { x: 10.0019, y: 49.9981 }, false)]
#[case(Coord { x: 10.0021, y: 50.0 }, true)]
#[case(Coord { x: 10.0, y: 49.99 }, true)]
fn viewport_inside_published_area_does_not_fetch(
    harness: Harness,
    #[case] next: Coord<f64>,
    #[case] fetches: bool,
) {
    harness.pipeline.sync(CENTER).expect("session succeeds");
    assert_eq!(harness.pipeline.on_viewport_changed(next).is_some(), fetches);
}

#[rstest]
fn viewport_inside_live_session_does_not_restart_it(harness: Harness) {
    let first = harness.pipeline.on_viewport_changed(CENTER).expect("new session");
    assert!(harness
        .pipeline
        .on_viewport_changed(Coord { x: 10.001, y: 50.0 })
        .is_none());
    assert!(first.is_live());

    let second = harness
        .pipeline
        .on_viewport_changed(Coord { x: 11.0, y: 50.0 })
        .expect("outside the live area");
    assert!(!first.is_live());
    assert!(second.is_live());
    assert!(second.operation() > first.operation());
}

#[rstest]
fn superseded_session_publishes_nothing(harness: Harness) {
    let stale = harness.pipeline.on_viewport_changed(CENTER).expect("new session");
    let _newer = harness
        .pipeline
        .on_viewport_changed(Coord { x: 12.0, y: 51.0 })
        .expect("newer session");

    let outcome = harness.pipeline.run(stale).expect("superseded is not an error");

    assert_eq!(
        outcome,
        SessionOutcome::Superseded {
            operation: 1,
            checkpoint: Checkpoint::BeforeFetch,
        }
    );
    assert!(harness.provider.requests().is_empty());
    assert!(harness.pipeline.index().is_empty());
    assert_eq!(harness.source_publishes(), 0);
}

#[rstest]
fn cancel_invalidates_pending_sessions(harness: Harness) {
    let pending = harness.pipeline.on_viewport_changed(CENTER).expect("new session");
    harness.pipeline.cancel();
    assert!(!pending.is_live());
    assert!(harness.pipeline.on_viewport_changed(CENTER).is_some());
}

#[rstest]
fn shrunk_half_extent_carries_into_the_next_session() {
    let harness = build(
        ScriptedProvider::rejecting(1, five_benches().as_str()),
        Arc::new(BuiltinConverter),
        |config| config,
    );
    harness.pipeline.sync(CENTER).expect("first session");
    harness.provider.push(Ok(RawPayload::from(osm_xml_nodes(&[]).as_str())));

    harness
        .pipeline
        .sync(Coord { x: 20.0, y: 20.0 })
        .expect("second session");

    let last = harness.provider.requests().last().copied().expect("request made");
    assert!((last.half_extent - 0.0015).abs() < 1e-12);
    assert!(harness.pipeline.index().is_empty());
}

#[rstest]
fn rejection_seen_after_supersession_stops_at_retry() {
    let provider = Arc::new(InterruptingProvider {
        script: ScriptedProvider::rejecting(1, five_benches().as_str()),
        clock: LateClock::default(),
    });
    let (_dir, pipeline, surface) =
        assemble(provider.clone(), Arc::new(BuiltinConverter), |config| config);
    provider.clock.attach(&pipeline);

    let outcome = pipeline.sync(CENTER).expect("superseded is not an error");

    assert_eq!(
        outcome,
        Some(SessionOutcome::Superseded {
            operation: 1,
            checkpoint: Checkpoint::Retry,
        })
    );
    assert!((pipeline.half_extent() - DEFAULT_HALF_EXTENT).abs() < 1e-12);
    assert_eq!(provider.script.requests().len(), 1);
    assert!(pipeline.index().is_empty());
    assert!(surface.calls().is_empty());
}

#[rstest]
fn supersession_during_conversion_publishes_nothing() {
    let converter = Arc::new(InterruptingConverter::default());
    let (_dir, pipeline, surface) = assemble(
        Arc::new(ScriptedProvider::new([Ok(RawPayload::from(
            five_benches().as_str(),
        ))])),
        converter.clone(),
        |config| config,
    );
    converter.clock.attach(&pipeline);

    let outcome = pipeline.sync(CENTER).expect("superseded is not an error");

    assert_eq!(
        outcome,
        Some(SessionOutcome::Superseded {
            operation: 1,
            checkpoint: Checkpoint::Converted,
        })
    );
    assert!(pipeline.index().is_empty());
    assert_eq!(pipeline.published_center(), None);
    assert!(surface.calls().is_empty());
}
