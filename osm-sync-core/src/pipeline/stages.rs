//! Work performed between liveness checkpoints.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use super::{Checkpoint, SessionToken, SyncError};
use crate::{Feature, FormatConverter, OsmDocument, RawPayload, SyncConfig, decode_geojson};

/// Result of a stage that may observe supersession.
#[derive(Debug)]
pub(super) enum Stage<T> {
    Done(T),
    Superseded(Checkpoint),
}

impl<T> Stage<T> {
    /// Run `next` on a finished stage; a superseded stage short-circuits.
    fn then<U>(
        self,
        next: impl FnOnce(T) -> Result<Stage<U>, SyncError>,
    ) -> Result<Stage<U>, SyncError> {
        match self {
            Self::Done(value) => next(value),
            Self::Superseded(checkpoint) => Ok(Stage::Superseded(checkpoint)),
        }
    }
}

type Pass = fn(&OsmDocument) -> Vec<Feature>;

const PASSES: [Pass; 3] = [
    OsmDocument::node_features,
    OsmDocument::way_features,
    OsmDocument::relation_features,
];

/// Parse the raw payload into index entries.
///
/// Liveness is checked before parsing and between the node, way and relation
/// passes.
pub(super) fn index_payload(
    payload: &RawPayload,
    token: &SessionToken,
) -> Result<Stage<Vec<Feature>>, SyncError> {
    if !token.is_live() {
        return Ok(Stage::Superseded(Checkpoint::Indexing));
    }
    let document =
        OsmDocument::parse(payload.as_bytes()).map_err(|source| SyncError::Decode { source })?;
    let indexed = run_passes(&document, PASSES, token);
    if let Stage::Done(features) = &indexed {
        debug!(
            "operation {}: indexed {} features",
            token.generation(),
            features.len()
        );
    }
    Ok(indexed)
}

fn run_passes<P>(
    document: &OsmDocument,
    passes: impl IntoIterator<Item = P>,
    token: &SessionToken,
) -> Stage<Vec<Feature>>
where
    P: Fn(&OsmDocument) -> Vec<Feature>,
{
    let mut features = Vec::with_capacity(document.element_count());
    for pass in passes {
        if !token.is_live() {
            return Stage::Superseded(Checkpoint::Indexing);
        }
        features.extend(pass(document));
    }
    Stage::Done(features)
}

/// Write the payload to the staging slot, convert it and decode the result.
///
/// The caller must hold the staging lock for the duration of the call.
pub(super) fn stage_and_convert(
    config: &SyncConfig,
    converter: &dyn FormatConverter,
    payload: &RawPayload,
    token: &SessionToken,
) -> Result<Stage<Vec<Feature>>, SyncError> {
    stage_payload(config, payload, token)?
        .then(|input| run_converter(config, converter, &input, token))?
        .then(|output| decode_output(&output, token))
}

fn stage_payload(
    config: &SyncConfig,
    payload: &RawPayload,
    token: &SessionToken,
) -> Result<Stage<Utf8PathBuf>, SyncError> {
    let input = config.staged_input();
    osm_sync_fs::write_file(&input, payload.as_bytes()).map_err(|source| {
        SyncError::Staging {
            path: input.clone(),
            source,
        }
    })?;
    if !token.is_live() {
        return Ok(Stage::Superseded(Checkpoint::Staged));
    }
    debug!("operation {}: staged payload at {input}", token.generation());
    Ok(Stage::Done(input))
}

fn run_converter(
    config: &SyncConfig,
    converter: &dyn FormatConverter,
    input: &Utf8Path,
    token: &SessionToken,
) -> Result<Stage<Utf8PathBuf>, SyncError> {
    let output = config.staged_output();
    converter
        .convert(input, &output)
        .map_err(|source| SyncError::Conversion { source })?;
    if !token.is_live() {
        return Ok(Stage::Superseded(Checkpoint::Converted));
    }
    Ok(Stage::Done(output))
}

fn decode_output(
    output: &Utf8Path,
    token: &SessionToken,
) -> Result<Stage<Vec<Feature>>, SyncError> {
    let bytes = osm_sync_fs::read_file(output).map_err(|source| SyncError::Staging {
        path: output.to_path_buf(),
        source,
    })?;
    let features = decode_geojson(&bytes).map_err(|source| SyncError::Decode { source })?;
    if !token.is_live() {
        return Ok(Stage::Superseded(Checkpoint::Decoded));
    }
    debug!(
        "operation {}: decoded {} renderable features",
        token.generation(),
        features.len()
    );
    Ok(Stage::Done(features))
}
