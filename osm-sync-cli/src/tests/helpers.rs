//! Test helpers shared by the sync command unit and behaviour tests.

use camino::Utf8PathBuf;
use tempfile::TempDir;

/// Temporary directory tree holding staging and edit store directories.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn staging_dir(&self) -> Utf8PathBuf {
        self.root.join("staging")
    }

    pub(super) fn edits_dir(&self) -> Utf8PathBuf {
        self.root.join("edits")
    }
}

/// Argument vector for `osm-sync sync` around `(lon, lat)` plus `extra`.
pub(super) fn sync_command_line(
    workspace: &Workspace,
    lon: &str,
    lat: &str,
    extra: &[String],
) -> Vec<String> {
    let mut argv = vec![
        "osm-sync".to_owned(),
        "sync".to_owned(),
        format!("--{}", crate::ARG_LON),
        lon.to_owned(),
        format!("--{}", crate::ARG_LAT),
        lat.to_owned(),
        format!("--{}", crate::ARG_STAGING_DIR),
        workspace.staging_dir().into_string(),
        format!("--{}", crate::ARG_EDITS_DIR),
        workspace.edits_dir().into_string(),
    ];
    argv.extend(extra.iter().cloned());
    argv
}
