//! Test helpers for staging ingest inputs and layered overrides.

use base64::{Engine as _, engine::general_purpose};
use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::MergeComposer;
use serde_json::{Map, Value};
use std::fs;
use tempfile::TempDir;

/// Fields a single configuration layer may set.
#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) source: Option<Utf8PathBuf>,
    pub(super) destination: Option<Utf8PathBuf>,
    pub(super) batch_size: Option<u64>,
    pub(super) label_key: Option<String>,
}

impl LayerOverrides {
    fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(source) = &self.source {
            map.insert("source".to_owned(), Value::from(source.as_str()));
        }
        if let Some(destination) = &self.destination {
            map.insert("destination".to_owned(), Value::from(destination.as_str()));
        }
        if let Some(batch_size) = self.batch_size {
            map.insert("batch_size".to_owned(), Value::from(batch_size));
        }
        if let Some(label_key) = &self.label_key {
            map.insert("label_key".to_owned(), Value::from(label_key.as_str()));
        }
        Value::Object(map)
    }
}

/// Build the merge layers in precedence order: file, environment, CLI.
pub(super) fn compose_layers(
    file_layer: Option<&LayerOverrides>,
    env_layer: Option<&LayerOverrides>,
    cli_layer: &LayerOverrides,
) -> MergeComposer {
    let mut composer = MergeComposer::new();
    if let Some(layer) = file_layer {
        composer.push_file(layer.to_json(), None);
    }
    if let Some(layer) = env_layer {
        composer.push_environment(layer.to_json());
    }
    composer.push_cli(cli_layer.to_json());
    composer
}

/// Placeholder inputs for configuration tests; contents are never decoded.
#[derive(Debug)]
pub(super) struct DatasetFiles {
    dir: TempDir,
    cli_source: Utf8PathBuf,
    config_source: Utf8PathBuf,
}

impl DatasetFiles {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = utf8_root(&dir);
        let cli_source = root.join("cli.osm.pbf");
        let config_source = root.join("config.osm.pbf");
        for path in [&cli_source, &config_source] {
            fs::write(path, b"dataset contents").expect("write dataset file");
        }
        Self {
            dir,
            cli_source,
            config_source,
        }
    }

    pub(super) fn source(&self) -> &Utf8Path {
        &self.cli_source
    }

    pub(super) fn config_source(&self) -> &Utf8Path {
        &self.config_source
    }

    pub(super) fn destination(&self) -> Utf8PathBuf {
        utf8_root(&self.dir).join("out/cli.db")
    }

    pub(super) fn config_destination(&self) -> Utf8PathBuf {
        utf8_root(&self.dir).join("out/config.db")
    }
}

/// Temporary directory as a UTF-8 path.
pub(super) fn utf8_root(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir")
}

/// Decode a Base64 PBF fixture from `tests/fixtures` into `workspace`.
pub(super) fn decode_pbf_fixture(workspace: &Utf8Path, stem: &str) -> Utf8PathBuf {
    let encoded_path = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(format!("{stem}.osm.pbf.b64"));
    let encoded = fs::read_to_string(&encoded_path).unwrap_or_else(|err| {
        panic!("failed to read base64 fixture {encoded_path}: {err}");
    });
    let cleaned: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let decoded = general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .unwrap_or_else(|err| panic!("failed to decode base64 fixture {encoded_path}: {err}"));
    let target = workspace.join(format!("{stem}.osm.pbf"));
    fs::write(&target, decoded).unwrap_or_else(|err| {
        panic!("failed to write decoded fixture {target}: {err}");
    });
    target
}
