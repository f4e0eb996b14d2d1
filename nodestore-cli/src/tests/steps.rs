//! Behaviour-driven step definitions driving the ingest command configuration
//! scenarios.

use super::helpers::{DatasetFiles, LayerOverrides, compose_layers};
use super::*;
use camino::Utf8PathBuf;
use nodestore_core::DEFAULT_BATCH_SIZE;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

const CONFIG_BATCH_SIZE: u64 = 500;

/// Aggregates ingest CLI scenario state so each step only needs a single world
/// argument.
#[derive(Debug)]
struct IngestWorld {
    dataset_files: DatasetFiles,
    cli_args: RefCell<Vec<String>>,
    cli_result: RefCell<Option<Result<IngestConfig, CliError>>>,
    config_layer: RefCell<Option<LayerOverrides>>,
    env_layer: RefCell<Option<LayerOverrides>>,
}

impl IngestWorld {
    fn new() -> Self {
        Self {
            dataset_files: DatasetFiles::new(),
            cli_args: RefCell::new(Vec::new()),
            cli_result: RefCell::new(None),
            config_layer: RefCell::new(None),
            env_layer: RefCell::new(None),
        }
    }

    fn dataset_files(&self) -> &DatasetFiles {
        &self.dataset_files
    }

    fn with_config<T>(&self, check: impl FnOnce(&IngestConfig) -> T) -> T {
        let borrowed = self.cli_result.borrow();
        let config = borrowed
            .as_ref()
            .expect("result recorded")
            .as_ref()
            .expect("expected success");
        check(config)
    }
}

#[fixture]
fn world() -> IngestWorld {
    IngestWorld::new()
}

/// Mirror parsed arguments into a CLI merge layer.
fn cli_layer(args: &IngestArgs) -> LayerOverrides {
    LayerOverrides {
        source: args.source.clone(),
        destination: args.destination.clone(),
        batch_size: args.batch_size.map(std::num::NonZeroU64::get),
        label_key: args.label_key.clone(),
    }
}

#[given("a source extract exists on disk")]
fn source_exists(#[from(world)] world: &IngestWorld) {
    let dataset = world.dataset_files();
    assert!(
        dataset.source().exists(),
        "expected the source extract to exist on disk",
    );
    assert!(
        dataset.config_source().exists(),
        "expected the configured extract to exist on disk",
    );
}

#[given("I pass the source and destination as arguments")]
fn cli_provides_paths(#[from(world)] world: &IngestWorld) {
    let dataset = world.dataset_files();
    world.cli_args.borrow_mut().extend([
        dataset.source().as_str().to_owned(),
        dataset.destination().into_string(),
    ]);
}

#[given("I omit all path configuration")]
fn omit_configuration(#[from(world)] world: &IngestWorld) {
    world.cli_args.borrow_mut().clear();
    world.config_layer.replace(None);
    world.env_layer.replace(None);
}

#[given("the paths and batch size are provided via a config file")]
fn provided_via_config(#[from(world)] world: &IngestWorld) {
    let dataset = world.dataset_files();
    world.config_layer.replace(Some(LayerOverrides {
        source: Some(dataset.config_source().to_path_buf()),
        destination: Some(dataset.config_destination()),
        batch_size: Some(CONFIG_BATCH_SIZE),
        ..LayerOverrides::default()
    }));
}

#[given("the destination is overridden via environment variables")]
fn destination_overridden_by_env(#[from(world)] world: &IngestWorld) {
    let dataset = world.dataset_files();
    world.env_layer.replace(Some(LayerOverrides {
        destination: Some(dataset.destination()),
        ..LayerOverrides::default()
    }));
}

#[given("I pass only the source argument")]
fn cli_only_source(#[from(world)] world: &IngestWorld) {
    let dataset = world.dataset_files();
    world
        .cli_args
        .borrow_mut()
        .push(dataset.source().as_str().to_owned());
}

#[when("I configure the ingest command")]
fn configure_ingest(#[from(world)] world: &IngestWorld) {
    let mut invocation = vec![BIN_NAME.to_owned()];
    invocation.extend(world.cli_args.borrow().iter().cloned());
    let file_layer = world.config_layer.borrow().clone();
    let env_layer = world.env_layer.borrow().clone();
    let outcome = IngestArgs::try_parse_from(invocation)
        .map_err(CliError::ArgumentParsing)
        .and_then(|args| {
            if file_layer.is_none() && env_layer.is_none() {
                return resolve_ingest_config(args);
            }
            let composer =
                compose_layers(file_layer.as_ref(), env_layer.as_ref(), &cli_layer(&args));
            let config = config_from_layers_for_test(composer.layers())?;
            config.validate_sources()?;
            Ok(config)
        });
    world.cli_result.replace(Some(outcome));
}

#[then("the ingest plan uses the argument paths")]
fn plan_uses_argument_paths(#[from(world)] world: &IngestWorld) {
    let dataset = world.dataset_files();
    world.with_config(|config| {
        assert_eq!(config.source, dataset.source().to_path_buf());
        assert_eq!(config.destination, dataset.destination());
    });
}

#[then("the ingest plan uses the default tuning")]
fn plan_uses_default_tuning(#[from(world)] world: &IngestWorld) {
    world.with_config(|config| {
        assert_eq!(config.ingest.pipeline.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.ingest.label.key(), Some(DEFAULT_LABEL_KEY));
    });
}

#[then("the CLI reports that \"source\" is missing")]
fn reports_missing_source(#[from(world)] world: &IngestWorld) {
    let borrowed = world.cli_result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::MissingArgument { field, env } => {
            assert_eq!(*field, ARG_SOURCE);
            assert_eq!(*env, ENV_SOURCE);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[then("the ingest plan uses the CLI source")]
fn plan_uses_cli_source(#[from(world)] world: &IngestWorld) {
    let expected: Utf8PathBuf = world.dataset_files().source().to_path_buf();
    world.with_config(|config| assert_eq!(config.source, expected));
}

#[then("the ingest plan uses the environment destination")]
fn plan_uses_env_destination(#[from(world)] world: &IngestWorld) {
    let expected = world.dataset_files().destination();
    world.with_config(|config| assert_eq!(config.destination, expected));
}

#[then("the ingest plan uses the configured batch size")]
fn plan_uses_config_batch_size(#[from(world)] world: &IngestWorld) {
    world.with_config(|config| {
        assert_eq!(config.ingest.pipeline.batch_size.get(), CONFIG_BATCH_SIZE);
    });
}

macro_rules! register_ingest_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/ingest_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: IngestWorld) {
            let _ = world;
        }
    };
}

register_ingest_scenario!(
    positional_selection,
    "selecting paths via positional arguments"
);
register_ingest_scenario!(rejecting_missing_args, "rejecting missing arguments");
register_ingest_scenario!(
    layering_cli_config_env,
    "layering CLI, config file, and environment values"
);
