//! Shared test harness modules for the nodestore CLI.

use super::*;
use crate::ingest::{config_from_layers_for_test, resolve_ingest_config};

mod helpers;
mod steps;
