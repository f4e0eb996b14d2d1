//! Decoder adapter turning an OSM PBF stream into ordered [`Record`]s.
//!
//! A reader thread pulls blobs sequentially and hands them to a fixed pool of
//! `parallelism` decoder threads. Each blob gets its own reply channel, and
//! the reply channels are queued in blob order, so consumers see a single
//! ordered stream while decoding runs ahead of them.

use std::{
    collections::VecDeque,
    io::{BufReader, Read},
    num::NonZeroUsize,
    panic,
    thread::{self, JoinHandle},
};

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::debug;
use nodestore_core::{LabelProjection, OsmNode, Record};
use osmpbf::{Blob, BlobDecode, BlobReader, Element, PrimitiveBlock};
use thiserror::Error;

/// Label used in errors when the source is not a file.
const READER_SOURCE: &str = "<reader>";

/// Error raised when the source cannot be opened.
#[derive(Debug, Error)]
#[error("failed to open OSM PBF file at {path}")]
pub struct OpenSourceError {
    /// Path that failed to open.
    pub path: Utf8PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Error raised when a blob cannot be read or decoded.
#[derive(Debug, Error)]
#[error("failed to decode OSM PBF data from {source_name} (blob {blob})")]
pub struct DecodeError {
    /// Path of the source, or `<reader>` for in-memory streams.
    pub source_name: Utf8PathBuf,
    /// Zero-based index of the failing blob.
    pub blob: u64,
    /// Error reported by `osmpbf`.
    #[source]
    pub source: osmpbf::Error,
}

/// Lazy, ordered record stream over an OSM PBF source.
///
/// The iterator yields `Some(Ok(record))` per element, `Some(Err(_))` once on
/// a read or decode failure, and `None` afterwards or at end of stream.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use nodestore_core::{LabelProjection, Record};
/// use nodestore_data::PbfRecordSource;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = PbfRecordSource::open(Utf8Path::new("berlin.osm.pbf"))?
///     .with_label_projection(LabelProjection::from_key("name"));
/// for record in source {
///     if let Record::Node(node) = record? {
///         println!("{} {:?}", node.id, node.label);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct PbfRecordSource<R: Read + Send + 'static> {
    source_name: Utf8PathBuf,
    label: LabelProjection,
    parallelism: NonZeroUsize,
    queued: VecDeque<Record>,
    state: SourceState<R>,
}

enum SourceState<R> {
    Idle(R),
    Running(DecodePipeline),
    Done,
}

type DecodeOutcome = Result<Vec<Record>, osmpbf::Error>;

/// Decoded records of one blob, in the order blobs were read.
struct PendingBlob {
    index: u64,
    outcome: Receiver<DecodeOutcome>,
}

struct DecodeJob {
    blob: Blob,
    reply: Sender<DecodeOutcome>,
}

/// Background reader and decoder threads for one source.
struct DecodePipeline {
    pending: Receiver<PendingBlob>,
    threads: Vec<JoinHandle<()>>,
}

impl PbfRecordSource<BufReader<cap_std::fs_utf8::File>> {
    /// Open a PBF file.
    pub fn open(path: &Utf8Path) -> Result<Self, OpenSourceError> {
        let file = nodestore_fs::open_utf8_file(path).map_err(|source| OpenSourceError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::with_source_name(
            BufReader::new(file),
            path.to_path_buf(),
        ))
    }
}

impl<R: Read + Send + 'static> PbfRecordSource<R> {
    /// Wrap an arbitrary byte stream.
    pub fn from_reader(reader: R) -> Self {
        Self::with_source_name(reader, Utf8PathBuf::from(READER_SOURCE))
    }

    fn with_source_name(reader: R, source_name: Utf8PathBuf) -> Self {
        Self {
            source_name,
            label: LabelProjection::none(),
            parallelism: NonZeroUsize::MIN,
            queued: VecDeque::new(),
            state: SourceState::Idle(reader),
        }
    }

    /// Decode up to `parallelism` blobs at once.
    ///
    /// Takes effect when the first record is pulled.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: NonZeroUsize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Choose which tag becomes the node label.
    #[must_use]
    pub fn with_label_projection(mut self, label: LabelProjection) -> Self {
        self.label = label;
        self
    }

    /// Path or placeholder name of the source.
    #[must_use]
    pub fn source_name(&self) -> &Utf8Path {
        &self.source_name
    }

    /// Wait for the next blob and queue its records.
    ///
    /// Returns `Ok(false)` at the end of the stream.
    fn refill(&mut self) -> Result<bool, DecodeError> {
        let pipeline = match std::mem::replace(&mut self.state, SourceState::Done) {
            SourceState::Idle(reader) => {
                DecodePipeline::start(reader, self.parallelism, &self.label)
            }
            SourceState::Running(pipeline) => pipeline,
            SourceState::Done => return Ok(false),
        };

        let Ok(PendingBlob { index, outcome }) = pipeline.pending.recv() else {
            pipeline.join();
            return Ok(false);
        };
        match outcome.recv() {
            Ok(Ok(records)) => {
                self.queued.extend(records);
                self.state = SourceState::Running(pipeline);
                Ok(true)
            }
            Ok(Err(source)) => Err(DecodeError {
                source_name: self.source_name.clone(),
                blob: index,
                source,
            }),
            Err(_) => {
                pipeline.join();
                Ok(false)
            }
        }
    }
}

impl<R: Read + Send + 'static> Iterator for PbfRecordSource<R> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.queued.pop_front() {
                return Some(Ok(record));
            }
            match self.refill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<R: Read + Send + 'static> std::iter::FusedIterator for PbfRecordSource<R> {}

impl DecodePipeline {
    fn start<R>(reader: R, parallelism: NonZeroUsize, label: &LabelProjection) -> Self
    where
        R: Read + Send + 'static,
    {
        let workers = parallelism.get();
        let (jobs_tx, jobs_rx) = bounded::<DecodeJob>(workers);
        let (pending_tx, pending_rx) = bounded::<PendingBlob>(workers.saturating_mul(2));

        let mut threads: Vec<_> = (0..workers)
            .map(|_| {
                let jobs = jobs_rx.clone();
                let label = label.clone();
                thread::spawn(move || decode_worker(&jobs, &label))
            })
            .collect();
        threads.push(thread::spawn(move || {
            read_blobs(BlobReader::new(reader), &pending_tx, &jobs_tx);
        }));

        Self {
            pending: pending_rx,
            threads,
        }
    }

    /// Wait for every thread, re-raising the first panic.
    fn join(self) {
        let Self { pending, threads } = self;
        drop(pending);
        for handle in threads {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
        }
    }
}

/// Read blobs in order, queueing a reply channel for each before handing the
/// blob to the decoders. Stops after the first read error or once the
/// consumer goes away.
fn read_blobs<R: Read + Send>(
    blobs: BlobReader<R>,
    pending: &Sender<PendingBlob>,
    jobs: &Sender<DecodeJob>,
) {
    for (index, blob) in (0_u64..).zip(blobs) {
        let (reply, outcome) = bounded(1);
        if pending.send(PendingBlob { index, outcome }).is_err() {
            return;
        }
        match blob {
            Ok(blob) => {
                if jobs.send(DecodeJob { blob, reply }).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        }
    }
}

fn decode_worker(jobs: &Receiver<DecodeJob>, label: &LabelProjection) {
    for DecodeJob { blob, reply } in jobs {
        if reply.send(decode_blob(&blob, label)).is_err() {
            return;
        }
    }
}

fn decode_blob(blob: &Blob, label: &LabelProjection) -> Result<Vec<Record>, osmpbf::Error> {
    match blob.decode()? {
        BlobDecode::OsmData(block) => Ok(block_records(&block, label)),
        BlobDecode::OsmHeader(_) => Ok(Vec::new()),
        BlobDecode::Unknown(kind) => {
            debug!("Skipping blob of unknown type {kind}");
            Ok(Vec::new())
        }
    }
}

fn block_records(block: &PrimitiveBlock, label: &LabelProjection) -> Vec<Record> {
    block
        .elements()
        .map(|element| match element {
            Element::Node(node) => Record::Node(OsmNode {
                id: node.id(),
                lat: node.lat(),
                lon: node.lon(),
                label: label.project(node.tags()),
            }),
            Element::DenseNode(node) => Record::Node(OsmNode {
                id: node.id(),
                lat: node.lat(),
                lon: node.lon(),
                label: label.project(node.tags()),
            }),
            Element::Way(way) => Record::Way { id: way.id() },
            Element::Relation(relation) => Record::Relation { id: relation.id() },
        })
        .collect()
}
