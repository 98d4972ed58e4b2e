#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

//! # ocrq core
//!
//! Data model, geometry and capability traits shared by the proxy and the
//! worker. Nothing in this crate performs broker or network I/O.

/// Tracing target for batch normalization.
pub const TRACING_TARGET_NORMALIZE: &str = "ocrq_core::normalize";

mod error;

pub mod answer;
pub mod engine;
pub mod geometry;
pub mod job;
pub mod mapper;
pub mod normalize;
pub mod page;
pub mod region;
pub mod source;

pub use answer::{
    Answer, LineTranscription, OcrAnswer, OcrEngineInfo, OcrResult, RegionTranscription,
};
pub use engine::{EngineLoader, LineRecognition, RecognitionEngine};
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use geometry::{BBox, Point, Polygon};
pub use job::{
    Job, JobArgs, JobConsumer, JobDelivery, JobId, JobOutcome, JobQueue, JobState, OcrMode,
    TaskKind,
};
pub use mapper::{Merge, Shift};
pub use normalize::{BatchEntry, NormalizedBatch, Normalizer, TargetShape};
pub use page::{
    CharBox, LayoutBox, LayoutPage, OcrPage, TableCell, TableCol, TablePage, TableRow, TextLine,
};
pub use region::{PixelBox, Region};
pub use source::{FetchedImage, ImageSource};
