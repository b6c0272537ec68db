//! Processed data: conversion from raw scans, manifest, and windowed samples.

pub mod dataset;
pub mod manifest;
pub mod preprocess;

pub use dataset::{BatchIterator, ForecastDataset, Sample, Split, WindowSpec};
pub use manifest::{ChannelStats, ProcessedManifest, SequenceEntry};
pub use preprocess::{PreprocessRequest, PreprocessSummary, preprocess};
