#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod mock;

pub use mock::{
    ConsumerEvent, MockEngine, MockEngineConfig, MockEngineLoader, MockImageSource,
    MockJobConsumer, MockJobQueue, encode_png,
};
