pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod global;
pub mod graph;
pub mod pipeline;
pub mod sources;

pub use config::{Config, ConfigError, LiveUpdate, MixConfig, SourceMode, SourceParams};
pub use graph::{FilterGraph, SecondaryInput};
pub use pipeline::{BrowserState, MixerMachine, PipelineSnapshot, ProcessState};
pub use sources::{SourceHandle, SourceManager};
