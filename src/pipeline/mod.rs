pub mod mixer_machine;
pub mod status;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use mixer_machine::MixerMachine;
pub use status::{BrowserState, PipelineSnapshot, PipelineStatusHandle, ProcessState};
pub use supervisor::EngineSupervisor;
