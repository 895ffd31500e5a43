/// Runtime module - Gateway

mod launcher;
mod non_interactive;

pub use launcher::Launcher;
pub use non_interactive::{
    ExecutionMetadata, ModelResult, NonInteractiveResult, NonInteractiveRunner,
};
