pub mod error;
pub mod handlers;
pub mod init;
pub mod models;
pub mod pipeline;
pub mod upstream;

pub use crate::init::{AppState, Config};
pub use crate::models::{AskRequest, PetProfile};
pub use crate::pipeline::{AskPipeline, StreamEvent};
