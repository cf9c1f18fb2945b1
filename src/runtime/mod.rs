//! Runtime adapters and the entry-point API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    ContextArgs, Health, MessageService, SendMessageRequest, SendStatus, Topics, ACCEPTED_MESSAGE,
};
pub use tokio_spawner::TokioSpawner;
