//! Projects
//!
//! The per-user resource behind `/api/projects`.

pub mod model;
pub mod store;

pub use model::{
    CreateProjectBody, NewProject, Project, ProjectChanges, ProjectStatus, UpdateProjectBody,
    ValidationErrors,
};
pub use store::{InMemoryProjectStore, ProjectStore};
