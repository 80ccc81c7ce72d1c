//! Session and artifact services
//!
//! Each service has an ephemeral in-process implementation and a client for
//! the managed cloud store. `SessionBackend` / `ArtifactBackend` pick one
//! from the startup configuration.

pub mod artifact;
pub mod auth;
pub mod backend;
pub mod gcs_artifact;
pub mod session;
pub mod vertex_session;

pub use artifact::{Artifact, ArtifactKey, ArtifactService, InMemoryArtifactService};
pub use auth::{token_provider, MetadataTokenProvider, TokenProvider, TokenSource};
pub use backend::{ArtifactBackend, Services, SessionBackend};
pub use gcs_artifact::GcsArtifactService;
pub use session::{InMemorySessionService, Session, SessionService};
pub use vertex_session::VertexAiSessionService;
