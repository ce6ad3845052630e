pub mod id_generator;
pub mod space;

pub use space::{ParticipantKind, ParticipantSpec, SpaceConfig, SpaceDefinition, TokenSpec};
