//! Matchmaking - join codes and the live match registry

pub mod invite;
pub mod registry;

pub use registry::{JoinTicket, MatchRegistry, RegistryError, Seat};
