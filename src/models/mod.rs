// Core data models for cubetrack
// These structs represent the domain entities

pub mod face;
pub mod task;
pub mod session;
pub mod credential;

pub use face::*;
pub use task::*;
pub use session::*;
pub use credential::*;
