// Core of the song-of-the-day bracket: the domain model, the collaborator
// contracts the engine talks through, and the vote engine itself.

pub mod bracket;
pub mod engine;
pub mod error;
pub mod ports;

#[cfg(test)]
mod testkit;
