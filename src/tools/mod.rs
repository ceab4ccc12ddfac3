//! Tool adapters for the kitchen agents

pub mod microwave;
pub mod music;

pub use microwave::{
    HttpMicrowave, MicrowaveDevice, MicrowaveError, MicrowaveState, MicrowaveTools,
    MicrowaveUpdate, SimulatedMicrowave,
};
pub use music::{HttpMusicPlayer, InMemoryMusicPlayer, MusicError, MusicPlayer, MusicTools};
