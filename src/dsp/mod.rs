//! Offline audio: clip playback, keyed tones, noise, the render graph and
//! WAV output.
//!
//! Everything renders ahead of time into a buffer. The same code serves the
//! native scheduler and the WASM `render_morse_wav` export.

pub mod buffer;
pub mod envelope;
pub mod graph;
pub mod mixer;
pub mod noise;
pub mod oscillator;
pub mod renderer;
pub mod sampler;
