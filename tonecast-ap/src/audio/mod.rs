//! Audio formats, decoding, and native output devices

pub mod backend;
pub mod decoder;
pub mod output;
pub mod source;
pub mod types;

pub use backend::{DeviceDescriptor, OutputBackend, OutputDevice, Submission};
pub use decoder::SymphoniaSource;
pub use output::CpalBackend;
pub use source::AudioSource;
pub use types::AudioFormat;
