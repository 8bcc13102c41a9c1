pub mod loopback;
pub mod port;

#[cfg(feature = "audio")]
pub mod wav;

#[cfg(feature = "audio-live")]
pub mod cpal_port;

pub use loopback::{LoopbackAudioPort, LoopbackMedium};
pub use port::AudioPort;

#[cfg(feature = "audio")]
pub use wav::{read_wav, write_wav, WavPlayer, WavRecorder};

#[cfg(feature = "audio-live")]
pub use cpal_port::CpalAudioPort;
