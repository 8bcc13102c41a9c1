pub mod error;
pub mod config;
pub mod frame;

#[cfg(feature = "audio-core")]
pub mod tone;
#[cfg(feature = "audio-core")]
pub mod spectrum;
#[cfg(feature = "audio-core")]
pub mod codec;
#[cfg(feature = "audio-core")]
pub mod preamble;
#[cfg(feature = "audio-core")]
pub mod slicer;
#[cfg(feature = "audio-core")]
pub mod framer;

pub mod queue;

#[cfg(feature = "audio-core")]
pub mod mac;

pub mod audio;

pub use error::MacError;
pub use config::Config;
pub use frame::{
    BitString, CtsFrame, DataFrame, Destination, InboundRecord, MessageId, NodeId, OutboundItem,
    RtsFrame,
};
pub use queue::OutboundQueue;

#[cfg(feature = "audio-core")]
pub use mac::Mac;
