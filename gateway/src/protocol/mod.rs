//! Wire protocol shared by the gateway and the client adapter.

pub mod messages;
pub mod validation;

pub use messages::{
    AudioMetadata, ChunkMetadata, IncomingMessage, OutgoingMessage, PingData, PongData,
    ProtocolError, ResponseStatus, StreamChunkData, StreamCompleteData, StreamSummary,
    SynthesisOptions, SynthesisRequestData, SynthesisResponseData,
};
pub use validation::{
    Emotion, Language, ValidatedRequest, ValidationError, validate_synthesis_config,
};
