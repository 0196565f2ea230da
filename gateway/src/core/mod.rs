pub mod tts;

pub use tts::{
    AudioChunk, AudioFormat, SynthesisConfig, SynthesizedAudio, Synthesizer, TTSError, TTSResult,
    create_synthesizer, get_supported_engines,
};
