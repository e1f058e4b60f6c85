// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Degraded-mode providers, used when `DISABLE_MODELS` is set and as the
//! default wiring in test rigs. Each returns the cheapest well-formed
//! answer its contract allows.

use std::path::PathBuf;

use crate::assets::atomic_write;
use crate::error::PipelineError;
use crate::providers::{
    Perception, ProviderFuture, RawPerception, Reply, ReplyContext, Stt, SttResult, TtsEngine,
    Voice,
};

/// Vision/STT stack that sees nothing.
pub struct DisabledPerception;

impl Perception for DisabledPerception {
    fn detect(
        &self,
        _image_path: Option<PathBuf>,
        _audio_path: Option<PathBuf>,
    ) -> ProviderFuture<'_, RawPerception> {
        Box::pin(async { Ok(RawPerception::degraded()) })
    }
}

/// STT that hears nothing.
pub struct DisabledStt;

impl Stt for DisabledStt {
    fn transcribe(&self, _audio_path: PathBuf) -> ProviderFuture<'_, SttResult> {
        Box::pin(async { Ok(SttResult { transcript: String::new(), confidence: 0.0 }) })
    }
}

/// Reply provider that always fails, forcing the canned fallback path.
pub struct DisabledReply;

impl Reply for DisabledReply {
    fn generate(&self, _context: ReplyContext) -> ProviderFuture<'_, String> {
        Box::pin(async {
            Err(PipelineError::TransientProvider("reply provider disabled".into()))
        })
    }
}

/// Minimal RIFF/WAVE header for an empty 16 kHz mono PCM stream.
const EMPTY_WAV: &[u8] = &[
    0x52, 0x49, 0x46, 0x46, 0x24, 0x00, 0x00, 0x00, 0x57, 0x41, 0x56, 0x45, // RIFF....WAVE
    0x66, 0x6d, 0x74, 0x20, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, // fmt chunk
    0x80, 0x3e, 0x00, 0x00, 0x00, 0x7d, 0x00, 0x00, 0x02, 0x00, 0x10, 0x00, // 16k mono s16
    0x64, 0x61, 0x74, 0x61, 0x00, 0x00, 0x00, 0x00, // data, zero length
];

/// TTS engine that writes a silent wav.
pub struct DisabledTts;

impl TtsEngine for DisabledTts {
    fn synthesize(
        &self,
        _text: String,
        _voice: Voice,
        out_path: PathBuf,
    ) -> ProviderFuture<'_, ()> {
        Box::pin(async move {
            atomic_write(&out_path, EMPTY_WAV)
                .map_err(|e| PipelineError::TransientProvider(format!("tts write failed: {e}")))
        })
    }
}
