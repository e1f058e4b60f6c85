// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed TTS engine.
//!
//! The synthesizer binary is always invoked with an argument list —
//! never a shell string — so reply text cannot be interpreted by a
//! shell. The child is killed if dropped mid-synthesis.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::PipelineError;
use crate::providers::{ProviderFuture, TtsEngine, Voice};

/// TTS engine shelling out to an external synthesizer.
pub struct CommandTts {
    program: PathBuf,
    timeout: Duration,
}

impl CommandTts {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    async fn run(&self, text: &str, voice: Voice, out_path: &Path) -> Result<(), PipelineError> {
        let mut child = Command::new(&self.program)
            .arg("--voice")
            .arg(voice.as_str())
            .arg("--out")
            .arg(out_path)
            .arg("--text")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::TransientProvider(format!("tts spawn: {e}")))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| PipelineError::TransientProvider("tts synthesis timed out".into()))?
            .map_err(|e| PipelineError::TransientProvider(format!("tts wait: {e}")))?;

        if !status.success() {
            return Err(PipelineError::TransientProvider(format!(
                "tts synthesizer exited with {status}"
            )));
        }
        Ok(())
    }
}

impl TtsEngine for CommandTts {
    fn synthesize(
        &self,
        text: String,
        voice: Voice,
        out_path: PathBuf,
    ) -> ProviderFuture<'_, ()> {
        Box::pin(async move { self.run(&text, voice, &out_path).await })
    }
}
