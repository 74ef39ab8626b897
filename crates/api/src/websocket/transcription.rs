//! Live transcription of a participant's audio
//!
//! Each connection that starts transcription gets one background task fed
//! through a bounded channel, so chunks from one speaker are transcribed
//! and stored in the order they arrived.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use supportly_shared::store;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;
use crate::state::AppState;

/// Audio chunks buffered per connection before new chunks are dropped
pub const TRANSCRIPTION_QUEUE_DEPTH: usize = 16;

pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AudioChunkError {
    #[error("Audio chunk is not valid base64")]
    Encoding,
    #[error("Audio chunk is empty")]
    Empty,
    #[error("Audio chunk exceeds {max} bytes")]
    TooLarge { max: usize },
}

/// Decode a base64 audio chunk, enforcing the size limit on the decoded bytes
pub fn decode_audio_chunk(data: &str, max_bytes: usize) -> Result<Vec<u8>, AudioChunkError> {
    // Base64 expands by 4/3; reject oversized input before decoding it
    if data.len() / 4 * 3 > max_bytes + 3 {
        return Err(AudioChunkError::TooLarge { max: max_bytes });
    }

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|_| AudioChunkError::Encoding)?;

    if bytes.is_empty() {
        return Err(AudioChunkError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(AudioChunkError::TooLarge { max: max_bytes });
    }
    Ok(bytes)
}

/// Spawn the transcriber for one speaker and return its audio feed.
///
/// The task exits once every sender is dropped and the queue is drained.
pub fn spawn_transcriber(
    app_state: AppState,
    session_id: Uuid,
    speaker_id: Uuid,
    mime_type: String,
) -> mpsc::Sender<Vec<u8>> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(TRANSCRIPTION_QUEUE_DEPTH);

    tokio::spawn(async move {
        tracing::debug!(session_id = %session_id, speaker_id = %speaker_id, "Transcriber started");

        while let Some(chunk) = rx.recv().await {
            let bytes = chunk.len();
            let text = match app_state.ai.transcribe(chunk, &mime_type).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        bytes,
                        "Audio chunk transcription failed"
                    );
                    continue;
                }
            };

            if text.is_empty() {
                continue;
            }

            match store::append_transcript(&app_state.pool, session_id, speaker_id, &text).await {
                Ok(entry) => {
                    app_state
                        .ws_state
                        .rooms
                        .broadcast(&session_id, ServerEvent::Transcript { entry })
                        .await;
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to store transcript");
                }
            }
        }

        tracing::debug!(session_id = %session_id, speaker_id = %speaker_id, "Transcriber stopped");
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_chunk() {
        let data = STANDARD.encode([1u8, 2, 3, 4]);
        assert_eq!(decode_audio_chunk(&data, 16).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(
            decode_audio_chunk("not base64!!", 1024),
            Err(AudioChunkError::Encoding)
        );
        assert_eq!(decode_audio_chunk("", 1024), Err(AudioChunkError::Empty));
    }

    #[test]
    fn test_decode_enforces_limit() {
        let data = STANDARD.encode(vec![0u8; 100]);
        assert!(decode_audio_chunk(&data, 100).is_ok());
        assert_eq!(
            decode_audio_chunk(&data, 99),
            Err(AudioChunkError::TooLarge { max: 99 })
        );

        let huge = STANDARD.encode(vec![0u8; 4096]);
        assert_eq!(
            decode_audio_chunk(&huge, 1024),
            Err(AudioChunkError::TooLarge { max: 1024 })
        );
    }
}
