//! Cloud command engine
//!
//! One-shot recognizer used for command capture: records a single utterance
//! from the microphone, segments it by energy, ships it as WAV to an
//! OpenAI-compatible `audio/transcriptions` endpoint, and emits exactly one
//! terminal event (a final hypothesis or an error).

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::capture::{self, CaptureThread, SAMPLE_RATE};
use super::engine::{EngineError, EngineEvent, SpeechEngine};
use super::hypothesis::RecognitionHypothesis;

/// Minimum RMS energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum samples of speech before silence can end the utterance (300ms)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Samples of trailing silence that end the utterance (500ms)
const SILENCE_SAMPLES: usize = 8000;

/// How long to wait for speech to begin before giving up
const NO_SPEECH_TIMEOUT: Duration = Duration::from_secs(8);

/// Hard cap on utterance length
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// How often the segmenter polls the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transcription responses come in two shapes: a single `text` field
/// (OpenAI-compatible) or a ranked `alternatives` list
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    alternatives: Vec<TranscriptionAlternative>,
}

#[derive(serde::Deserialize)]
struct TranscriptionAlternative {
    text: String,
}

impl TranscriptionResponse {
    fn into_hypothesis(self) -> Option<RecognitionHypothesis> {
        match self.text {
            Some(text) if !text.trim().is_empty() => {
                Some(RecognitionHypothesis::final_text(text))
            }
            _ => RecognitionHypothesis::from_alternatives(
                self.alternatives.iter().map(|a| a.text.as_str()),
            ),
        }
    }
}

/// One-shot command recognizer backed by a cloud transcription endpoint
pub struct CloudCommandEngine {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    model: String,
    task: Option<JoinHandle<()>>,
}

impl CloudCommandEngine {
    #[must_use]
    pub fn new(url: Option<String>, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            model,
            task: None,
        }
    }
}

#[async_trait]
impl SpeechEngine for CloudCommandEngine {
    fn continuous(&self) -> bool {
        false
    }

    async fn start(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError> {
        if self.task.is_some() {
            return Err(EngineError::Busy);
        }

        let Some(url) = self.url.clone() else {
            // No endpoint configured is indistinguishable from no network
            // as far as the session is concerned
            return Err(EngineError::NetworkUnavailable);
        };

        // Stream setup touches the audio device, keep it off the runtime
        let capture = tokio::task::spawn_blocking(CaptureThread::spawn)
            .await
            .map_err(|e| EngineError::Unknown(e.to_string()))?
            .map_err(map_capture_error)?;

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let model = self.model.clone();

        self.task = Some(tokio::spawn(async move {
            let event = match capture_utterance(&capture).await {
                Ok(samples) => {
                    capture.stop();
                    transcribe(&client, &url, api_key.as_deref(), &model, &samples).await
                }
                Err(e) => {
                    capture.stop();
                    EngineEvent::Error(e)
                }
            };
            let _ = events.send(event).await;
        }));

        tracing::debug!("cloud command capture started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("cloud command capture aborted");
        }
    }

    async fn destroy(&mut self) {
        self.stop().await;
    }
}

fn map_capture_error(e: crate::Error) -> EngineError {
    let message = e.to_string();
    if message.contains("permission") || message.contains("denied") {
        EngineError::PermissionDenied
    } else {
        EngineError::NotAvailable(message)
    }
}

/// Record one utterance, segmented by energy
///
/// Waits for speech to cross [`ENERGY_THRESHOLD`], then finalizes after
/// [`SILENCE_SAMPLES`] of quiet once at least [`MIN_SPEECH_SAMPLES`] of
/// speech have been heard.
async fn capture_utterance(capture: &CaptureThread) -> Result<Vec<f32>, EngineError> {
    let mut utterance: Vec<f32> = Vec::new();
    let mut speech_samples = 0usize;
    let mut silence_run = 0usize;
    let started = tokio::time::Instant::now();

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let chunk = capture.take_buffer();
        if !chunk.is_empty() {
            let energy = capture::rms_energy(&chunk);
            if energy >= ENERGY_THRESHOLD {
                speech_samples += chunk.len();
                silence_run = 0;
            } else if speech_samples > 0 {
                silence_run += chunk.len();
            }
            utterance.extend_from_slice(&chunk);
        }

        if speech_samples >= MIN_SPEECH_SAMPLES && silence_run >= SILENCE_SAMPLES {
            tracing::debug!(
                samples = utterance.len(),
                speech_samples,
                "utterance finalized"
            );
            return Ok(utterance);
        }

        let elapsed = started.elapsed();
        if speech_samples == 0 && elapsed >= NO_SPEECH_TIMEOUT {
            return Err(EngineError::NoSpeechDetected);
        }
        if elapsed >= MAX_UTTERANCE {
            if speech_samples >= MIN_SPEECH_SAMPLES {
                return Ok(utterance);
            }
            return Err(EngineError::Timeout);
        }
    }
}

async fn transcribe(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    model: &str,
    samples: &[f32],
) -> EngineEvent {
    let wav = match capture::samples_to_wav(samples, SAMPLE_RATE) {
        Ok(wav) => wav,
        Err(e) => return EngineEvent::Error(EngineError::Unknown(e.to_string())),
    };

    tracing::debug!(audio_bytes = wav.len(), "starting transcription");

    let part = match reqwest::multipart::Part::bytes(wav)
        .file_name("audio.wav")
        .mime_str("audio/wav")
    {
        Ok(part) => part,
        Err(e) => return EngineEvent::Error(EngineError::Unknown(e.to_string())),
    };

    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("model", model.to_string());

    let mut request = client.post(url).multipart(form);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "transcription request failed");
            return EngineEvent::Error(EngineError::NetworkUnavailable);
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, body = %body, "transcription API error");
        let error = if status.as_u16() == 429 {
            EngineError::Busy
        } else if status.is_client_error() {
            EngineError::Client(format!("{status}: {body}"))
        } else {
            EngineError::Server(format!("{status}: {body}"))
        };
        return EngineEvent::Error(error);
    }

    match response.json::<TranscriptionResponse>().await {
        Ok(result) => result.into_hypothesis().map_or(
            EngineEvent::Error(EngineError::NoSpeechDetected),
            |hypothesis| {
                tracing::info!(transcript = %hypothesis.text, "transcription complete");
                EngineEvent::Hypothesis(hypothesis)
            },
        ),
        Err(e) => EngineEvent::Error(EngineError::Server(format!("invalid response body: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_text_shape() {
        let raw: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "turn off the lights"}"#).expect("parse");
        let h = raw.into_hypothesis().expect("hypothesis");
        assert_eq!(h.text, "turn off the lights");
        assert!(h.is_final);
    }

    #[test]
    fn ranked_alternatives_shape() {
        let raw: TranscriptionResponse = serde_json::from_str(
            r#"{"alternatives": [{"text": ""}, {"text": "what time is it"}]}"#,
        )
        .expect("parse");
        let h = raw.into_hypothesis().expect("hypothesis");
        assert_eq!(h.text, "what time is it");
    }

    #[test]
    fn empty_response_is_no_speech() {
        let raw: TranscriptionResponse = serde_json::from_str(r#"{"text": "  "}"#).expect("parse");
        assert!(raw.into_hypothesis().is_none());
    }
}
