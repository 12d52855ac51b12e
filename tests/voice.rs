//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use solus_client::voice::{
    RecognitionHypothesis, SAMPLE_RATE, WakeWordMatcher, samples_to_wav,
};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn test_matcher_normalizes_phrase() {
    let matcher = WakeWordMatcher::new("  Hey SOLUS  ");
    assert_eq!(matcher.phrase(), "hey solus");
    assert!(matcher.match_transcript("hey solus").is_some());
}

#[test]
fn test_matcher_case_insensitive() {
    let matcher = WakeWordMatcher::new("hey solus");

    for transcript in ["HEY SOLUS", "HeY sOlUs", "hey solus"] {
        let m = matcher.match_transcript(transcript);
        assert!(m.is_some(), "should match: {transcript}");
        assert_eq!(m.unwrap().trailing_command, None);
    }
}

#[test]
fn test_matcher_extracts_trailing_command() {
    let matcher = WakeWordMatcher::new("hey solus");

    let m = matcher
        .match_transcript("hey solus what's the weather")
        .unwrap();
    assert_eq!(m.trailing_command.as_deref(), Some("what's the weather"));

    let m = matcher
        .match_transcript("well hey solus please turn on the lights")
        .unwrap();
    assert_eq!(
        m.trailing_command.as_deref(),
        Some("please turn on the lights")
    );
}

#[test]
fn test_matcher_rejects_unrelated_speech() {
    let matcher = WakeWordMatcher::new("hey solus");

    assert!(matcher.match_transcript("hello there").is_none());
    assert!(matcher.match_transcript("hey so lus").is_none());
    assert!(matcher.match_transcript("").is_none());
}

#[test]
fn test_hypothesis_parsing_shapes() {
    let partial = RecognitionHypothesis::parse(r#"{"partial": "hey so"}"#);
    assert!(!partial.is_final);
    assert_eq!(partial.text, "hey so");

    let fin = RecognitionHypothesis::parse(r#"{"text": "hey solus"}"#);
    assert!(fin.is_final);
    assert_eq!(fin.text, "hey solus");

    let junk = RecognitionHypothesis::parse("garbage");
    assert!(junk.is_final);
    assert!(junk.is_empty());
}

#[test]
fn test_hypothesis_feeds_matcher() {
    let matcher = WakeWordMatcher::new("hey solus");
    let hypothesis = RecognitionHypothesis::parse(r#"{"text": " Hey   Solus add eggs "}"#);

    assert!(hypothesis.is_final);
    let m = matcher.match_transcript(&hypothesis.text).unwrap();
    assert_eq!(m.trailing_command.as_deref(), Some("add eggs"));
}

#[test]
fn test_wav_encoding_sine_wave() {
    let samples = generate_sine_samples(440.0, 0.5, 0.3);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // RIFF header plus 16-bit mono payload
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    assert!(wav.len() > samples.len() * 2);
}

#[test]
fn test_wav_encoding_empty_input() {
    let wav = samples_to_wav(&[], SAMPLE_RATE).unwrap();
    // Header only
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(wav.len(), 44);
}
