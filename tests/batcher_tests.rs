// Integration tests for fixed-cadence audio framing
//
// These tests verify that arbitrary chunking produces the same frames, and
// that padding and end-of-utterance markers land where they should.

use anyhow::Result;
use avatar_stream::audio::{frame_samples_for, AudioChunk, AudioStreamBatcher, PaddedAudioFrame};
use avatar_stream::StreamError;

const SAMPLE_RATE: u32 = 16000;

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i % 30000) as i16).collect()
}

/// Push `samples` in `chunk_len` pieces, flagging the final piece
fn push_chunked(
    batcher: &mut AudioStreamBatcher,
    samples: &[i16],
    chunk_len: usize,
) -> Result<Vec<PaddedAudioFrame>> {
    let pieces: Vec<&[i16]> = samples.chunks(chunk_len).collect();
    let mut frames = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        let chunk = AudioChunk::new(piece.to_vec(), SAMPLE_RATE, i + 1 == pieces.len());
        frames.extend(batcher.push(Some(&chunk))?);
    }
    Ok(frames)
}

fn unpadded(frames: &[PaddedAudioFrame]) -> Result<Vec<i16>> {
    let mut out = Vec::new();
    for frame in frames {
        out.extend_from_slice(AudioStreamBatcher::unpad(frame)?);
    }
    Ok(out)
}

#[test]
fn test_frame_samples_for_25fps() -> Result<()> {
    assert_eq!(frame_samples_for(16000, 25.0)?, 640);
    assert_eq!(frame_samples_for(48000, 30.0)?, 1600);
    // rounded, not truncated
    assert_eq!(frame_samples_for(44100, 29.97)?, 1471);
    Ok(())
}

#[test]
fn test_frame_samples_for_rejects_invalid_rates() {
    assert!(frame_samples_for(0, 25.0).is_err());
    assert!(frame_samples_for(16000, 0.0).is_err());
    assert!(frame_samples_for(16000, f64::NAN).is_err());
}

#[test]
fn test_one_second_in_37ms_chunks() -> Result<()> {
    let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
    let samples = vec![0i16; 16000];

    let frames = push_chunked(&mut batcher, &samples, 37 * 16)?;

    assert_eq!(frames.len(), 25, "1000ms at 25fps should be exactly 25 frames");
    assert!(frames.iter().all(|f| !f.is_padded()), "No frame should be padded");
    assert!(frames.iter().all(|f| f.samples.len() == 640));
    assert!(frames[24].end_of_utterance, "Last frame should close the utterance");
    assert!(frames[..24].iter().all(|f| !f.end_of_utterance));
    assert_eq!(unpadded(&frames)?.len(), 16000);
    assert_eq!(batcher.pending(), 0);

    Ok(())
}

#[test]
fn test_333ms_pads_last_frame() -> Result<()> {
    let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
    let samples = ramp(333 * 16);

    let frames = push_chunked(&mut batcher, &samples, 100)?;

    assert_eq!(frames.len(), 9, "8 full frames plus one partial");
    let last = &frames[8];
    assert_eq!(last.valid_samples, 5328 - 8 * 640);
    assert_eq!(last.samples.len(), 640, "Padded to full frame length");
    assert!(last.samples[last.valid_samples..].iter().all(|&s| s == 0));
    assert!(last.end_of_utterance);

    Ok(())
}

#[test]
fn test_chunk_size_invariance() -> Result<()> {
    let samples = ramp(16000 + 1234);

    let mut reference = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
    let expected = push_chunked(&mut reference, &samples, samples.len())?;

    for chunk_len in [1, 7, 160, 639, 640, 641, 1000, 4096] {
        let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
        let frames = push_chunked(&mut batcher, &samples, chunk_len)?;

        assert_eq!(
            frames, expected,
            "Chunk length {} should produce identical frames",
            chunk_len
        );
        assert_eq!(unpadded(&frames)?, samples);
    }

    Ok(())
}

#[test]
fn test_partial_audio_is_carried_until_more_arrives() -> Result<()> {
    let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;

    let first = batcher.push(Some(&AudioChunk::new(ramp(500), SAMPLE_RATE, false)))?;
    assert!(first.is_empty(), "Not enough audio for a frame yet");
    assert_eq!(batcher.pending(), 500);

    let second = batcher.push(Some(&AudioChunk::new(ramp(500), SAMPLE_RATE, false)))?;
    assert_eq!(second.len(), 1);
    assert_eq!(batcher.pending(), 360);

    Ok(())
}

#[test]
fn test_end_of_stream_flushes_padded_frame() -> Result<()> {
    let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
    batcher.push(Some(&AudioChunk::new(ramp(100), SAMPLE_RATE, false)))?;

    let frames = batcher.push(None)?;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].valid_samples, 100);
    assert!(frames[0].is_padded());
    assert!(frames[0].end_of_utterance);

    // nothing left to flush
    assert!(batcher.push(None)?.is_empty());

    Ok(())
}

#[test]
fn test_sample_rate_mismatch_is_rejected() -> Result<()> {
    let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
    let chunk = AudioChunk::new(ramp(640), 44100, false);

    let err = batcher.push(Some(&chunk)).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StreamError>(),
        Some(StreamError::SampleRateMismatch { actual_rate: 44100, .. })
    ));
    assert_eq!(batcher.pending(), 0, "Rejected audio must not be carried");

    Ok(())
}

#[test]
fn test_unpad_rejects_impossible_frame() {
    let frame = PaddedAudioFrame {
        samples: vec![0; 640],
        valid_samples: 641,
        sample_rate: SAMPLE_RATE,
        channels: 1,
        end_of_utterance: false,
    };

    let err = AudioStreamBatcher::unpad(&frame).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<StreamError>(),
        Some(StreamError::InvalidFrame { valid: 641, len: 640 })
    ));
}

#[test]
fn test_stereo_frames_hold_all_channels() -> Result<()> {
    let mut batcher = AudioStreamBatcher::with_frame_samples(SAMPLE_RATE, 2, 640)?;
    let chunk = AudioChunk {
        samples: ramp(640 * 2 + 10),
        sample_rate: SAMPLE_RATE,
        channels: 2,
        last_chunk: true,
    };

    let frames = batcher.push(Some(&chunk))?;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].samples.len(), 1280);
    assert_eq!(frames[1].valid_samples, 10);

    Ok(())
}

#[test]
fn test_reset_discards_carry() -> Result<()> {
    let mut batcher = AudioStreamBatcher::new(SAMPLE_RATE, 25.0)?;
    batcher.push(Some(&AudioChunk::new(ramp(300), SAMPLE_RATE, false)))?;

    batcher.reset();

    assert_eq!(batcher.pending(), 0);
    assert!(batcher.push(None)?.is_empty());
    Ok(())
}
