// Integration tests for the command worker
//
// Verifies FIFO execution, exit on Stop, and file playback through the
// runtime's push/flush calls.

mod common;

use anyhow::Result;
use avatar_stream::control::{CommandController, ControlMessage};
use avatar_stream::StreamError;
use common::{tagged_chunk, write_wav, EventLog, RecordingRuntime, SAMPLE_RATE};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_messages_execute_in_order() -> Result<()> {
    let log = EventLog::new();
    let runtime = Arc::new(RecordingRuntime::new(log.clone(), Vec::new()));
    let controller = CommandController::new(runtime.clone());
    let handle = controller.handle();

    handle.push(ControlMessage::PushPcm(tagged_chunk(1)))?;
    handle.push(ControlMessage::PushPcm(tagged_chunk(2)))?;
    handle.push(ControlMessage::Flush)?;
    handle.push(ControlMessage::Interrupt)?;
    handle.push(ControlMessage::PushPcm(tagged_chunk(3)))?;
    handle.push(ControlMessage::Stop)?;

    controller.run().await;

    assert_eq!(
        log.events(),
        vec![
            "runtime.push_audio",
            "runtime.push_audio",
            "runtime.flush",
            "runtime.interrupt",
            "runtime.push_audio",
        ]
    );
    let tags: Vec<i16> = runtime.pushed().iter().map(|c| c.samples[0]).collect();
    assert_eq!(tags, vec![1, 2, 3]);

    Ok(())
}

#[tokio::test]
async fn test_stop_discards_later_messages_and_closes_queue() -> Result<()> {
    let log = EventLog::new();
    let runtime = Arc::new(RecordingRuntime::new(log.clone(), Vec::new()));
    let controller = CommandController::new(runtime);
    let handle = controller.handle();

    handle.push(ControlMessage::Stop)?;
    handle.push(ControlMessage::Interrupt)?;

    controller.spawn().await?;

    assert!(!log.contains("runtime.interrupt"), "Nothing runs after Stop");
    assert!(handle.is_closed());
    assert!(matches!(
        handle.push(ControlMessage::Flush),
        Err(StreamError::ControllerClosed)
    ));

    Ok(())
}

#[tokio::test]
async fn test_worker_exits_when_all_handles_drop() -> Result<()> {
    let log = EventLog::new();
    let runtime = Arc::new(RecordingRuntime::new(log.clone(), Vec::new()));
    let controller = CommandController::new(runtime);
    let handle = controller.handle();

    let worker = controller.spawn();
    handle.push(ControlMessage::Flush)?;
    drop(handle);

    tokio::time::timeout(Duration::from_secs(1), worker).await??;
    assert_eq!(log.count("runtime.flush"), 1);

    Ok(())
}

#[tokio::test]
async fn test_push_audio_file_streams_10ms_chunks_then_flushes() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("speech.wav");
    // stereo 48kHz, downmixed and resampled to the runtime rate
    write_wav(&path, 48000, 2, 255)?;

    let log = EventLog::new();
    let runtime = Arc::new(RecordingRuntime::new(log.clone(), Vec::new()));
    let controller = CommandController::new(runtime.clone());
    let handle = controller.handle();

    handle.push(ControlMessage::push_audio(&path))?;
    handle.push(ControlMessage::Stop)?;
    controller.run().await;

    let pushed = runtime.pushed();
    let total: usize = pushed.iter().map(|c| c.samples.len()).sum();
    assert_eq!(total, (SAMPLE_RATE as usize * 255) / 1000);
    assert_eq!(pushed.len(), 26, "25 full 10ms chunks plus the 5ms tail");
    assert!(pushed[..25].iter().all(|c| c.samples.len() == 160));
    assert_eq!(pushed[25].samples.len(), 80, "Tail is pushed unpadded");
    assert!(pushed.iter().all(|c| c.sample_rate == SAMPLE_RATE && c.channels == 1));
    assert!(pushed.iter().all(|c| !c.last_chunk));

    let events = log.events();
    assert_eq!(events.last().map(String::as_str), Some("runtime.flush"));
    assert_eq!(log.count("runtime.flush"), 1);

    Ok(())
}

#[tokio::test]
async fn test_failed_command_does_not_stop_worker() -> Result<()> {
    let log = EventLog::new();
    let runtime = Arc::new(RecordingRuntime::new(log.clone(), Vec::new()));
    let controller = CommandController::new(runtime);
    let handle = controller.handle();

    handle.push(ControlMessage::push_audio("/nonexistent/speech.wav"))?;
    handle.push(ControlMessage::Interrupt)?;
    handle.push(ControlMessage::Stop)?;
    controller.run().await;

    assert_eq!(log.events(), vec!["runtime.interrupt"]);
    Ok(())
}

#[test]
fn test_control_message_json() -> Result<()> {
    let msg: ControlMessage = serde_json::from_str(r#"{"type":"push_audio","path":"hello.wav"}"#)?;
    assert_eq!(msg, ControlMessage::push_audio("hello.wav"));

    let msg: ControlMessage = serde_json::from_str(r#"{"type":"interrupt"}"#)?;
    assert_eq!(msg, ControlMessage::Interrupt);

    assert_eq!(serde_json::to_string(&ControlMessage::Flush)?, r#"{"type":"flush"}"#);
    assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"explode"}"#).is_err());

    Ok(())
}
