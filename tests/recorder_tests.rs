mod common;

use anyhow::Result;
use common::{ScriptedBackend, SAMPLES_PER_FRAME};
use corpus_recorder::{AudioFile, Checkpoint, Recorder, RecorderError, SessionMetadata};
use std::fs;
use tempfile::TempDir;

const TAKE_SAMPLES: usize = 4 * SAMPLES_PER_FRAME;

#[tokio::test]
async fn two_line_session_links_in_order() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["first line", "second line"])?;

    let mut recorder = common::new_recorder(&config)?;
    recorder.load_source(&source)?;

    let name = recorder.start_new_session().await?;
    assert_eq!(name, "session_01");
    assert!(recorder.is_recording());
    assert_eq!(recorder.cursor(), 0);

    // First link commits take 1 to sentence 1 and auto-advances.
    recorder.link_line().await?;
    assert_eq!(recorder.cursor(), 1);
    assert!(recorder.is_recording());

    let sent1 = config
        .storage
        .audio_path
        .join("session_01")
        .join("spk01_session_01_sent0001.wav");
    let audio = AudioFile::open(&sent1)?;
    assert_eq!(audio.samples, vec![ScriptedBackend::take_fill(1); TAKE_SAMPLES]);

    // Second link lands on the last line and stays put.
    recorder.link_line().await?;
    assert_eq!(recorder.cursor(), 1);
    assert!(!recorder.is_recording());

    let sent2 = config
        .storage
        .audio_path
        .join("session_01")
        .join("spk01_session_01_sent0002.wav");
    let audio = AudioFile::open(&sent2)?;
    assert_eq!(audio.samples, vec![ScriptedBackend::take_fill(2); TAKE_SAMPLES]);

    let transcript = fs::read_to_string(config.storage.transcripts_path.join("session_01.txt"))?;
    assert_eq!(transcript, "first line\nsecond line\n");

    // The staged temp file never survives a commit.
    assert!(!config.storage.temp_audio_file.exists());

    let stats = recorder.end_session(&SessionMetadata::default()).await?;
    assert_eq!(stats.line_count, 2);
    assert!((stats.total_duration_secs - 0.08).abs() < 1e-9);

    let session_csv = fs::read_to_string(
        config
            .storage
            .audio_path
            .join("session_01")
            .join("session_01.metadata.csv"),
    )?;
    assert!(session_csv.starts_with("sentence_id,audio_file,text,duration\n"));
    assert!(session_csv.contains("1,spk01_session_01_sent0001.wav,first line,0.04"));
    assert!(session_csv.contains("2,spk01_session_01_sent0002.wav,second line,0.04"));

    let global_csv = fs::read_to_string(&config.storage.global_metadata_file)?;
    assert!(global_csv.starts_with("session,sentence_id,audio_file,text,duration\n"));
    assert!(global_csv.contains("session_01,1,spk01_session_01_sent0001.wav,first line,0.04"));

    assert!(recorder.session_name().is_none());
    let checkpoint = Checkpoint::load(&config.storage.checkpoint_file);
    assert_eq!(checkpoint.session, None);

    Ok(())
}

#[tokio::test]
async fn navigation_discards_takes_and_checkpoints_forward_only() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["one", "two", "three"])?;

    let mut recorder = common::new_recorder(&config)?;
    recorder.load_source(&source)?;
    recorder.start_new_session().await?;

    // Moving backward from line 0 is a complete no-op.
    recorder.previous_line().await?;
    assert_eq!(recorder.cursor(), 0);
    assert!(recorder.is_recording());

    // Moving forward discards the unlinked take and checkpoints.
    recorder.next_line().await?;
    assert_eq!(recorder.cursor(), 1);
    assert!(!config.storage.temp_audio_file.exists());
    let checkpoint = Checkpoint::load(&config.storage.checkpoint_file);
    assert_eq!(checkpoint.line_index, 1);
    assert_eq!(checkpoint.session.as_deref(), Some("session_01"));

    // Moving back does not rewind the checkpoint.
    recorder.previous_line().await?;
    assert_eq!(recorder.cursor(), 0);
    let checkpoint = Checkpoint::load(&config.storage.checkpoint_file);
    assert_eq!(checkpoint.line_index, 1);

    // Forward past the end is a no-op.
    recorder.next_line().await?;
    recorder.next_line().await?;
    recorder.next_line().await?;
    assert_eq!(recorder.cursor(), 2);

    // Nothing was ever linked.
    let session_dir = config.storage.audio_path.join("session_01");
    let wavs = fs::read_dir(&session_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |x| x == "wav"))
        .count();
    assert_eq!(wavs, 0);

    Ok(())
}

#[tokio::test]
async fn replace_rerecords_a_linked_line_in_place() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["alpha", "beta"])?;

    let mut recorder = common::new_recorder(&config)?;
    recorder.load_source(&source)?;
    recorder.start_new_session().await?;
    recorder.link_line().await?; // take 1 -> sent0001, cursor -> 1
    recorder.link_line().await?; // take 2 -> sent0002, stays on last line

    // Back on a linked line: resolved, and no auto-record over it.
    recorder.previous_line().await?;
    assert_eq!(recorder.current_sentence_id(), Some(1));
    assert!(recorder.current_audio().is_some());
    assert!(!recorder.is_recording());

    recorder.replace_recording().await?;
    assert!(recorder.is_replacing());
    assert!(recorder.is_recording());

    let sent1 = config
        .storage
        .audio_path
        .join("session_01")
        .join("spk01_session_01_sent0001.wav");
    // The old audio is gone until the replacement is linked.
    assert!(!sent1.exists());

    recorder.link_line().await?;
    assert!(!recorder.is_replacing());
    // Replace mode never advances the cursor.
    assert_eq!(recorder.cursor(), 0);
    assert_eq!(recorder.current_sentence_id(), Some(1));

    // The replacement is take 3; only one file exists for sentence 1.
    let audio = AudioFile::open(&sent1)?;
    assert_eq!(audio.samples, vec![ScriptedBackend::take_fill(3); TAKE_SAMPLES]);

    // Transcript line count and checkpoint are unchanged by the replace.
    let transcript = fs::read_to_string(config.storage.transcripts_path.join("session_01.txt"))?;
    assert_eq!(transcript, "alpha\nbeta\n");
    let checkpoint = Checkpoint::load(&config.storage.checkpoint_file);
    assert_eq!(checkpoint.line_index, 1);

    Ok(())
}

#[tokio::test]
async fn pause_and_resume_append_to_the_same_take() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["only line"])?;

    let mut recorder = common::new_recorder(&config)?;
    recorder.load_source(&source)?;
    recorder.start_new_session().await?;

    recorder.pause_recording().await?;
    assert!(config.storage.temp_audio_file.exists());
    assert!(!recorder.is_recording());

    recorder.resume_recording().await?;
    recorder.link_line().await?;

    let sent1 = config
        .storage
        .audio_path
        .join("session_01")
        .join("spk01_session_01_sent0001.wav");
    let audio = AudioFile::open(&sent1)?;
    assert_eq!(audio.samples.len(), 2 * TAKE_SAMPLES);
    assert_eq!(
        &audio.samples[..TAKE_SAMPLES],
        vec![ScriptedBackend::take_fill(1); TAKE_SAMPLES].as_slice()
    );
    assert_eq!(
        &audio.samples[TAKE_SAMPLES..],
        vec![ScriptedBackend::take_fill(2); TAKE_SAMPLES].as_slice()
    );

    Ok(())
}

#[tokio::test]
async fn committed_wav_carries_the_delivered_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["rate check"])?;

    // A device that cannot capture at the configured 44.1kHz delivers
    // 48kHz frames; the WAV header must say so or playback and the
    // metadata durations would be wrong.
    let mut recorder = Recorder::new(&config, Box::new(ScriptedBackend::at_rate(48000)))?;
    recorder.load_source(&source)?;
    recorder.start_new_session().await?;

    // Pause and resume so the preloaded temp stage keeps the rate too.
    recorder.pause_recording().await?;
    recorder.resume_recording().await?;
    recorder.link_line().await?;

    let sent1 = config
        .storage
        .audio_path
        .join("session_01")
        .join("spk01_session_01_sent0001.wav");
    let audio = AudioFile::open(&sent1)?;
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.samples.len(), 2 * TAKE_SAMPLES);
    let expected = (2 * TAKE_SAMPLES) as f64 / 48000.0;
    assert!((audio.duration_seconds - expected).abs() < 1e-9);

    Ok(())
}

#[tokio::test]
async fn checkpoint_resumes_cursor_and_session() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["one", "two", "three"])?;

    {
        let mut recorder = common::new_recorder(&config)?;
        recorder.load_source(&source)?;
        recorder.start_new_session().await?;
        recorder.link_line().await?;
        recorder.link_line().await?;
        assert_eq!(recorder.cursor(), 2);
        recorder.pause_recording().await?;
    }

    let mut recorder = common::new_recorder(&config)?;
    assert_eq!(recorder.cursor(), 2);
    assert_eq!(recorder.session_name(), Some("session_01"));

    recorder.load_source(&source)?;
    assert_eq!(recorder.cursor(), 2);
    // Line 3 was never linked.
    assert_eq!(recorder.current_sentence_id(), None);
    // Lines 1 and 2 resolve against the session transcript again.
    recorder.previous_line().await?;
    assert_eq!(recorder.current_sentence_id(), Some(2));
    assert!(recorder.current_audio().is_some());

    Ok(())
}

#[tokio::test]
async fn link_without_staged_audio_changes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["quiet line", "another"])?;

    let mut recorder = common::new_silent_recorder(&config)?;
    recorder.load_source(&source)?;
    recorder.start_new_session().await?;

    recorder.link_line().await?;
    assert_eq!(recorder.cursor(), 0);
    assert_eq!(recorder.current_sentence_id(), None);

    let transcript = fs::read_to_string(config.storage.transcripts_path.join("session_01.txt"))?;
    assert_eq!(transcript, "");
    assert!(!config
        .storage
        .audio_path
        .join("session_01")
        .join("spk01_session_01_sent0001.wav")
        .exists());

    Ok(())
}

#[tokio::test]
async fn reopening_a_session_resolves_its_lines() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());
    let source = common::write_source(dir.path(), &["alpha", "beta"])?;

    let session_dir = {
        let mut recorder = common::new_recorder(&config)?;
        recorder.load_source(&source)?;
        let name = recorder.start_new_session().await?;
        recorder.link_line().await?;
        recorder.link_line().await?;
        recorder.end_session(&SessionMetadata::default()).await?;
        config.storage.audio_path.join(name)
    };

    let mut recorder = common::new_recorder(&config)?;
    let name = recorder.load_existing_session(&session_dir)?;
    assert_eq!(name, "session_01");
    assert_eq!(recorder.session_name(), Some("session_01"));
    assert_eq!(recorder.cursor(), 0);
    assert_eq!(recorder.source().lines(), &["alpha", "beta"]);
    assert_eq!(recorder.current_sentence_id(), Some(1));
    assert!(recorder.current_audio().is_some());

    // Editing the line breaks the text match until it is re-linked; the
    // transcript-backed source has no file to clobber.
    recorder.save_current_edit("alpha edited")?;
    assert_eq!(recorder.current_sentence_id(), None);
    let transcript = fs::read_to_string(config.storage.transcripts_path.join("session_01.txt"))?;
    assert_eq!(transcript, "alpha\nbeta\n");

    Ok(())
}

#[tokio::test]
async fn precondition_errors_leave_state_untouched() -> Result<()> {
    let dir = TempDir::new()?;
    let config = common::test_config(dir.path());

    let mut recorder = common::new_recorder(&config)?;

    let err = recorder.start_new_session().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecorderError>(),
        Some(RecorderError::NoSourceLoaded)
    ));

    let err = recorder.link_line().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecorderError>(),
        Some(RecorderError::NoActiveSession)
    ));

    let err = recorder.session_stats().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecorderError>(),
        Some(RecorderError::NoActiveSession)
    ));

    // A session with an unlinked line has nothing to replace.
    let source = common::write_source(dir.path(), &["line"])?;
    recorder.load_source(&source)?;
    recorder.start_new_session().await?;
    let err = recorder.replace_recording().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecorderError>(),
        Some(RecorderError::NothingToReplace)
    ));

    Ok(())
}
