use anyhow::Result;
use clap::Parser;
use corpus_recorder::{AudioBackendFactory, Config, Recorder, SessionMetadata};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Sentence-level audio recording tool for speech dataset collection.
#[derive(Debug, Parser)]
#[command(name = "corpus-recorder", version)]
struct Args {
    /// Configuration file, without extension (`config` crate convention)
    #[arg(short, long, default_value = "config/corpus-recorder")]
    config: String,

    /// Source text file to load at startup
    #[arg(short, long)]
    source: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let backend = AudioBackendFactory::create(cfg.backend_config())?;
    let mut recorder = Recorder::new(&cfg, backend)?;

    if let Some(source) = &args.source {
        recorder.load_source(source)?;
    }

    println!("corpus-recorder — type 'help' for commands");
    print_status(&recorder);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        let result = match command {
            "" => Ok(()),
            "help" => {
                print_help();
                Ok(())
            }
            "load" => recorder.load_source(Path::new(rest)),
            "new" => recorder.start_new_session().await.map(|name| {
                println!("Started {}", name);
            }),
            "open" => recorder.load_existing_session(Path::new(rest)).map(|name| {
                println!("Loaded {}", name);
            }),
            "next" | "n" => recorder.next_line().await,
            "prev" | "p" => recorder.previous_line().await,
            "link" | "l" => recorder.link_line().await,
            "replace" | "r" => recorder.replace_recording().await,
            "rec" => recorder.resume_recording().await,
            "pause" => recorder.pause_recording().await,
            "edit" => recorder.save_current_edit(rest),
            "end" => end_session(&mut recorder).await,
            "status" => {
                print_status(&recorder);
                Ok(())
            }
            "quit" | "q" => {
                recorder.stop_recording(false).await?;
                break;
            }
            other => {
                println!("Unknown command: {} (try 'help')", other);
                Ok(())
            }
        };

        if let Err(e) = result {
            eprintln!("Error: {:#}", e);
        } else if !matches!(command, "" | "help" | "status") {
            print_status(&recorder);
        }
    }

    Ok(())
}

/// Prompt for the end-of-session metadata, then finalize the session.
async fn end_session(recorder: &mut Recorder) -> Result<()> {
    let stats = recorder.session_stats()?;
    println!(
        "Ending session: {} lines, {:.2}s total, {:.2}s average",
        stats.line_count, stats.total_duration_secs, stats.average_duration_secs
    );

    let defaults = SessionMetadata::default();
    let metadata = SessionMetadata {
        collector: prompt("Data collector name", &defaults.collector)?,
        language: prompt("Language", &defaults.language)?,
        sensitive_flagged: prompt("Sensitive information flagged (y/n)", "n")?
            .eq_ignore_ascii_case("y"),
        speaking_style: prompt("Speaking style", &defaults.speaking_style)?,
        session_quality: prompt("Session quality (0-5)", "5")?.parse().unwrap_or(5),
        speaker_gender: prompt("Speaker gender", &defaults.speaker_gender)?,
        speaker_age: prompt("Speaker age", &defaults.speaker_age)?,
        speaker_accent: prompt("Speaker accent", &defaults.speaker_accent)?,
    };

    let stats = recorder.end_session(&metadata).await?;
    println!(
        "Session ended: {} lines, {:.2}s total",
        stats.line_count, stats.total_duration_secs
    );
    Ok(())
}

fn prompt(label: &str, default: &str) -> Result<String> {
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn print_status(recorder: &Recorder) {
    if recorder.source().is_empty() {
        println!("No source loaded (use: load <file>)");
        return;
    }

    let cursor = recorder.cursor();
    let total = recorder.source().len();
    let line = recorder.current_line().unwrap_or("");
    let session = recorder.session_name().unwrap_or("-");

    let mut flags: Vec<String> = Vec::new();
    if recorder.is_recording() {
        flags.push("recording".to_string());
    }
    if recorder.is_replacing() {
        flags.push("replacing".to_string());
    }
    if let Some(id) = recorder.current_sentence_id() {
        flags.push(format!("sent{:04}", id));
    }

    println!(
        "[{}/{}] ({}) {} {}",
        cursor + 1,
        total,
        session,
        line,
        if flags.is_empty() {
            String::new()
        } else {
            format!("[{}]", flags.join(", "))
        }
    );
}

fn print_help() {
    println!("Commands:");
    println!("  load <file>   load a source text file");
    println!("  new           start a new session (begins recording)");
    println!("  open <dir>    load an existing session directory");
    println!("  next / n      next line (discards unsaved take)");
    println!("  prev / p      previous line (discards unsaved take)");
    println!("  link / l      link the staged recording to the current line");
    println!("  replace / r   re-record an already-linked line");
    println!("  rec / pause   resume or pause recording on this line");
    println!("  edit <text>   replace the current line's text and save");
    println!("  end           end the session and write metadata");
    println!("  status        show cursor, session, and recording state");
    println!("  quit / q      exit");
}
