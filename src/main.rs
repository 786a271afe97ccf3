use anyhow::{Context, Result};
use voice_assistant::actions::Platform;
use voice_assistant::config::Config;
use voice_assistant::session::{Session, SessionEnd, FATAL_MESSAGE};
use voice_assistant::shutdown::{wait_for_session, Shutdown, WaitOutcome};
use voice_assistant::speech::{CommandSpeaker, SpeechSink};
use voice_assistant::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.voice-assistant.toml");

    telemetry::init(&config.telemetry)?;
    tracing::info!(mode = ?config.session.mode, "voice-assistant starting");

    println!("Voice assistant starting. Say 'goodbye' or press Ctrl+C to stop (twice to force).");
    println!("Try saying: 'Open YouTube', 'What time is it?', 'Hello'.\n");

    let shutdown = Shutdown::new();
    let session_shutdown = shutdown.clone();
    let session_config = config.clone();

    // the cpal stream is not Send, so the whole session lives on one blocking thread
    let session_task = tokio::task::spawn_blocking(move || -> Result<SessionEnd> {
        let mut session = match Session::from_config(&session_config, session_shutdown) {
            Ok(session) => session,
            Err(e) => {
                let speaker = CommandSpeaker::new(Platform::current(), session_config.speech);
                if let Err(speech_error) = speaker.speak(FATAL_MESSAGE) {
                    tracing::error!(error = %speech_error, "failed to speak fatal message");
                }
                return Err(e);
            }
        };
        println!("✓ Microphone and recognizers ready");
        Ok(session.run())
    });

    let joined = match wait_for_session(session_task, &shutdown, tokio::signal::ctrl_c).await {
        WaitOutcome::Finished(joined) => joined,
        WaitOutcome::Forced => {
            eprintln!("Forced shutdown.");
            std::process::exit(130);
        }
    };
    let end = joined.context("session thread panicked")??;

    tracing::info!(end = ?end, "voice-assistant stopped");
    match end {
        SessionEnd::Exited | SessionEnd::Interrupted => Ok(()),
        SessionEnd::Fatal => anyhow::bail!("session ended with a fatal error"),
    }
}
