mod args;

use args::{Args, Mode};
use eve_sentry::capture::XcapScreen;
use eve_sentry::sentry::{ConfigStore, JsonConfigStore, SentryEngine, SentryEvent};
use eve_sentry::vision::{Detector, Preprocessor, TemplateLibrary};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

fn main() -> ExitCode {
    let Some(args) = Args::parse() else {
        return ExitCode::SUCCESS;
    };

    let level = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let store = match JsonConfigStore::open_or_default(&args.config_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    let config = store.snapshot();

    let assets_dir = args.assets_dir.clone().unwrap_or_else(|| config.assets_dir.clone());
    let preprocessor = Preprocessor::new(config.preprocess.clone());
    let library = TemplateLibrary::load(&assets_dir, &config.scales, preprocessor);
    let detector = Detector::new(library, config.safe_color.clone());

    if args.mode == Mode::SelfCheck {
        println!("🧪 Self-check");
        println!("{}", detector.library().status());
        println!("Config: {}", store.path().display());
        for group in &config.groups {
            println!(
                "  [{}] {} threat regions: {} scale: {}",
                group.id,
                group.name,
                if group.regions.has_threat_region() { "yes" } else { "no" },
                group.scale.as_deref().unwrap_or("?")
            );
        }
        return ExitCode::SUCCESS;
    }

    let (event_tx, event_rx) = mpsc::channel();
    let mut engine = SentryEngine::new(detector, Arc::new(XcapScreen), store, event_tx);
    if let Err(e) = engine.start() {
        eprintln!("❌ Failed to start sentry: {}", e);
        return ExitCode::FAILURE;
    }
    println!("🚀 Watching {} client(s)...", config.groups.len());

    let deadline = args
        .timeout_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("⏰ Timeout reached, stopping");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match event_rx.recv_timeout(wait) {
            // Status lines already go through the logger at debug level
            Ok(SentryEvent::Log(line)) if line.starts_with("🔎") => {}
            Ok(event) => println!("{}", event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    match engine.stop() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
