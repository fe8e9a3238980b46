//! duoHome binary entry point

use std::{io, sync::Arc};

use color_eyre::Result;
use duohome_rs::{
    assistant::{Assistant, Reply},
    cli::{Cli, Commands, StarsArgs},
    config::{Config, GlobalConfig},
    services::{
        speech::{ConsoleSpeaker, LineRecognizer, SpeechRecognizer, SpeechSynthesizer},
        stars::{format_weekly_report, JsonStarStore, StarStore},
    },
    DuoError,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse_args();
    let config = Config::load()?;

    // Set up logging
    let filter = if cli.verbose || config.global.verbose {
        EnvFilter::new("duohome_rs=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Handle commands
    match cli.command {
        None => run_chat(&config, cli.model.as_deref(), false).await?,
        Some(Commands::Chat { spoken }) => run_chat(&config, cli.model.as_deref(), spoken).await?,
        Some(Commands::Ask { prompt }) => {
            let speaker: Arc<dyn SpeechSynthesizer> = Arc::new(ConsoleSpeaker::new(io::stdout()));
            let assistant = Assistant::from_config(&config, cli.model.as_deref(), speaker)?;
            let reply = assistant.handle_utterance(&prompt, |_| {}).await?;
            print_reply(&reply);
            assistant.flush_uploads().await;
        }
        Some(Commands::Stars(args)) => run_stars(&config, &args)?,
        Some(Commands::Config { list, path, init }) => {
            let config_path = Config::global_config_path();
            if init {
                if GlobalConfig::init_at(&config_path)? {
                    println!("Wrote {}", config_path.display());
                } else {
                    println!("{} already exists", config_path.display());
                }
            }
            if path {
                println!("{}", config_path.display());
            }
            if list || !(path || init) {
                let mut shown = config.clone();
                for profile in &mut shown.global.model_profiles {
                    if !profile.api_key.is_empty() {
                        profile.api_key = "********".to_string();
                    }
                }
                println!("{}", serde_json::to_string_pretty(&shown)?);
            }
        }
        Some(Commands::Version) => {
            println!("duohome version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Interactive loop: each stdin line is one utterance
async fn run_chat(config: &Config, model: Option<&str>, spoken: bool) -> Result<()> {
    let speaker: Arc<dyn SpeechSynthesizer> =
        Arc::new(ConsoleSpeaker::new(io::stdout()).with_normalization(spoken));
    let assistant = Assistant::from_config(config, model, speaker)?;
    println!(
        "duohome ready ({}). Type to talk, /reset to start over, /exit to quit.",
        assistant.chat().backend().model()
    );

    let recognizer = Arc::new(LineRecognizer::new(io::BufReader::new(io::stdin()))?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listening = {
        let recognizer = recognizer.clone();
        tokio::spawn(async move {
            recognizer
                .start(Box::new(move |transcript| {
                    if let Some(text) = transcript.into_final() {
                        let _ = tx.send(text);
                    }
                }))
                .await
        })
    };

    while let Some(text) = rx.recv().await {
        match text.as_str() {
            "/exit" | "/quit" => break,
            "/reset" => {
                assistant.reset();
                println!("(new conversation)");
            }
            _ => match assistant.handle_utterance(&text, |_| {}).await {
                Ok(reply) => print_reply(&reply),
                Err(DuoError::Cancelled) => println!("(cancelled)"),
                Err(e) => return Err(e.into()),
            },
        }
    }

    recognizer.stop();
    listening.await??;
    assistant.flush_uploads().await;
    Ok(())
}

fn print_reply(reply: &Reply) {
    match reply {
        // Already streamed through the speaker
        Reply::Chat(_) => println!(),
        Reply::Stars(text) | Reply::AppLaunched(text) | Reply::Failed(text) => println!("{text}"),
    }
}

fn run_stars(config: &Config, args: &StarsArgs) -> Result<()> {
    let store = JsonStarStore::open(config.stars_path())?;

    if let Some(count) = args.add {
        println!("今天有{}颗星星", store.increment(count)?);
    } else if let Some(count) = args.remove {
        println!("今天有{}颗星星", store.decrement(count)?);
    } else if args.report {
        println!("{}", format_weekly_report(&store.weekly_report()?));
    } else if args.reset_week {
        store.reset_week()?;
        println!("本周星星已清空");
    } else {
        println!("今天有{}颗星星", store.get()?);
    }
    Ok(())
}
