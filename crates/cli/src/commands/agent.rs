//! `daisy agent`: interactive or single-message conversation.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use daisy_agent::{
    Assistant, ChunkObserver, NarrationPipeline, ReasoningLoop, RequestChannel, RequestError,
};
use daisy_commands::ExampleIndex;
use daisy_config::AppConfig;
use daisy_core::event::{DomainEvent, EventBus};
use daisy_core::message::ConversationId;
use daisy_core::store::ConversationStore;
use daisy_memory::SqliteStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a narrated turn stays silent before the filler notice shows.
const FILLER_DELAY: Duration = Duration::from_millis(1500);

pub async fn run(message: Option<String>, no_voice: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_with_key()?;
    let mut assistant = build_assistant(&config, no_voice).await?;

    let loaded = assistant
        .load_history()
        .await
        .map_err(|e| format!("Failed to load history: {e}"))?;
    debug!(loaded, narrates = assistant.narrates(), "Assistant ready");

    if let Some(msg) = message {
        turn(&mut assistant, &msg).await;
        describe(&assistant).await;
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════╗");
    println!("  ║     Daisy: Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.default_model);
    println!("  Reasoning: {}", config.reasoning_model());
    println!("  Voice:     {}", if assistant.narrates() { "on" } else { "off" });
    println!("  History:   {loaded} messages");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C interrupts an answer; 'exit' or Ctrl+C at the prompt quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }
        turn(&mut assistant, input).await;
    }

    describe(&assistant).await;
    println!();
    println!("  Goodbye! 🌼");
    println!();

    Ok(())
}

/// Name and summarize the conversation for `daisy history --list`.
async fn describe(assistant: &Assistant) {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match assistant.describe_conversation(&cancel).await {
        Ok(Some(description)) => debug!(name = %description.name, "Saved conversation description"),
        Ok(None) => {}
        Err(RequestError::Cancelled) => {}
        Err(e) => warn!(error = %e, "Could not describe the conversation"),
    }
    watcher.abort();
}

async fn build_assistant(
    config: &AppConfig,
    no_voice: bool,
) -> Result<Assistant, Box<dyn std::error::Error>> {
    let backends = daisy_providers::build_from_config(config)
        .map_err(|e| format!("Failed to set up backends: {e}"))?;

    let bus = Arc::new(EventBus::default());
    spawn_progress(&bus);

    let channel = Arc::new(
        RequestChannel::from_config(backends.chat.clone(), &config.request)
            .with_event_bus(bus.clone()),
    );

    let conversation = ConversationId::from(config.store.conversation_id.as_str());
    let store: Arc<dyn ConversationStore> = Arc::new(
        SqliteStore::open(
            &config.store_path(),
            config.store.max_connections,
            conversation.clone(),
        )
        .await
        .map_err(|e| format!("Failed to open conversation store: {e}"))?,
    );

    let examples = ExampleIndex::load_dir(&config.modules_dir())?;
    let reasoning = ReasoningLoop::new(
        channel.clone(),
        daisy_tools::default_registry(),
        config.reasoning_model(),
    )
    .with_config(config.reasoning.clone())
    .with_matcher(backends.embeddings.clone(), Arc::new(examples))
    .with_store(store.clone())
    .with_event_bus(bus);

    let mut assistant = Assistant::new(channel, &config.default_model)
        .with_temperature(config.default_temperature)
        .with_system_prompt(&config.system_prompt)
        .with_recent_limit(config.store.recent_limit)
        .with_reasoning(reasoning)
        .with_store(store, conversation);

    if !no_voice && let (Some(tts), Some(player)) = (backends.tts, backends.player) {
        assistant =
            assistant.with_narrator(NarrationPipeline::from_config(tts, player, &config.narration));
    }

    Ok(assistant)
}

/// Show reasoning progress on stderr while a turn runs.
fn spawn_progress(bus: &EventBus) {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                DomainEvent::StepPlanned {
                    command, argument, ..
                } => eprintln!("  · {command} {argument}"),
                DomainEvent::RequestRetried { attempt, error, .. } => {
                    eprintln!("  · retrying after attempt {attempt}: {error}")
                }
                _ => {}
            }
        }
    });
}

/// Run one turn, letting Ctrl+C interrupt it.
async fn turn(assistant: &mut Assistant, input: &str) {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let filler = assistant.narrates().then(CancellationToken::new);
    if let Some(filler) = &filler {
        let filler = filler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = filler.cancelled() => {}
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(FILLER_DELAY) => eprintln!("  (one moment...)"),
            }
        });
    }

    let print_chunk = |chunk: &str| {
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    };
    let observer: &ChunkObserver<'_> = &print_chunk;

    print!("  Daisy > ");
    let _ = std::io::stdout().flush();

    match assistant
        .respond(input, &cancel, filler.as_ref(), Some(observer))
        .await
    {
        Ok(reply) if reply.partial => println!(" [interrupted]"),
        Ok(_) => println!(),
        Err(RequestError::Cancelled) => println!("[cancelled]"),
        Err(e) => {
            println!();
            eprintln!("  [Error] {e}");
        }
    }
    println!();

    if let Some(filler) = filler {
        filler.cancel();
    }
    interrupt.abort();
}
