//! `daisy history`: show the stored conversation.

use daisy_config::AppConfig;
use daisy_core::message::ConversationId;
use daisy_core::store::ConversationStore;
use daisy_memory::SqliteStore;

pub async fn run(list: bool, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let path = config.store_path();

    if !path.exists() {
        println!("   No conversations stored yet ({}).", path.display());
        return Ok(());
    }

    let store = SqliteStore::open(
        &path,
        config.store.max_connections,
        ConversationId::from(config.store.conversation_id.as_str()),
    )
    .await?;

    if list {
        println!("📚 Conversations");
        println!("================");
        for summary in store.conversations().await? {
            println!(
                "  {:<20} {:>5} messages  {}",
                summary.id.0,
                summary.message_count,
                summary.name.as_deref().unwrap_or("(unnamed)")
            );
            if let Some(text) = &summary.summary {
                println!("  {:<20} {text}", "");
            }
        }
        return Ok(());
    }

    println!("💬 Conversation {}", store.conversation());
    println!("==================");
    for message in store.recent(limit).await? {
        let when = message
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("  [{when}] {:<9} {}", message.role.as_str(), message.content);
    }

    Ok(())
}
