//! `daisy embed`: write module files with embedded example phrases.

use daisy_commands::{ExampleIndex, ModuleFile};

pub async fn run(only: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_with_key()?;
    let backends = daisy_providers::build_from_config(&config)
        .map_err(|e| format!("Failed to set up backends: {e}"))?;

    let dir = config.modules_dir();
    let existing = ExampleIndex::load_dir(&dir)?;
    let registry = daisy_tools::default_registry();

    if let Some(name) = only
        && registry.get(name).is_none()
    {
        return Err(format!("Unknown tool: {name}").into());
    }

    println!("🧩 Embedding command examples into {}", dir.display());
    println!();

    let mut written = 0;
    for tool in registry.iter() {
        if only.is_some_and(|name| name != tool.name()) {
            continue;
        }

        let module = ModuleFile::embed_tool(
            tool.as_ref(),
            backends.embeddings.as_ref(),
            existing.get(tool.name()),
        )
        .await
        .map_err(|e| format!("Failed to embed {}: {e}", tool.name()))?;

        let path = module.save(&dir)?;
        println!(
            "✅ {:<12} {} examples -> {}",
            tool.name(),
            module.embeddings.len(),
            path.display()
        );
        written += 1;
    }

    println!("\n🎉 Wrote {written} module files.\n");

    Ok(())
}
