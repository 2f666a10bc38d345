//! `daisy onboard`: first-time setup.

use daisy_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🌼 Daisy: First-Time Setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let modules_dir = config_dir.join("modules");
    if !modules_dir.exists() {
        std::fs::create_dir_all(&modules_dir)?;
        println!("✅ Created modules directory: {}", modules_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("      (or set DAISY_API_KEY / OPENAI_API_KEY)");
        println!("   2. Run: daisy embed");
        println!("   3. Run: daisy agent\n");
    }

    println!("🎉 Setup complete! Run `daisy agent` to start talking.\n");

    Ok(())
}
