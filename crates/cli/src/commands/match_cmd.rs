//! `daisy match`: which command would a task be matched to.

use daisy_commands::{CommandCandidate, CommandMatcher, ExampleIndex, MatchOutcome, RankedCommand};

pub async fn run(task: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_with_key()?;
    let backends = daisy_providers::build_from_config(&config)
        .map_err(|e| format!("Failed to set up backends: {e}"))?;

    let index = ExampleIndex::load_dir(&config.modules_dir())?;
    let registry = daisy_tools::default_registry();
    let candidates = CommandCandidate::from_registry(&registry, &index);
    let threshold = config.reasoning.match_threshold;

    println!("🔎 Matching: \"{task}\"");
    println!("   {} commands, {} with examples", candidates.len(), index.len());
    println!();

    let matcher = CommandMatcher::new(backends.embeddings, candidates, threshold);
    match matcher.determine_command(task).await? {
        MatchOutcome::Matched(result) => {
            print_ranked("Best", &result.best);
            if let Some(second) = &result.second {
                print_ranked("Next", second);
            }
        }
        MatchOutcome::BelowThreshold(result) => {
            println!("   No command reached the {threshold:.0}% threshold.");
            print_ranked("Best", &result.best);
            if let Some(second) = &result.second {
                print_ranked("Next", second);
            }
        }
        MatchOutcome::NoCommands => println!("   No commands available."),
    }

    Ok(())
}

fn print_ranked(label: &str, command: &RankedCommand) {
    println!(
        "   {label}: {:<12} {:>5.1}%  {} {}",
        command.name, command.confidence, command.description, command.argument_format
    );
}
