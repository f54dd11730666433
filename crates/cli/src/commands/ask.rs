//! `ragline ask`: Answer one question from the terminal.

use std::io::Write;
use std::sync::Arc;
use ragline_config::{AppConfig, ConfigError};
use ragline_core::ChatQuery;
use ragline_engine::{ChatOrchestrator, Citation, StreamEvent, aggregate};
use ragline_retrieval::EmbeddingRetriever;

pub async fn run(
    query: String,
    use_general_llm: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let query = ChatQuery::new(query, use_general_llm);
    query.validate()?;

    let provider = match ragline_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(e @ ConfigError::MissingCredential(_)) => {
            print_key_help();
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    let retriever = EmbeddingRetriever::from_config(&config, Arc::clone(&provider))?;
    let orchestrator = ChatOrchestrator::from_config(&config, provider, Arc::new(retriever));

    let events = orchestrator.handle_query(&query);

    if json {
        let response = aggregate(events).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut events = events;
    let mut stdout = std::io::stdout();
    let mut citation = None;

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Token(text) => {
                print!("{text}");
                stdout.flush()?;
            }
            StreamEvent::Citation(c) => citation = Some(c),
            StreamEvent::End(_) => {
                println!();
                if let Some(c) = &citation {
                    println!();
                    println!("{}", format_citation(c));
                }
            }
            StreamEvent::Error(message) => {
                println!();
                return Err(message.into());
            }
        }
    }

    Ok(())
}

fn print_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    OPENAI_API_KEY=sk-...");
    eprintln!("    RAGLINE_API_KEY=sk-...      (takes priority)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

fn format_citation(citation: &Citation) -> String {
    let confidence = citation
        .confidence
        .map(|c| format!("{:.0}%", c * 100.0))
        .unwrap_or_else(|| "n/a".into());

    match &citation.notes {
        Some(notes) => format!("[{} | confidence {confidence} | {notes}]", citation.source),
        None => format!("[{} | confidence {confidence}]", citation.source),
    }
}
