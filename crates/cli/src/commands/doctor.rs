//! `ragline doctor`: Diagnose configuration and index health.

use ragline_config::AppConfig;
use ragline_retrieval::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug)]
struct Check {
    status: Status,
    message: String,
}

impl Check {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: Status::Pass,
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: Status::Warn,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            message: message.into(),
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Ragline Doctor: System Diagnostics");
    println!("===================================\n");

    let checks = match AppConfig::load() {
        Ok(config) => {
            let mut checks = vec![Check::pass("Config valid")];
            checks.extend(diagnose(&config));
            checks
        }
        Err(e) => vec![Check::fail(format!("Config invalid: {e}"))],
    };

    for check in &checks {
        let mark = match check.status {
            Status::Pass => "ok  ",
            Status::Warn => "warn",
            Status::Fail => "FAIL",
        };
        println!("  [{mark}] {}", check.message);
    }

    let issues = checks.iter().filter(|c| c.status != Status::Pass).count();
    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

fn diagnose(config: &AppConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    if config.require_api_key().is_ok() {
        checks.push(Check::pass(format!("API key configured for '{}'", config.provider.name)));
    } else if ragline_providers::is_local(&config.provider.name) {
        checks.push(Check::pass(format!("Local provider '{}' needs no API key", config.provider.name)));
    } else {
        checks.push(Check::fail(
            "No API key configured (set OPENAI_API_KEY or RAGLINE_API_KEY)",
        ));
    }

    let path = &config.retrieval.index_path;
    if !path.exists() {
        checks.push(Check::warn(format!(
            "No index at {}; every strict query will be refused",
            path.display()
        )));
    } else {
        match VectorIndex::load(path, config.vector.dimensions, config.vector.similarity_metric) {
            Ok(index) => {
                let stats = index.stats();
                if stats.chunks_with_embeddings == 0 {
                    checks.push(Check::warn(format!("Index at {} has no embedded chunks", path.display())));
                } else {
                    checks.push(Check::pass(format!(
                        "Index loaded: {} chunks from {} documents",
                        stats.total_chunks, stats.total_documents
                    )));
                }
            }
            Err(e) => checks.push(Check::fail(format!("Index unusable: {e}"))),
        }
    }

    let t = &config.retrieval.thresholds;
    match t.validate() {
        Ok(()) => checks.push(Check::pass(format!(
            "Thresholds: strict {:.2}, high {:.2}, low {:.2}",
            t.strict_kb, t.high, t.low
        ))),
        Err(e) => checks.push(Check::fail(e.to_string())),
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_index(path: std::path::PathBuf) -> AppConfig {
        let mut config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        config.retrieval.index_path = path;
        config.vector.dimensions = 2;
        config
    }

    #[test]
    fn missing_key_fails() {
        let mut config = config_with_index("/nonexistent/index.json".into());
        config.api_key = None;
        let checks = diagnose(&config);
        assert_eq!(checks[0].status, Status::Fail);
    }

    #[test]
    fn missing_index_warns() {
        let checks = diagnose(&config_with_index("/nonexistent/index.json".into()));
        assert_eq!(checks[0].status, Status::Pass);
        assert_eq!(checks[1].status, Status::Warn);
    }

    #[test]
    fn healthy_index_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"chunks":[{"id":"a","documentId":"d","content":"x","embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();

        let checks = diagnose(&config_with_index(path));
        assert!(checks.iter().all(|c| c.status == Status::Pass), "{checks:?}");
    }

    #[test]
    fn wrong_dimension_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"chunks":[{"id":"a","documentId":"d","content":"x","embedding":[1.0,0.0,0.0]}]}"#,
        )
        .unwrap();

        let checks = diagnose(&config_with_index(path));
        assert_eq!(checks[1].status, Status::Fail);
    }

    #[test]
    fn inverted_thresholds_fail() {
        let mut config = config_with_index("/nonexistent/index.json".into());
        config.retrieval.thresholds.low = 0.9;
        let checks = diagnose(&config);
        assert_eq!(checks.last().unwrap().status, Status::Fail);
    }
}
