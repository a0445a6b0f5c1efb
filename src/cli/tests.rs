#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use crate::config::LLMProvider;
    use crate::i18n::TargetLanguage;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_args_default_values() {
        let args = Args::try_parse_from(&["ragagent"]).unwrap();

        assert!(args.query.is_none());
        assert!(args.config.is_none());
        assert!(args.documents.is_none());
        assert!(!args.single_agent);
        assert!(!args.no_workers);
        assert!(!args.show_workers);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_short_options() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "-q", "What is RAG?",
            "-d", "/data/docs.json",
            "-v"
        ]).unwrap();

        assert_eq!(args.query, Some("What is RAG?".to_string()));
        assert_eq!(args.documents, Some(PathBuf::from("/data/docs.json")));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_llm_options() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "--llm-provider", "deepseek",
            "--llm-api-key", "test-key",
            "--llm-api-base-url", "https://api.deepseek.com",
            "--model", "deepseek-chat",
            "--max-tokens", "2048",
            "--temperature", "0.7"
        ]).unwrap();

        assert_eq!(args.llm_provider, Some("deepseek".to_string()));
        assert_eq!(args.llm_api_key, Some("test-key".to_string()));
        assert_eq!(args.llm_api_base_url, Some("https://api.deepseek.com".to_string()));
        assert_eq!(args.model, Some("deepseek-chat".to_string()));
        assert_eq!(args.max_tokens, Some(2048));
        assert_eq!(args.temperature, Some(0.7));
    }

    #[test]
    fn test_session_options() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "--query", "hello",
            "--single-agent",
            "--show-workers"
        ]).unwrap();

        let options = args.session_options();
        assert_eq!(options.query, Some("hello".to_string()));
        assert!(options.single_agent);
        assert!(options.show_workers);
    }

    #[test]
    fn test_into_config_basic() {
        let args = Args::try_parse_from(&["ragagent"]).unwrap();

        let config = args.into_config().unwrap();

        assert!(config.agents.use_workers);
        assert_eq!(config.agents.workers.len(), 3);
        assert!(!config.verbose);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_into_config_with_overrides() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "--no-workers",
            "--verbose",
            "--llm-provider", "anthropic",
            "--model", "claude-sonnet",
            "--target-language", "ja",
            "--documents", "docs.json",
            "--retrieval-limit", "8",
            "--task-timeout", "60"
        ]).unwrap();

        let config = args.into_config().unwrap();

        assert!(!config.agents.use_workers);
        assert!(config.verbose);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.llm.provider, LLMProvider::Anthropic);
        assert_eq!(config.llm.model, "claude-sonnet");
        assert_eq!(config.target_language, TargetLanguage::Japanese);
        assert_eq!(config.knowledge.documents_path, Some(PathBuf::from("docs.json")));
        assert_eq!(config.knowledge.retrieval_limit, 8);
        assert_eq!(config.agents.task_timeout_seconds, Some(60));
    }

    #[test]
    fn test_invalid_llm_provider_keeps_default() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "--llm-provider", "invalid"
        ]).unwrap();

        let config = args.into_config().unwrap();
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
    }

    #[test]
    fn test_into_config_missing_explicit_file_is_error() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "-c", "/nonexistent/ragagent.toml"
        ]).unwrap();

        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_into_config_file_then_cli_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[llm]
model = "from-file"
temperature = 0.9
"#,
        )
        .unwrap();

        let args = Args::try_parse_from(&[
            "ragagent",
            "-c", path.to_str().unwrap(),
            "--model", "from-cli"
        ]).unwrap();

        let config = args.into_config().unwrap();
        assert_eq!(config.llm.model, "from-cli");
        assert_eq!(config.llm.temperature, 0.9);
    }

    #[test]
    fn test_zero_retrieval_limit_rejected() {
        let args = Args::try_parse_from(&[
            "ragagent",
            "--retrieval-limit", "0"
        ]).unwrap();

        assert!(args.into_config().is_err());
    }
}
