//! Integration tests for the LLM client.
//!
//! These tests make real API calls to OpenRouter.
//! Run with: OPENROUTER_API_KEY=your_key cargo test --test llm_integration -- --ignored

use std::time::Duration;

use reward_forge::experiment::CandidateGenerator;
use reward_forge::llm::{CallOptions, LlmClient, LlmConfig};
use reward_forge::registry::RewardRegistry;
use reward_forge::sandbox::compile;

const TEST_MODEL: &str = "openai/gpt-4o-mini";

fn get_test_api_key() -> String {
    std::env::var("OPENROUTER_API_KEY")
        .expect("OPENROUTER_API_KEY environment variable must be set for integration tests")
}

fn create_test_client() -> LlmClient {
    let config = LlmConfig::new()
        .with_api_key(get_test_api_key())
        .with_timeout(Duration::from_secs(60));
    LlmClient::new(config).expect("client should build")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_call() {
    let client = create_test_client();
    let options = CallOptions::new()
        .with_model(TEST_MODEL)
        .with_system_instruction("You are a helpful assistant. Reply concisely.")
        .with_max_tokens(10)
        .with_temperature(0.0);

    let text = client
        .call("What is 2 + 2? Reply with just the number.", &options)
        .await;
    assert!(text.is_ok(), "Call failed: {:?}", text.err());
    assert!(text.unwrap().contains('4'));
}

#[tokio::test]
#[ignore]
async fn test_generated_reward_compiles() {
    let prompt = "Write a Python function `compute_reward(obs, terminated, truncated, info)` \
                  for a cooling task. obs is [temperature, load]; keep the temperature \
                  between 50 and 60. Use only plain arithmetic and `if` statements. \
                  Reply with a single ```python code block.";

    let mut registry = RewardRegistry::in_memory();
    let summary = CandidateGenerator::new(Some(create_test_client()))
        .with_request_delay(Duration::ZERO)
        .generate(&mut registry, prompt, &[TEST_MODEL], false)
        .await;
    assert_eq!(summary.generated, 1, "summary: {:?}", summary);

    let source = registry
        .get("LLM_gpt-4o-mini")
        .and_then(|c| c.source.clone())
        .expect("candidate should be stored");
    let reward = compile(&source);
    assert!(reward.is_ok(), "Generated code did not compile: {:?}\n{}", reward.err(), source);
}

#[tokio::test]
async fn test_missing_key_fails_without_network() {
    let client = LlmClient::new(LlmConfig::new()).expect("client should build");
    let err = client.call("hi", &CallOptions::new()).await.unwrap_err();
    assert!(matches!(err, reward_forge::LlmError::MissingApiKey(_)));
}
