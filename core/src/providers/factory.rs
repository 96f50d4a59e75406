use crate::config::Config;
use crate::providers::OpenAIProvider;
use crate::traits::Provider;
use std::sync::Arc;
use std::time::Duration;

pub fn create_provider(config: &Config) -> Arc<dyn Provider> {
    let provider = OpenAIProvider::with_connect_timeout(
        config.api_key.clone(),
        Duration::from_secs(config.connect_timeout_secs),
    )
    .with_model(config.model.clone())
    .with_api_url(config.api_url.clone());

    tracing::info!(
        url = %provider.api_url(),
        model = %provider.model(),
        authenticated = !config.api_key.is_empty(),
        "Provider configured"
    );

    Arc::new(provider)
}
