//! The chat client: registry, active model, and conversation in one place.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::auth::Credential;
use crate::config::{Config, ConfigError};
use crate::conversation::Conversation;
use crate::error::{ChatError, Result};
use crate::llm::{
    ChatRequest, LLMProvider, Message, OpenAICompatibleProvider, ResponseFormat, Role,
};
use crate::registry::{Backend, DiscoveryPolicy, ModelEntry, ModelRegistry};
use crate::selector::ModelSelector;
use crate::stream::ReplyStream;

/// A single conversation with one active model at a time.
///
/// Each client owns its own history and selection. Use separate clients for
/// separate conversations.
#[derive(Debug)]
pub struct ChatClient {
    registry: ModelRegistry,
    active: Option<u32>,
    conversation: Conversation,
    policy: DiscoveryPolicy,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatClient {
    /// Load credentials from `config_path`, or from `API_KEY`/`BASE_URL` when
    /// no path is given, then discover models. The first model becomes active.
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path).await?,
            None => Config::from_env()?,
        };
        Self::from_config(config).await
    }

    /// Build a client talking to every server in `config` over HTTP.
    pub async fn from_config(config: Config) -> Result<Self> {
        let credentials = config.credentials()?;

        let mut http = Client::builder();
        if let Some(secs) = config.request_timeout_seconds {
            http = http.timeout(Duration::from_secs(secs));
        }
        let http = http.build().map_err(ConfigError::HttpClient)?;

        let mut builder = Self::builder().discovery_policy(config.discovery.on_error);
        for credential in credentials {
            let provider = OpenAICompatibleProvider::new(
                http.clone(),
                &credential.url,
                credential.api_key.clone(),
            );
            builder = builder.backend(credential, Arc::new(provider));
        }
        builder.build().await
    }

    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    // ------------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------------

    /// Every discovered model in id order.
    pub fn available_models(&self) -> &[ModelEntry] {
        self.registry.entries()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Select a model by id, name, or name and provider. On failure the
    /// active model is unchanged.
    pub fn set_model(&mut self, selector: impl Into<ModelSelector>) -> Result<&ModelEntry> {
        let selector = selector.into();
        let entry = self
            .registry
            .resolve(&selector)
            .ok_or_else(|| ChatError::NotFound(selector.clone()))?;
        self.active = Some(entry.id);
        info!(id = entry.id, model = %entry.name, server = %entry.server, "Selected model");
        Ok(entry)
    }

    pub fn set_model_by_id(&mut self, id: u32) -> Result<&ModelEntry> {
        self.set_model(ModelSelector::Id(id))
    }

    /// Select by name only. Names shared by several providers pick the lowest id.
    pub fn set_model_by_name(&mut self, name: &str) -> Result<&ModelEntry> {
        self.set_model(ModelSelector::Name(name.to_string()))
    }

    pub fn set_model_by_name_and_server(
        &mut self,
        name: &str,
        provider: &str,
    ) -> Result<&ModelEntry> {
        self.set_model(ModelSelector::name_and_provider(name, provider))
    }

    pub fn selected_model(&self) -> Result<&ModelEntry> {
        self.active
            .and_then(|id| self.registry.get(id))
            .ok_or(ChatError::NoModelSelected)
    }

    /// Re-run discovery. The active model is kept when the same server still
    /// offers it, otherwise the first model becomes active. On failure the
    /// current registry stays in place.
    pub async fn refresh_models(&mut self) -> Result<()> {
        let previous = self
            .selected_model()
            .ok()
            .map(|entry| (entry.server.clone(), entry.name.clone()));

        let registry = self.registry.rediscover(self.policy).await?;

        self.active = previous
            .and_then(|(server, name)| {
                registry
                    .entries()
                    .iter()
                    .find(|entry| entry.server == server && entry.name == name)
            })
            .or_else(|| registry.first())
            .map(|entry| entry.id);
        self.registry = registry;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------------

    pub fn set_system_prompt(&mut self, text: &str) {
        self.conversation.set_system_prompt(text);
    }

    pub fn append_history(&mut self, role: Role, content: &str) {
        self.conversation.append(role, content);
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.history()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Clear the history and the system prompt.
    pub fn chat_cleanup(&mut self) {
        self.conversation.reset();
    }

    pub fn set_temperature(&mut self, temperature: Option<f32>) {
        self.temperature = temperature;
    }

    pub fn set_max_tokens(&mut self, max_tokens: Option<u32>) {
        self.max_tokens = max_tokens;
    }

    // ------------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------------

    /// Send `text` and wait for the full reply.
    pub async fn chat(&mut self, text: &str) -> Result<String> {
        self.complete(text, None).await
    }

    /// Send `text` asking the endpoint for a JSON object. The reply is
    /// returned as-is and is not checked for validity; the prompt should
    /// describe the expected JSON shape.
    pub async fn json_chat(&mut self, text: &str) -> Result<String> {
        self.complete(text, Some(ResponseFormat::JsonObject)).await
    }

    /// Send `text` and stream the reply. See [`ReplyStream`] for when the
    /// assistant turn is recorded.
    pub async fn stream_chat(&mut self, text: &str) -> Result<ReplyStream<'_>> {
        let (provider, request) = self.prepare(text, None)?;
        let inner = provider.chat_stream(request).await?;
        Ok(ReplyStream::new(inner, &mut self.conversation))
    }

    async fn complete(&mut self, text: &str, format: Option<ResponseFormat>) -> Result<String> {
        let (provider, request) = self.prepare(text, format)?;
        let reply = provider.chat(request).await?.into_content()?;
        self.conversation.append(Role::Assistant, reply.clone());
        Ok(reply)
    }

    /// Record the user turn and build the request for the active model.
    fn prepare(
        &mut self,
        text: &str,
        format: Option<ResponseFormat>,
    ) -> Result<(Arc<dyn LLMProvider>, ChatRequest)> {
        let entry = self.selected_model()?;
        let provider = self.registry.provider_for(entry);
        let model = entry.name.clone();
        let server = entry.server.clone();

        self.conversation.append(Role::User, text);

        let mut request = ChatRequest::new(model, self.conversation.to_request_messages());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.response_format = format;

        debug!(
            model = %request.model,
            server = %server,
            messages = request.messages.len(),
            json = request.response_format.is_some(),
            "Sending chat request"
        );
        Ok((provider, request))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assemble a client from explicit backends.
#[derive(Debug, Default)]
pub struct ChatClientBuilder {
    backends: Vec<Backend>,
    policy: DiscoveryPolicy,
}

impl ChatClientBuilder {
    #[must_use]
    pub fn backend(mut self, credential: Credential, provider: Arc<dyn LLMProvider>) -> Self {
        self.backends.push(Backend::new(credential, provider));
        self
    }

    #[must_use]
    pub fn discovery_policy(mut self, policy: DiscoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Discover models and select the first one.
    pub async fn build(self) -> Result<ChatClient> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoServers.into());
        }

        let registry = ModelRegistry::discover(self.backends, self.policy).await?;
        let active = registry.first().map(|entry| entry.id);
        if let Some(entry) = registry.first() {
            info!(id = entry.id, model = %entry.name, "Defaulting to first model");
        }

        Ok(ChatClient {
            registry,
            active,
            conversation: Conversation::new(),
            policy: self.policy,
            temperature: None,
            max_tokens: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMError;
    use crate::testing::{MockProvider, credential};
    use futures::StreamExt;

    async fn two_server_client() -> (ChatClient, Arc<MockProvider>, Arc<MockProvider>) {
        let openai = Arc::new(MockProvider::with_models(&[("gpt-x", "openai")]));
        let deepseek = Arc::new(MockProvider::with_models(&[("deepseek-chat", "deepseek")]));
        let client = ChatClient::builder()
            .backend(credential("openai"), openai.clone())
            .backend(credential("deepseek"), deepseek.clone())
            .build()
            .await
            .unwrap();
        (client, openai, deepseek)
    }

    async fn empty_client() -> ChatClient {
        ChatClient::builder()
            .backend(credential("empty"), Arc::new(MockProvider::with_models(&[])))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_model_is_active_by_default() {
        let (client, _, _) = two_server_client().await;
        assert_eq!(client.selected_model().unwrap().id, 1);
        assert_eq!(client.available_models().len(), 2);
    }

    #[tokio::test]
    async fn test_select_by_name() {
        let (mut client, _, _) = two_server_client().await;
        client.set_model_by_name("deepseek-chat").unwrap();
        let selected = client.selected_model().unwrap();
        assert_eq!(selected.id, 2);
        assert_eq!(selected.provider, "deepseek");
    }

    #[tokio::test]
    async fn test_select_by_id_range() {
        let (mut client, _, _) = two_server_client().await;
        for id in 1..=2 {
            assert_eq!(client.set_model_by_id(id).unwrap().id, id);
            assert_eq!(client.selected_model().unwrap().id, id);
        }
        for id in [0, 3, 100] {
            assert!(matches!(
                client.set_model_by_id(id),
                Err(ChatError::NotFound(ModelSelector::Id(_)))
            ));
        }
    }

    #[tokio::test]
    async fn test_failed_selection_keeps_active_model() {
        let (mut client, _, _) = two_server_client().await;
        client.set_model(2u32).unwrap();

        assert!(client.set_model("missing-model").is_err());
        assert!(client.set_model_by_name_and_server("gpt-x", "deepseek").is_err());
        assert_eq!(client.selected_model().unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_polymorphic_set_model() {
        let (mut client, _, _) = two_server_client().await;
        assert_eq!(client.set_model("2").unwrap().name, "deepseek-chat");
        assert_eq!(client.set_model("gpt-x").unwrap().id, 1);
        assert_eq!(
            client.set_model(("deepseek-chat", "deepseek")).unwrap().id,
            2
        );
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_selection() {
        let mut client = empty_client().await;
        assert!(matches!(
            client.selected_model(),
            Err(ChatError::NoModelSelected)
        ));

        assert!(matches!(
            client.chat("hello").await,
            Err(ChatError::NoModelSelected)
        ));
        assert!(matches!(
            client.json_chat("hello").await,
            Err(ChatError::NoModelSelected)
        ));
        assert!(matches!(
            client.stream_chat("hello").await,
            Err(ChatError::NoModelSelected)
        ));
        assert!(client.history().is_empty());
    }

    #[tokio::test]
    async fn test_builder_without_backends_is_config_error() {
        let result = ChatClient::builder().build().await;
        assert!(matches!(result, Err(ChatError::Config(ConfigError::NoServers))));
    }

    #[tokio::test]
    async fn test_chat_records_both_turns_and_routes_to_active_server() {
        let (mut client, openai, deepseek) = two_server_client().await;
        deepseek.set_reply("Hello from deepseek");
        client.set_model_by_name("deepseek-chat").unwrap();
        client.set_system_prompt("Be brief.");

        let reply = client.chat("Hello, how are you?").await.unwrap();
        assert_eq!(reply, "Hello from deepseek");

        assert_eq!(
            client.history(),
            [
                Message::user("Hello, how are you?"),
                Message::assistant("Hello from deepseek"),
            ]
        );

        assert!(openai.requests().is_empty());
        let requests = deepseek.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "deepseek-chat");
        assert_eq!(
            requests[0].messages,
            vec![Message::system("Be brief."), Message::user("Hello, how are you?")]
        );
        assert!(requests[0].response_format.is_none());
    }

    #[tokio::test]
    async fn test_second_turn_sends_full_history() {
        let (mut client, openai, _) = two_server_client().await;
        openai.set_reply("first");
        client.chat("one").await.unwrap();
        openai.set_reply("second");
        client.chat("two").await.unwrap();

        let requests = openai.requests();
        assert_eq!(
            requests[1].messages,
            vec![
                Message::user("one"),
                Message::assistant("first"),
                Message::user("two"),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_options_are_forwarded() {
        let (mut client, openai, _) = two_server_client().await;
        client.set_temperature(Some(0.2));
        client.set_max_tokens(Some(64));
        client.chat("hi").await.unwrap();

        let request = &openai.requests()[0];
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(64));
    }

    #[tokio::test]
    async fn test_stream_matches_blocking_chat() {
        let reply = "The Nile is about 6650 km long.";

        let (mut blocking, openai, _) = two_server_client().await;
        openai.set_reply(reply);
        let full = blocking.chat("How long is the Nile?").await.unwrap();

        let (mut streaming, openai, _) = two_server_client().await;
        openai.set_reply(reply);
        let mut stream = streaming.stream_chat("How long is the Nile?").await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        drop(stream);

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), full);
        assert_eq!(streaming.history(), blocking.history());
    }

    #[tokio::test]
    async fn test_partially_consumed_stream_skips_assistant_turn() {
        let (mut client, openai, _) = two_server_client().await;
        openai.set_reply("purr purr purr");

        let mut stream = client.stream_chat("Hello").await.unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        assert_eq!(client.history(), [Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_json_chat_returns_raw_text() {
        let (mut client, openai, _) = two_server_client().await;
        openai.set_reply("{ not really json");
        client.set_system_prompt("Answer in JSON.");

        let reply = client.json_chat("Which is the longest river?").await.unwrap();
        assert_eq!(reply, "{ not really json");
        assert_eq!(
            openai.requests()[0].response_format,
            Some(ResponseFormat::JsonObject)
        );
        assert_eq!(client.history().last(), Some(&Message::assistant("{ not really json")));
    }

    #[tokio::test]
    async fn test_chat_failure_surfaces_request_error() {
        let (mut client, openai, _) = two_server_client().await;
        openai.fail_chat_with(LLMError::Api {
            status: 500,
            message: "overloaded".to_string(),
        });

        let err = client.chat("hi").await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::ChatRequest(LLMError::Api { status: 500, .. })
        ));
        // The user turn stays; no assistant turn is recorded.
        assert_eq!(client.history(), [Message::user("hi")]);
        assert_eq!(openai.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_clears_history_and_system_prompt() {
        let (mut client, _, _) = two_server_client().await;
        client.set_system_prompt("You are a cat.");
        client.chat("hi").await.unwrap();
        client.append_history(Role::User, "extra");

        client.chat_cleanup();

        assert!(client.conversation().to_request_messages().is_empty());
        assert!(client.conversation().system_prompt().is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_active_model_by_server_and_name() {
        let (mut client, openai, _) = two_server_client().await;
        client.set_model_by_name("deepseek-chat").unwrap();

        openai.set_models(vec![
            crate::llm::RemoteModel {
                id: "gpt-x".to_string(),
                owned_by: Some("openai".to_string()),
            },
            crate::llm::RemoteModel {
                id: "gpt-y".to_string(),
                owned_by: Some("openai".to_string()),
            },
        ]);
        client.refresh_models().await.unwrap();

        let selected = client.selected_model().unwrap();
        assert_eq!(selected.name, "deepseek-chat");
        assert_eq!(selected.id, 3);
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_first_model() {
        let (mut client, _, deepseek) = two_server_client().await;
        client.set_model_by_id(2).unwrap();

        deepseek.set_models(Vec::new());
        client.refresh_models().await.unwrap();

        assert_eq!(client.selected_model().unwrap().name, "gpt-x");
        assert_eq!(client.available_models().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_registry() {
        let (mut client, _, deepseek) = two_server_client().await;
        client.set_model_by_id(2).unwrap();

        deepseek.fail_discovery();
        assert!(matches!(
            client.refresh_models().await,
            Err(ChatError::Discovery(_))
        ));
        assert_eq!(client.available_models().len(), 2);
        assert_eq!(client.selected_model().unwrap().id, 2);
    }
}
