//! Registry behaviour against a real SQLite-backed store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use cellchat_agent::{
    AgentBuilder, Capability, ChatModel, ChatRequest, Credentials, Message, ModelEvent, ModelKind,
    ModelProvider, ModelSettings, SENTINEL, StreamingOrchestrator, ToolCall, TurnRequest,
};
use cellchat_store::{Database, ToolConfigPatch, ToolConfigStore, ToolStatus};
use cellchat_tools::{StoreToolSource, ToolRegistry, capabilities::OpenWeatherSearch};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seeded_store(dir: &tempfile::TempDir) -> ToolConfigStore {
    let db = Database::open_and_migrate(dir.path().join("cellchat.db"))
        .await
        .unwrap();
    let store = ToolConfigStore::open(db).await.unwrap();
    store.seed_defaults().await.unwrap();
    store
}

fn ids(registry_output: &[cellchat_agent::CapabilityDescriptor]) -> Vec<String> {
    registry_output.iter().map(|d| d.id.clone()).collect()
}

#[tokio::test]
async fn seeded_store_enables_free_capabilities() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let registry = ToolRegistry::new(Arc::new(StoreToolSource::new(store)));

    assert_eq!(registry.source_kind(), "store");
    let enabled = registry.resolve(true).await.unwrap();
    assert_eq!(ids(&enabled), vec!["duckduckgo", "arxiv", "wikipedia"]);
}

#[tokio::test]
async fn status_changes_apply_to_the_next_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let registry = ToolRegistry::new(Arc::new(StoreToolSource::new(store.clone())));

    store.set_status("arxiv", ToolStatus::Disable).await.unwrap();
    store.set_status("reddit", ToolStatus::Enable).await.unwrap();

    let enabled = registry.resolve(true).await.unwrap();
    assert_eq!(ids(&enabled), vec!["duckduckgo", "wikipedia", "reddit"]);
}

#[tokio::test]
async fn store_credentials_reach_the_capability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("appid", "from-store"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "weather": [{"description": "clear sky"}],
            "main": {"temp": 18.0, "feels_like": 17.0, "temp_min": 15.0, "temp_max": 20.0, "humidity": 40},
            "wind": {"speed": 1.0, "deg": 0},
            "clouds": {"all": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let row = store.get_by_name("openweather").unwrap();
    store
        .update(
            row.id,
            ToolConfigPatch {
                status: Some(ToolStatus::Enable),
                api_key: Some("from-store".into()),
                ..ToolConfigPatch::default()
            },
        )
        .await
        .unwrap();

    let registry = ToolRegistry::with_catalog(
        vec![Arc::new(OpenWeatherSearch::with_base_url(server.uri()))],
        Arc::new(StoreToolSource::new(store)),
    );
    let enabled = registry.resolve(true).await.unwrap();
    assert_eq!(enabled.len(), 1);

    let text = enabled[0].run("Lisbon").await;
    assert!(text.contains("Detailed status: clear sky"), "{text}");
}

// ── configuration snapshots ──────────────────────────────────────────────────

/// Replays one event list per model call and records every request.
struct ScriptedModel {
    scripts: Mutex<Vec<Vec<ModelEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn stream(&self, request: ChatRequest) -> BoxStream<'static, cellchat_agent::Result<ModelEvent>> {
        self.requests.lock().unwrap().push(request);
        let events = self.scripts.lock().unwrap().pop().unwrap_or_default();
        futures::stream::iter(events.into_iter().map(Ok)).boxed()
    }
}

/// Answers the query, then switches itself off in the store.
struct SelfDisablingSearch {
    store: ToolConfigStore,
}

#[async_trait]
impl Capability for SelfDisablingSearch {
    fn id(&self) -> &str {
        "duckduckgo"
    }
    fn name(&self) -> &str {
        "DuckDuckGo"
    }
    fn description(&self) -> &str {
        "Web search."
    }
    async fn search(&self, query: &str, _credentials: &Credentials) -> cellchat_agent::Result<String> {
        self.store
            .set_status("duckduckgo", ToolStatus::Disable)
            .await
            .map_err(|e| cellchat_agent::AgentError::ToolExecution {
                capability: "duckduckgo".into(),
                reason: e.to_string(),
            })?;
        Ok(format!("top hit for {query}"))
    }
}

#[tokio::test]
async fn running_turn_keeps_the_snapshot_it_started_with() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let registry = ToolRegistry::with_catalog(
        vec![Arc::new(SelfDisablingSearch {
            store: store.clone(),
        })],
        Arc::new(StoreToolSource::new(store.clone())),
    );

    let finished = |reason: &str| ModelEvent::Finished {
        stop_reason: Some(reason.into()),
    };
    let mut scripts = vec![
        vec![
            ModelEvent::ToolCall(ToolCall {
                id: "t1".into(),
                name: "duckduckgo".into(),
                arguments: json!({ "query": "rust" }),
            }),
            finished("tool_use"),
        ],
        vec![ModelEvent::TextDelta("found it".into()), finished("end_turn")],
        vec![ModelEvent::TextDelta("no tools now".into()), finished("end_turn")],
    ];
    scripts.reverse();
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(scripts),
        requests: Mutex::new(Vec::new()),
    });
    let provider = Arc::new(ModelProvider::new(ModelSettings::default()));
    provider.register(ModelKind::Claude, model.clone()).await;
    let orchestrator = StreamingOrchestrator::new(AgentBuilder::new(provider));

    let first = TurnRequest::new("claude", "p", vec![Message::user("search rust")])
        .with_capabilities(registry.resolve(true).await.unwrap());
    let chunks: Vec<String> = orchestrator.stream_turn(first).unwrap().collect().await;
    assert_eq!(chunks, vec!["found it", SENTINEL]);

    // The write landed while the turn was still running.
    assert!(!store.get_by_name("duckduckgo").unwrap().is_enabled());

    {
        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let names: Vec<&str> = requests[1].tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"duckduckgo"), "{names:?}");
        let tool_message = requests[1].messages.last().unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("t1"));
        assert_eq!(tool_message.content.text(), "top hit for rust");
    }

    let second = TurnRequest::new("claude", "p", vec![Message::user("again")])
        .with_capabilities(registry.resolve(true).await.unwrap());
    let chunks: Vec<String> = orchestrator.stream_turn(second).unwrap().collect().await;
    assert_eq!(chunks, vec!["no tools now", SENTINEL]);

    let requests = model.requests.lock().unwrap();
    assert!(requests[2].tools.iter().all(|t| t.name != "duckduckgo"));
}
