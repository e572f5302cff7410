//! End-to-end behaviour of the synthesis loop against scripted collaborators.
//!
//! The model is a queue of canned chat completions and the page is a table
//! from query expression to evaluation outcome, so every property of the
//! loop (caching, retry budget, terminal errors) is observable without a
//! browser or network access.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::{CreateChatCompletionRequest, CreateChatCompletionResponse};
use async_trait::async_trait;
use dom_explorer::browser::{BrowserError, ElementBackend};
use dom_explorer::config::Verbosity;
use dom_explorer::explorer::{DomExplorer, ExplorerError};
use dom_explorer::llm::{ChatCompletionProvider, CompletionClient};
use dom_explorer::logging::{ExplorerLogRecord, ExplorerLogger, LogCallback, LogLevel};
use dom_explorer::query::{QueryError, SynthesizedQuery};
use dom_explorer::vocabulary::{QueryOperation, SelectionMode};
use serde_json::{Value, json};

const PAGE_HTML: &str = r#"<section class="timeline css-1dbjc4n"><script>track()</script><article aria-labelledby="id__x1" data-testid="tweet"><h1>Hello</h1></article></section>"#;

#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<VecDeque<CreateChatCompletionResponse>>,
    requests: Mutex<Vec<CreateChatCompletionRequest>>,
}

impl ScriptedModel {
    fn new(responses: impl IntoIterator<Item = CreateChatCompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn invocations(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn prompt(&self, index: usize) -> String {
        let request = serde_json::to_value(&self.requests.lock().unwrap()[index]).unwrap();
        request["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl ChatCompletionProvider for ScriptedModel {
    async fn create_chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, OpenAIError> {
        self.requests.lock().unwrap().push(request);
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            OpenAIError::ApiError(ApiError {
                message: "no scripted response left".into(),
                r#type: None,
                param: None,
                code: None,
            })
        })
    }
}

fn completion(message: Value) -> CreateChatCompletionResponse {
    serde_json::from_value(json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "created": 0,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": message,
            "logprobs": null
        }],
        "usage": {
            "prompt_tokens": 100,
            "completion_tokens": 10,
            "total_tokens": 110
        }
    }))
    .unwrap()
}

fn call(name: &str, arguments: Value) -> CreateChatCompletionResponse {
    completion(json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [{
            "id": "call_0",
            "type": "function",
            "function": { "name": name, "arguments": arguments.to_string() }
        }]
    }))
}

fn selector(selectors: &str) -> CreateChatCompletionResponse {
    call("querySelector", json!({ "selectors": selectors }))
}

fn text(content: &str) -> CreateChatCompletionResponse {
    completion(json!({ "role": "assistant", "content": content }))
}

#[derive(Debug, Clone)]
enum Outcome {
    Throw(&'static str),
    Nothing,
    Element(&'static str),
    Collection(Vec<(&'static str, &'static str)>),
}

#[derive(Debug, Clone)]
enum Remote {
    Element(String),
    Collection(Vec<(String, String)>),
}

/// Page stand-in: unknown expressions throw like an invalid selector would.
#[derive(Default)]
struct ScriptedPage {
    outcomes: Mutex<HashMap<String, Outcome>>,
    evaluated: Mutex<Vec<String>>,
    html_reads: Mutex<usize>,
    html_unavailable: bool,
}

impl ScriptedPage {
    fn with(self, query: SynthesizedQuery, outcome: Outcome) -> Self {
        self.set(query, outcome);
        self
    }

    fn set(&self, query: SynthesizedQuery, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(query.expression(), outcome);
    }

    fn html_reads(&self) -> usize {
        *self.html_reads.lock().unwrap()
    }

    fn evaluations(&self) -> usize {
        self.evaluated.lock().unwrap().len()
    }
}

#[async_trait]
impl ElementBackend for ScriptedPage {
    type Handle = String;
    type Remote = Remote;

    async fn outer_html(&self, _element: &String) -> Result<String, BrowserError> {
        if self.html_unavailable {
            return Err(BrowserError::Cdp("target closed".into()));
        }
        *self.html_reads.lock().unwrap() += 1;
        Ok(PAGE_HTML.to_string())
    }

    async fn call_function_on(
        &self,
        _element: &String,
        declaration: &str,
    ) -> Result<Option<Remote>, BrowserError> {
        self.evaluated.lock().unwrap().push(declaration.to_string());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(declaration)
            .cloned()
            .unwrap_or(Outcome::Throw("SyntaxError: not a valid selector"));
        match outcome {
            Outcome::Throw(message) => Err(BrowserError::Evaluation(message.into())),
            Outcome::Nothing => Ok(None),
            Outcome::Element(name) => Ok(Some(Remote::Element(name.into()))),
            Outcome::Collection(entries) => Ok(Some(Remote::Collection(
                entries
                    .into_iter()
                    .map(|(key, name)| (key.to_string(), name.to_string()))
                    .collect(),
            ))),
        }
    }

    async fn resolve_element(&self, remote: Remote) -> Result<String, BrowserError> {
        match remote {
            Remote::Element(name) => Ok(name),
            Remote::Collection(_) => Err(BrowserError::NotAnElement("collection".into())),
        }
    }

    async fn own_properties(&self, remote: &Remote) -> Result<Vec<(String, Remote)>, BrowserError> {
        match remote {
            Remote::Collection(entries) => Ok(entries
                .iter()
                .map(|(key, name)| (key.clone(), Remote::Element(name.clone())))
                .collect()),
            Remote::Element(_) => Ok(Vec::new()),
        }
    }
}

fn explorer(model: ScriptedModel) -> DomExplorer<ScriptedModel> {
    DomExplorer::new(CompletionClient::new("gpt-4o-mini", model))
}

fn root() -> String {
    "timeline".to_string()
}

fn query_selector(selectors: &str) -> SynthesizedQuery {
    SynthesizedQuery::new(QueryOperation::QuerySelector, selectors)
}

#[tokio::test]
async fn cached_prompt_never_reaches_the_model_again() {
    let page = ScriptedPage::default().with(query_selector("h1"), Outcome::Element("heading"));
    let mut explorer = explorer(ScriptedModel::new([selector("h1")]));

    for _ in 0..5 {
        let found = explorer
            .get_element(&page, &root(), "the heading")
            .await
            .expect("lookup succeeds");
        assert_eq!(found.as_deref(), Some("heading"));
    }

    assert_eq!(explorer.client().provider().invocations(), 1);
    assert_eq!(page.html_reads(), 1);
    assert_eq!(page.evaluations(), 5);
    assert_eq!(explorer.metrics().cache_hits, 4);
    assert_eq!(
        explorer.cache().get(SelectionMode::Single, "the heading"),
        Some(&query_selector("h1"))
    );
}

#[tokio::test]
async fn plain_text_answer_fails_without_retry() {
    let page = ScriptedPage::default();
    let mut explorer = explorer(ScriptedModel::new([
        text("The heading is the h1 element."),
        selector("h1"),
    ]));

    let err = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect_err("prose is not a selection");

    assert!(
        matches!(err, ExplorerError::NoFunctionCall { ref text } if text.starts_with("The heading"))
    );
    assert_eq!(explorer.client().provider().invocations(), 1);
    assert_eq!(page.evaluations(), 0);
    assert!(explorer.cache().is_empty());
}

#[tokio::test]
async fn tenth_distinct_query_succeeds_and_is_cached() {
    let responses: Vec<_> = (1..=10).map(|n| selector(&format!("#try-{n}"))).collect();
    let page =
        ScriptedPage::default().with(query_selector("#try-10"), Outcome::Element("target"));
    let mut explorer = explorer(ScriptedModel::new(responses));

    let found = explorer
        .get_element(&page, &root(), "the target")
        .await
        .expect("last trial works");

    assert_eq!(found.as_deref(), Some("target"));
    assert_eq!(explorer.client().provider().invocations(), 10);
    assert_eq!(page.html_reads(), 10);
    assert_eq!(explorer.metrics().failed_trials, 9);
    assert_eq!(explorer.metrics().single_prompt_tokens, 1000);
    assert_eq!(
        explorer.cache().get(SelectionMode::Single, "the target"),
        Some(&query_selector("#try-10"))
    );
}

#[tokio::test]
async fn exhausting_the_budget_leaves_the_cache_unset() {
    let responses: Vec<_> = (1..=11).map(|n| selector(&format!("#miss-{n}"))).collect();
    let page =
        ScriptedPage::default().with(query_selector("#miss-11"), Outcome::Element("too late"));
    let mut explorer = explorer(ScriptedModel::new(responses));

    let err = explorer
        .get_element(&page, &root(), "the target")
        .await
        .expect_err("ten failures");

    match err {
        ExplorerError::BudgetExhausted {
            trials, last_error, ..
        } => {
            assert_eq!(trials, 10);
            assert!(last_error.unwrap_or_default().contains("not a valid selector"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(explorer.client().provider().invocations(), 10);
    assert!(!explorer.cache().contains(SelectionMode::Single, "the target"));
}

#[tokio::test]
async fn collection_members_come_back_in_index_order() {
    let tweets = SynthesizedQuery::new(QueryOperation::QuerySelectorAll, "article");
    let page = ScriptedPage::default().with(
        tweets.clone(),
        Outcome::Collection(vec![("1", "B"), ("length", "2"), ("0", "A")]),
    );
    let mut explorer = explorer(ScriptedModel::new([call(
        "querySelectorAll",
        json!({ "selectors": "article" }),
    )]));

    let found = explorer
        .get_elements(&page, &root(), "the tweets")
        .await
        .expect("collection resolves");

    assert_eq!(found, ["A", "B"]);
    assert_eq!(
        explorer.cache().get(SelectionMode::Multiple, "the tweets"),
        Some(&tweets)
    );
    assert_eq!(explorer.metrics().multiple_completion_tokens, 10);
}

#[tokio::test]
async fn empty_collection_is_a_cached_success() {
    let rows = SynthesizedQuery::new(QueryOperation::GetElementsByTagName, "tr");
    let page = ScriptedPage::default().with(rows, Outcome::Collection(vec![]));
    let mut explorer = explorer(ScriptedModel::new([call(
        "getElementsByTagName",
        json!({ "name": "tr" }),
    )]));

    let found = explorer
        .get_elements(&page, &root(), "the rows")
        .await
        .expect("empty is valid");
    assert!(found.is_empty());
    assert!(explorer.cache().contains(SelectionMode::Multiple, "the rows"));
}

#[tokio::test]
async fn single_lookup_without_object_is_not_found_and_not_cached() {
    let page = ScriptedPage::default().with(query_selector("aside"), Outcome::Nothing);
    let mut explorer = explorer(ScriptedModel::new([selector("aside"), selector("aside")]));

    let found = explorer
        .get_element(&page, &root(), "the sidebar")
        .await
        .expect("not found is not an error");
    assert_eq!(found, None);
    assert!(explorer.cache().is_empty());
    assert_eq!(explorer.metrics().failed_trials, 0);

    explorer
        .get_element(&page, &root(), "the sidebar")
        .await
        .expect("still not found");
    assert_eq!(explorer.client().provider().invocations(), 2);
}

#[tokio::test]
async fn operation_outside_the_vocabulary_consumes_a_trial() {
    let page = ScriptedPage::default().with(query_selector("h1"), Outcome::Element("heading"));
    let mut explorer = explorer(ScriptedModel::new([
        call("querySelectorAll", json!({ "selectors": "h1" })),
        selector("h1"),
    ]));

    let found = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect("second trial works");

    assert_eq!(found.as_deref(), Some("heading"));
    assert_eq!(explorer.client().provider().invocations(), 2);
    assert_eq!(explorer.metrics().failed_trials, 1);
}

#[tokio::test]
async fn malformed_arguments_are_terminal() {
    let page = ScriptedPage::default();
    let mut explorer = explorer(ScriptedModel::new([
        call("querySelector", json!({ "selectors": 5 })),
        selector("h1"),
    ]));

    let err = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect_err("non-string argument");
    assert!(matches!(
        err,
        ExplorerError::ArgumentParse(QueryError::NonStringArgument { .. })
    ));
    assert_eq!(explorer.client().provider().invocations(), 1);

    let mut explorer = explorer_with_two_arguments();
    let err = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect_err("two arguments");
    assert!(matches!(
        err,
        ExplorerError::ArgumentParse(QueryError::ArgumentCount { found: 2, .. })
    ));
}

fn explorer_with_two_arguments() -> DomExplorer<ScriptedModel> {
    explorer(ScriptedModel::new([call(
        "querySelector",
        json!({ "selectors": "h1", "fallback": "h2" }),
    )]))
}

#[tokio::test]
async fn cached_query_failure_is_returned_without_retry() {
    let page = ScriptedPage::default().with(query_selector("h1"), Outcome::Element("heading"));
    let mut explorer = explorer(ScriptedModel::new([selector("h1"), selector("h2")]));

    explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect("first lookup works");

    page.set(query_selector("h1"), Outcome::Throw("TypeError: detached"));
    let err = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect_err("cached query now throws");

    assert!(matches!(err, ExplorerError::Evaluation(BrowserError::Evaluation(_))));
    assert_eq!(explorer.client().provider().invocations(), 1);
    assert_eq!(page.html_reads(), 1);
}

#[tokio::test]
async fn evicting_a_prompt_forces_resynthesis() {
    let page = ScriptedPage::default()
        .with(query_selector("h1"), Outcome::Element("old"))
        .with(query_selector("main h1"), Outcome::Element("new"));
    let mut explorer = explorer(ScriptedModel::new([selector("h1"), selector("main h1")]));

    explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect("first lookup");
    assert_eq!(explorer.evict("the heading"), 1);

    let found = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect("resynthesized");
    assert_eq!(found.as_deref(), Some("new"));
    assert_eq!(explorer.client().provider().invocations(), 2);

    explorer.clear_cache();
    explorer.reset_metrics();
    assert!(explorer.cache().is_empty());
    assert_eq!(explorer.metrics().model_invocations, 0);
}

#[tokio::test]
async fn single_and_multiple_lookups_are_cached_separately() {
    let items = SynthesizedQuery::new(QueryOperation::GetElementsByClassName, "item");
    let page = ScriptedPage::default()
        .with(query_selector(".item"), Outcome::Element("first"))
        .with(items, Outcome::Collection(vec![("0", "first"), ("1", "second")]));
    let mut explorer = explorer(ScriptedModel::new([
        selector(".item"),
        call("getElementsByClassName", json!({ "names": "item" })),
    ]));

    let one = explorer
        .get_element(&page, &root(), "the items")
        .await
        .expect("single");
    let many = explorer
        .get_elements(&page, &root(), "the items")
        .await
        .expect("multiple");

    assert_eq!(one.as_deref(), Some("first"));
    assert_eq!(many, ["first", "second"]);
    assert_eq!(explorer.cache().len(), 2);
    assert_eq!(explorer.client().provider().invocations(), 2);
}

#[tokio::test]
async fn model_errors_propagate() {
    let page = ScriptedPage::default();
    let mut explorer = explorer(ScriptedModel::default());

    let err = explorer
        .get_element(&page, &root(), "anything")
        .await
        .expect_err("model unavailable");
    assert!(matches!(err, ExplorerError::Llm(_)));
    assert_eq!(explorer.client().provider().invocations(), 1);
}

#[tokio::test]
async fn unreadable_element_html_is_terminal() {
    let page = ScriptedPage {
        html_unavailable: true,
        ..ScriptedPage::default()
    };
    let mut explorer = explorer(ScriptedModel::new([selector("h1")]));

    let err = explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect_err("html read fails");
    assert!(matches!(err, ExplorerError::Browser(BrowserError::Cdp(_))));
    assert_eq!(explorer.client().provider().invocations(), 0);
}

#[tokio::test]
async fn prompt_carries_sanitized_html_and_instructions() {
    let page = ScriptedPage::default().with(query_selector("h1"), Outcome::Element("heading"));
    let mut explorer = explorer(ScriptedModel::new([selector("h1")]))
        .with_instructions(Some("Prefer data-testid attributes.".into()));

    explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect("lookup succeeds");

    let prompt = explorer.client().provider().prompt(0);
    assert!(prompt.contains("The query is 'the heading'"));
    assert!(prompt.contains(r#"<article data-testid="tweet"><h1>Hello</h1></article>"#));
    assert!(!prompt.contains("<script"));
    assert!(!prompt.contains("class="));
    assert!(!prompt.contains("aria-labelledby"));
    assert!(prompt.ends_with("Prefer data-testid attributes."));
}

#[tokio::test]
async fn retries_are_logged_at_debug_level() {
    let records: Arc<Mutex<Vec<ExplorerLogRecord>>> = Arc::default();
    let capture = Arc::clone(&records);
    let sink: LogCallback = Arc::new(move |record: &ExplorerLogRecord| {
        capture.lock().unwrap().push(record.clone());
    });

    let page = ScriptedPage::default().with(query_selector("h1"), Outcome::Element("heading"));
    let mut explorer = explorer(ScriptedModel::new([selector("h1["), selector("h1")]))
        .with_logger(ExplorerLogger::with_sink(Verbosity::Detailed, sink));

    explorer
        .get_element(&page, &root(), "the heading")
        .await
        .expect("second trial works");

    let records = records.lock().unwrap();
    assert!(records.iter().any(|record| {
        record.level == LogLevel::Debug && record.message.contains("re-trying")
    }));
    assert!(records.iter().any(|record| {
        record.level == LogLevel::Info && record.message.starts_with("synthesized query")
    }));
}

#[tokio::test]
async fn smaller_budget_is_honoured() {
    let page = ScriptedPage::default();
    let mut explorer = explorer(ScriptedModel::new((1..=5).map(|n| selector(&format!("#{n}")))))
        .with_max_trials(3);

    let err = explorer
        .get_element(&page, &root(), "anything")
        .await
        .expect_err("three failures");
    assert!(matches!(err, ExplorerError::BudgetExhausted { trials: 3, .. }));
    assert_eq!(explorer.client().provider().invocations(), 3);
}
