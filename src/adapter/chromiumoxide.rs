//! Chromiumoxide-backed [`ElementBackend`] implementation.
//!
//! Every operation is a raw CDP command: parameters are assembled as JSON,
//! decoded into the typed chromiumoxide command, executed on the page, and the
//! typed result is re-encoded as JSON so only the fields the explorer needs
//! are inspected.
//!
//! Remote objects are created in one object group per backend and stay alive
//! in the page until [`ChromiumoxideBackend::release_objects`] drops them.

use std::fmt;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::GetOuterHtmlParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    CallFunctionOnParams, EvaluateParams, GetPropertiesParams, ReleaseObjectGroupParams,
};
use chromiumoxide::page::Page;
use serde_json::{Value as JsonValue, json};

use crate::browser::{BrowserError, ElementBackend};

pub const DEFAULT_OBJECT_GROUP: &str = "dom-explorer";

/// An element living in a chromiumoxide page, addressed by its remote object id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteElement {
    object_id: String,
    description: Option<String>,
}

impl RemoteElement {
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Short preview such as `div#main`, as reported by the browser.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Any object produced by an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteValue {
    object_id: String,
    subtype: Option<String>,
    description: Option<String>,
}

impl RemoteValue {
    fn from_remote_object(object: &JsonValue) -> Option<Self> {
        let object_id = object.get("objectId")?.as_str()?.to_string();
        Some(Self {
            object_id,
            subtype: string_field(object, "subtype"),
            description: string_field(object, "description"),
        })
    }

    pub fn is_node(&self) -> bool {
        self.subtype.as_deref() == Some("node")
    }
}

fn cdp_error(err: impl fmt::Display) -> BrowserError {
    BrowserError::Cdp(err.to_string())
}

fn string_field(value: &JsonValue, key: &str) -> Option<String> {
    value.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn js_string_literal(value: &str) -> Result<String, BrowserError> {
    Ok(serde_json::to_string(value)?)
}

/// Fails with [`BrowserError::Evaluation`] when the result carries `exceptionDetails`.
fn check_exception(result: &JsonValue) -> Result<(), BrowserError> {
    let Some(details) = result.get("exceptionDetails") else {
        return Ok(());
    };
    if details.is_null() {
        return Ok(());
    }
    let message = details
        .get("exception")
        .and_then(|exception| string_field(exception, "description"))
        .or_else(|| string_field(details, "text"))
        .unwrap_or_else(|| "script threw an exception".to_string());
    Err(BrowserError::Evaluation(message))
}

/// Interpret a `Runtime.RemoteObject`: `null` and `undefined` become `None`,
/// primitives are rejected.
fn remote_object(result: &JsonValue) -> Result<Option<RemoteValue>, BrowserError> {
    let object = result
        .get("result")
        .ok_or_else(|| BrowserError::Unexpected("missing result object".into()))?;

    let kind = object.get("type").and_then(JsonValue::as_str);
    let subtype = object.get("subtype").and_then(JsonValue::as_str);
    if kind == Some("undefined") || subtype == Some("null") {
        return Ok(None);
    }

    RemoteValue::from_remote_object(object)
        .map(Some)
        .ok_or_else(|| BrowserError::Unexpected(format!("expected an object, got {object}")))
}

fn evaluate_params(expression: &str, object_group: &str) -> Result<EvaluateParams, BrowserError> {
    Ok(serde_json::from_value(json!({
        "expression": expression,
        "objectGroup": object_group,
        "returnByValue": false,
    }))?)
}

fn call_function_params(
    object_id: &str,
    declaration: &str,
    object_group: &str,
    return_by_value: bool,
) -> Result<CallFunctionOnParams, BrowserError> {
    Ok(serde_json::from_value(json!({
        "functionDeclaration": declaration,
        "objectId": object_id,
        "objectGroup": object_group,
        "returnByValue": return_by_value,
        "awaitPromise": true,
    }))?)
}

/// [`ElementBackend`] over one chromiumoxide [`Page`].
#[derive(Clone)]
pub struct ChromiumoxideBackend {
    page: Page,
    object_group: String,
}

impl fmt::Debug for ChromiumoxideBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumoxideBackend")
            .field("target_id", self.page.target_id())
            .field("object_group", &self.object_group)
            .finish()
    }
}

impl ChromiumoxideBackend {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            object_group: DEFAULT_OBJECT_GROUP.to_string(),
        }
    }

    /// Keep this backend's remote objects apart from other backends on the same page.
    pub fn with_object_group(mut self, object_group: impl Into<String>) -> Self {
        self.object_group = object_group.into();
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn object_group(&self) -> &str {
        &self.object_group
    }

    /// Release every remote object this backend has handed out.
    ///
    /// All previously returned [`RemoteElement`]s become invalid; look the
    /// root up again before the next query.
    pub async fn release_objects(&self) -> Result<(), BrowserError> {
        let command: ReleaseObjectGroupParams = serde_json::from_value(json!({
            "objectGroup": self.object_group,
        }))?;
        self.page.execute(command).await.map_err(cdp_error)?;
        Ok(())
    }

    /// Handle to the page's `document`.
    pub async fn document(&self) -> Result<RemoteElement, BrowserError> {
        self.evaluate_to_element("document")
            .await?
            .ok_or_else(|| BrowserError::Unexpected("page has no document".into()))
    }

    /// First element of the page matching `selector`, if any.
    pub async fn find_element(&self, selector: &str) -> Result<Option<RemoteElement>, BrowserError> {
        let expression = format!("document.querySelector({})", js_string_literal(selector)?);
        self.evaluate_to_element(&expression).await
    }

    pub async fn text_content(&self, element: &RemoteElement) -> Result<String, BrowserError> {
        let result = self
            .call_on(
                element,
                "function() { return this.textContent; }",
                true,
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(|object| string_field(object, "value"))
            .unwrap_or_default())
    }

    pub async fn scroll_into_view(&self, element: &RemoteElement) -> Result<(), BrowserError> {
        self.call_on(
            element,
            "function() { this.scrollIntoView({ block: 'end' }); }",
            true,
        )
        .await?;
        Ok(())
    }

    async fn evaluate_to_element(
        &self,
        expression: &str,
    ) -> Result<Option<RemoteElement>, BrowserError> {
        let command = evaluate_params(expression, &self.object_group)?;
        let response = self.page.execute(command).await.map_err(cdp_error)?;
        let result = serde_json::to_value(&response.result)?;
        check_exception(&result)?;
        match remote_object(&result)? {
            Some(remote) => Ok(Some(self.resolve_element(remote).await?)),
            None => Ok(None),
        }
    }

    async fn call_on(
        &self,
        element: &RemoteElement,
        declaration: &str,
        return_by_value: bool,
    ) -> Result<JsonValue, BrowserError> {
        let command = call_function_params(
            &element.object_id,
            declaration,
            &self.object_group,
            return_by_value,
        )?;
        let response = self.page.execute(command).await.map_err(cdp_error)?;
        let result = serde_json::to_value(&response.result)?;
        check_exception(&result)?;
        Ok(result)
    }
}

#[async_trait]
impl ElementBackend for ChromiumoxideBackend {
    type Handle = RemoteElement;
    type Remote = RemoteValue;

    async fn outer_html(&self, element: &RemoteElement) -> Result<String, BrowserError> {
        let command: GetOuterHtmlParams = serde_json::from_value(json!({
            "objectId": element.object_id,
        }))?;
        let response = self.page.execute(command).await.map_err(cdp_error)?;
        let result = serde_json::to_value(&response.result)?;
        string_field(&result, "outerHTML")
            .ok_or_else(|| BrowserError::Unexpected("DOM.getOuterHTML returned no markup".into()))
    }

    async fn call_function_on(
        &self,
        element: &RemoteElement,
        declaration: &str,
    ) -> Result<Option<RemoteValue>, BrowserError> {
        let result = self.call_on(element, declaration, false).await?;
        remote_object(&result)
    }

    async fn resolve_element(&self, remote: RemoteValue) -> Result<RemoteElement, BrowserError> {
        if !remote.is_node() {
            return Err(BrowserError::NotAnElement(
                remote
                    .description
                    .unwrap_or_else(|| remote.subtype.unwrap_or_else(|| "object".into())),
            ));
        }
        Ok(RemoteElement {
            object_id: remote.object_id,
            description: remote.description,
        })
    }

    async fn own_properties(
        &self,
        remote: &RemoteValue,
    ) -> Result<Vec<(String, RemoteValue)>, BrowserError> {
        // Property values join the inspected object's group.
        let command: GetPropertiesParams = serde_json::from_value(json!({
            "objectId": remote.object_id,
            "ownProperties": true,
        }))?;
        let response = self.page.execute(command).await.map_err(cdp_error)?;
        let result = serde_json::to_value(&response.result)?;
        check_exception(&result)?;

        let properties = result
            .get("result")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| BrowserError::Unexpected("Runtime.getProperties returned no list".into()))?;

        Ok(properties
            .iter()
            .filter_map(|property| {
                let name = string_field(property, "name")?;
                let value = RemoteValue::from_remote_object(property.get("value")?)?;
                Some((name, value))
            })
            .collect())
    }
}
