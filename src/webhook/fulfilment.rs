//! Dialogflow-style fulfilment envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::conversation::{ConversationContext, ConversationTurn, TurnResponse};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfilmentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    pub session: String,
    pub query_result: QueryResult,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub query_text: String,
    #[serde(default)]
    pub parameters: JsonMap<String, JsonValue>,
    #[serde(default)]
    pub output_contexts: Vec<OutputContext>,
    #[serde(default)]
    pub intent: IntentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputContext {
    pub name: String,
    #[serde(default)]
    pub lifespan_count: u32,
    #[serde(default)]
    pub parameters: JsonMap<String, JsonValue>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupEventInput {
    pub name: String,
    pub language_code: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfilmentResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_contexts: Vec<OutputContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_event_input: Option<FollowupEventInput>,
}

impl FulfilmentRequest {
    pub fn into_turn(self) -> ConversationTurn {
        let query = self.query_result;
        ConversationTurn {
            session_id: self.session,
            intent_name: query.intent.display_name,
            parameters: flatten_parameters(&query.parameters),
            output_contexts: query
                .output_contexts
                .iter()
                .map(|context| ConversationContext {
                    name: context.name.clone(),
                    lifespan_count: context.lifespan_count,
                    parameters: flatten_parameters(&context.parameters),
                })
                .collect(),
        }
    }
}

impl From<&TurnResponse> for FulfilmentResponse {
    fn from(response: &TurnResponse) -> Self {
        Self {
            output_contexts: response
                .output_contexts
                .iter()
                .map(|context| OutputContext {
                    name: context.name.clone(),
                    lifespan_count: context.lifespan_count,
                    parameters: context
                        .parameters
                        .iter()
                        .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
                        .collect(),
                })
                .collect(),
            followup_event_input: response.followup.as_ref().map(|event| FollowupEventInput {
                name: event.name.clone(),
                language_code: event.language_code.clone(),
            }),
        }
    }
}

/// Status and body for the transport. Only handled turns carry a body.
pub fn encode_response(response: &TurnResponse) -> anyhow::Result<(u16, Option<Vec<u8>>)> {
    if response.status != 200 {
        return Ok((response.status, None));
    }
    let body = serde_json::to_vec(&FulfilmentResponse::from(response))?;
    Ok((response.status, Some(body)))
}

// Platform parameters arrive as arbitrary JSON; the steps work on strings.
fn flatten_parameters(
    parameters: &JsonMap<String, JsonValue>,
) -> std::collections::BTreeMap<String, String> {
    parameters
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                JsonValue::Null => return None,
                JsonValue::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::FollowupEvent;
    use serde_json::json;

    #[test]
    fn decodes_turn_from_fulfilment_body() {
        let request: FulfilmentRequest = serde_json::from_value(json!({
            "responseId": "r-1",
            "session": "projects/p/agent/sessions/s1",
            "queryResult": {
                "queryText": "dix comptes",
                "parameters": { "accounts-number": 10, "end-date": "", "unused": null },
                "intent": { "displayName": "Fulfil end date" },
                "outputContexts": [{
                    "name": "projects/p/agent/sessions/s1/contexts/accounts-info",
                    "lifespanCount": 4,
                    "parameters": { "accounts-name-computed": "kata" }
                }]
            }
        }))
        .unwrap();
        let turn = request.into_turn();
        assert_eq!(turn.intent_name, "Fulfil end date");
        assert_eq!(turn.parameters["accounts-number"], "10");
        assert!(turn.parameter("end-date").is_none());
        assert!(!turn.parameters.contains_key("unused"));
        assert_eq!(
            turn.context("accounts-info").unwrap().parameters["accounts-name-computed"],
            "kata"
        );
    }

    #[test]
    fn encodes_contexts_and_followup() -> anyhow::Result<()> {
        let response = TurnResponse::ok()
            .context(ConversationContext {
                name: "s/contexts/accounts-info".to_string(),
                lifespan_count: 5,
                parameters: [("end-date-computed".to_string(), "x".to_string())].into(),
            })
            .followup(FollowupEvent {
                name: "event_order_account_creation".to_string(),
                language_code: "fr".to_string(),
            });
        let (status, body) = encode_response(&response)?;
        assert_eq!(status, 200);
        let value: JsonValue = serde_json::from_slice(&body.unwrap())?;
        assert_eq!(value["outputContexts"][0]["lifespanCount"], 5);
        assert_eq!(value["followupEventInput"]["name"], "event_order_account_creation");
        Ok(())
    }

    #[test]
    fn error_statuses_have_no_body() -> anyhow::Result<()> {
        assert_eq!(encode_response(&TurnResponse::not_found())?, (404, None));
        assert_eq!(encode_response(&TurnResponse::bad_request())?, (400, None));
        Ok(())
    }
}
