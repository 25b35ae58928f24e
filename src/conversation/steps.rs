use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Timelike};

use crate::conversation::{
    ACCOUNTS_CONTEXT, ConversationContext, ConversationTurn, FollowupEvent, IntentDispatcher,
    IntentHandler, TurnResponse,
};
use crate::error::LifecycleError;
use crate::lifecycle::AccountLifecycle;
use crate::operator_log;
use crate::workshop::WorkshopRequest;

pub const INTENT_EVENT_NAME: &str = "Fulfil event name";
pub const INTENT_END_DATE: &str = "Fulfil end date";
pub const INTENT_ORDER_CREATION: &str = "Order accounts creation - yes";
pub const EVENT_ORDER_CREATION: &str = "event_order_account_creation";

pub const PARAM_ACCOUNTS_NAME: &str = "accounts-name";
pub const PARAM_ACCOUNTS_NAME_COMPUTED: &str = "accounts-name-computed";
pub const PARAM_END_DATE: &str = "end-date";
pub const PARAM_END_TIME: &str = "end-time";
pub const PARAM_END_DATE_COMPUTED: &str = "end-date-computed";
pub const PARAM_ACCOUNTS_NUMBER: &str = "accounts-number";

pub const MAX_ACCOUNTS_NAME_LEN: usize = 20;

/// Values the conversation never asks for.
#[derive(Clone, Debug)]
pub struct ConversationDefaults {
    pub responsible_contact: Option<String>,
    pub group_name: Option<String>,
    pub language_code: String,
}

impl Default for ConversationDefaults {
    fn default() -> Self {
        Self {
            responsible_contact: None,
            group_name: Some("meetup".to_string()),
            language_code: "fr".to_string(),
        }
    }
}

/// The three-step workshop flow plus the logging fallback for anything else.
pub fn conversation_dispatcher(
    lifecycle: Arc<AccountLifecycle>,
    defaults: ConversationDefaults,
) -> IntentDispatcher {
    IntentDispatcher::builder()
        .intent(INTENT_EVENT_NAME, EventNameStep)
        .intent(
            INTENT_END_DATE,
            EndDateStep::new(defaults.language_code.clone()),
        )
        .intent(
            INTENT_ORDER_CREATION,
            OrderCreationStep::new(lifecycle, defaults),
        )
        .default_intent(UnknownIntent)
        .build()
}

/// Trims, hyphenates inner spaces and caps the length so the result can be
/// used as a username prefix.
pub fn normalize_accounts_name(raw: &str) -> String {
    raw.trim()
        .replace(' ', "-")
        .chars()
        .take(MAX_ACCOUNTS_NAME_LEN)
        .collect()
}

/// Calendar day of `date` (today when absent) at the time of day of `time`
/// (23:59:00 when absent), in the date's own offset.
pub fn compute_end_date(
    date: Option<&str>,
    time: Option<&str>,
    now: DateTime<FixedOffset>,
) -> anyhow::Result<DateTime<FixedOffset>> {
    let (day, offset) = match date {
        Some(raw) => parse_day(raw, *now.offset())?,
        None => (now.date_naive(), *now.offset()),
    };
    let time_of_day = match time {
        Some(raw) => parse_time_of_day(raw)?,
        None => NaiveTime::from_hms_opt(23, 59, 0).context("default end time")?,
    };
    offset
        .from_local_datetime(&day.and_time(time_of_day))
        .single()
        .with_context(|| format!("{day} {time_of_day} does not exist at offset {offset}"))
}

fn parse_day(raw: &str, fallback: FixedOffset) -> anyhow::Result<(NaiveDate, FixedOffset)> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Ok((value.date_naive(), *value.offset()));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("unrecognized end date {raw}"))?;
    Ok((day, fallback))
}

fn parse_time_of_day(raw: &str) -> anyhow::Result<NaiveTime> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        let time = value.time();
        return NaiveTime::from_hms_opt(time.hour(), time.minute(), time.second())
            .context("end time out of range");
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .with_context(|| format!("unrecognized end time {raw}"))
}

/// Builds the creation request from the accumulated context. The account
/// count defaults to one only when the parameter was never supplied; a
/// supplied value must be a whole number.
pub fn workshop_request_from_context(
    context: Option<&ConversationContext>,
    defaults: &ConversationDefaults,
) -> Result<WorkshopRequest, LifecycleError> {
    let value = |key: &str| {
        context
            .and_then(|context| context.parameters.get(key))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let account_count = match value(PARAM_ACCOUNTS_NUMBER) {
        None => 1,
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            LifecycleError::Validation(format!(
                "{PARAM_ACCOUNTS_NUMBER} must be a whole number, got {raw}"
            ))
        })?,
    };
    Ok(WorkshopRequest {
        workshop_name: value(PARAM_ACCOUNTS_NAME_COMPUTED),
        account_count: Some(account_count),
        delete_at: value(PARAM_END_DATE_COMPUTED),
        group_name: defaults.group_name.clone(),
        responsible_contact: defaults.responsible_contact.clone(),
    })
}

pub struct EventNameStep;

#[async_trait]
impl IntentHandler for EventNameStep {
    async fn handle(&self, turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
        let Some(raw) = turn.parameter(PARAM_ACCOUNTS_NAME) else {
            operator_log::error(
                module_path!(),
                format!("{PARAM_ACCOUNTS_NAME} not found in the fulfilment request"),
            );
            return Ok(TurnResponse::bad_request());
        };
        let name = normalize_accounts_name(raw);
        operator_log::info(module_path!(), format!("accounts name computed: {name}"));
        let context = turn.accumulate(ACCOUNTS_CONTEXT, [(PARAM_ACCOUNTS_NAME_COMPUTED, name)]);
        Ok(TurnResponse::ok().context(context))
    }
}

pub struct EndDateStep {
    language_code: String,
    now: fn() -> DateTime<FixedOffset>,
}

impl EndDateStep {
    pub fn new(language_code: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
            now: local_now,
        }
    }

    pub fn with_clock(mut self, now: fn() -> DateTime<FixedOffset>) -> Self {
        self.now = now;
        self
    }
}

fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

#[async_trait]
impl IntentHandler for EndDateStep {
    async fn handle(&self, turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
        let date = turn.parameter(PARAM_END_DATE);
        if date.is_none() {
            operator_log::info(
                module_path!(),
                "end date parameter not found in the payload, end date set to today",
            );
        }
        let end = match compute_end_date(date, turn.parameter(PARAM_END_TIME), (self.now)()) {
            Ok(end) => end,
            Err(err) => {
                operator_log::error(module_path!(), format!("invalid end date: {err:#}"));
                return Ok(TurnResponse::bad_request());
            }
        };
        operator_log::info(module_path!(), format!("the event ends at {}", end.to_rfc3339()));
        let context = turn.accumulate(
            ACCOUNTS_CONTEXT,
            [(PARAM_END_DATE_COMPUTED, end.to_rfc3339())],
        );
        Ok(TurnResponse::ok().context(context).followup(FollowupEvent {
            name: EVENT_ORDER_CREATION.to_string(),
            language_code: self.language_code.clone(),
        }))
    }
}

pub struct OrderCreationStep {
    lifecycle: Arc<AccountLifecycle>,
    defaults: ConversationDefaults,
}

impl OrderCreationStep {
    pub fn new(lifecycle: Arc<AccountLifecycle>, defaults: ConversationDefaults) -> Self {
        Self {
            lifecycle,
            defaults,
        }
    }
}

#[async_trait]
impl IntentHandler for OrderCreationStep {
    async fn handle(&self, turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
        let ordered = match workshop_request_from_context(
            turn.context(ACCOUNTS_CONTEXT),
            &self.defaults,
        ) {
            Ok(request) => self
                .lifecycle
                .create_batch(&request)
                .await
                .map(|accounts| (request, accounts)),
            Err(err) => Err(err),
        };
        match ordered {
            Ok((request, accounts)) => {
                operator_log::info(
                    module_path!(),
                    format!(
                        "ordered {} account(s) for workshop {}",
                        accounts.len(),
                        request.workshop_name.as_deref().unwrap_or_default()
                    ),
                );
                Ok(TurnResponse::ok())
            }
            Err(LifecycleError::Validation(reason)) => {
                operator_log::error(
                    module_path!(),
                    format!("account order incomplete: {reason}"),
                );
                Ok(TurnResponse::bad_request())
            }
            Err(err) => Err(err).context("order accounts creation"),
        }
    }
}

/// Fallback for intents nobody registered.
pub struct UnknownIntent;

#[async_trait]
impl IntentHandler for UnknownIntent {
    async fn handle(&self, turn: &ConversationTurn) -> anyhow::Result<TurnResponse> {
        operator_log::info(
            module_path!(),
            format!("intent not found: {}", turn.intent_name),
        );
        Ok(TurnResponse::not_found())
    }
}
