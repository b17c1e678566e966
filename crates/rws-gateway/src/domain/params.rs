//! Per-request session parameters.
//!
//! A bridge request may narrow or redirect what the endpoint streams:
//!
//! | Query key            | Effect                                   | Needs opt-in |
//! |----------------------|------------------------------------------|--------------|
//! | `streams` / `topics` | comma-separated stream names             | no           |
//! | `group.id`           | broker connection name                   | yes          |
//! | `auto.offset.reset`  | `latest` or `earliest`                   | yes          |
//! | anything else        | passed to the broker adapter as `extra`  | yes          |
//!
//! "Opt-in" means the endpoint sets `allow_query_overrides`; otherwise those
//! keys are reported back as ignored.

use rws_core::{BrokerSettings, Endpoint, OffsetReset};

const STREAM_KEYS: [&str; 2] = ["streams", "topics"];
const GROUP_ID_KEY: &str = "group.id";
const OFFSET_RESET_KEY: &str = "auto.offset.reset";

/// Streams and broker settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Stream names or patterns.  Empty means nothing to subscribe to.
    pub streams: Vec<String>,
    pub broker: BrokerSettings,
    /// Query keys that were present but not applied.
    pub ignored: Vec<String>,
}

impl SessionParams {
    /// Applies the request query (without the leading `?`) to the endpoint
    /// defaults.
    pub fn resolve(endpoint: &Endpoint, query: Option<&str>) -> Self {
        let mut params = Self {
            streams: endpoint.streams.clone(),
            broker: endpoint.broker.clone(),
            ignored: Vec::new(),
        };
        let Some(query) = query else {
            return params;
        };

        let allow_overrides = endpoint.broker.allow_query_overrides;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let key = key.into_owned();
            if STREAM_KEYS.contains(&key.as_str()) {
                let requested = split_stream_list(&value);
                if !requested.is_empty() {
                    params.streams = requested;
                }
                continue;
            }
            if !allow_overrides {
                params.ignored.push(key);
                continue;
            }
            match key.as_str() {
                GROUP_ID_KEY => {
                    if !value.is_empty() {
                        params.broker.group_id = Some(value.into_owned());
                    }
                }
                OFFSET_RESET_KEY => match value.parse::<OffsetReset>() {
                    Ok(reset) => params.broker.offset_reset = reset,
                    Err(_) => params.ignored.push(key),
                },
                _ => {
                    params.broker.extra.insert(key, value.into_owned());
                }
            }
        }
        params
    }
}

fn split_stream_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
