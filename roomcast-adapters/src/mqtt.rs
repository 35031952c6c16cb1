//! MQTT ingress/egress. Topic scheme `{root}/{scope}/{id}/{field}`,
//! command topics suffixed `/set`; status payloads are JSON objects. Built
//! on `rumqttc`, the off-the-shelf client crate the dependency stack already
//! carries for this.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use tracing::{debug, warn};

use roomcast_coordinator::{Command, EntityKind, Egress, SourceProtocol, StatusEvent, StatusPayload, TaggedCommand};

use crate::error::AdapterError;
use crate::registry;

pub struct MqttAdapter {
    client: AsyncClient,
    topic_root: String,
}

impl MqttAdapter {
    /// Connects to `broker_url` (`tcp://host:port`) and subscribes to every
    /// registered command topic. Returns the adapter plus the background
    /// event-loop driver the caller must `tokio::spawn`.
    pub async fn connect(
        broker_url: &str,
        topic_root: &str,
        out: tokio::sync::mpsc::Sender<TaggedCommand>,
    ) -> Result<(Self, impl std::future::Future<Output = ()>), AdapterError> {
        let (host, port) = parse_broker_url(broker_url)?;
        let mut options = MqttOptions::new("roomcast-control-plane", host, port);
        options.set_keep_alive(Duration::from_secs(15));

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        for route in registry::ROUTES {
            let topic = format!("{}/{}/+/{}/set", topic_root, scope(route.entity_kind), route.mqtt_field);
            client
                .subscribe(&topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| AdapterError::Transport(e.to_string()))?;
        }

        let topic_root_owned = topic_root.to_string();
        let driver = async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Err(e) = handle_publish(&publish.topic, &publish.payload, &topic_root_owned, &out).await {
                            warn!(topic = %publish.topic, error = %e, "dropping malformed MQTT command");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt event loop error; rumqttc will reconnect internally");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        };

        Ok((Self { client, topic_root: topic_root.to_string() }, driver))
    }
}

fn scope(entity_kind: EntityKind) -> &'static str {
    match entity_kind {
        EntityKind::Zone => "zone",
        EntityKind::Client => "client",
    }
}

fn parse_broker_url(url: &str) -> Result<(String, u16), AdapterError> {
    let stripped = url.split("://").next_back().unwrap_or(url);
    let (host, port) = stripped
        .rsplit_once(':')
        .ok_or_else(|| AdapterError::Transport(format!("broker url {url} has no port")))?;
    let port: u16 = port.parse().map_err(|_| AdapterError::Transport(format!("broker url {url} has a non-numeric port")))?;
    Ok((host.to_string(), port))
}

async fn handle_publish(
    topic: &str,
    payload: &[u8],
    topic_root: &str,
    out: &tokio::sync::mpsc::Sender<TaggedCommand>,
) -> Result<(), AdapterError> {
    let command = decode_command_topic(topic, payload, topic_root)?;
    let _ = out.send(TaggedCommand { source: SourceProtocol::Mqtt, command }).await;
    Ok(())
}

/// `{root}/{scope}/{id}/{field}/set` -> `Command`. The field name is looked
/// up against the same [`registry::ROUTES`] table the KNX adapter uses, so
/// there is exactly one place that knows which fields exist.
fn decode_command_topic(topic: &str, payload: &[u8], topic_root: &str) -> Result<Command, AdapterError> {
    let malformed = |reason: &str| AdapterError::MalformedPayload { topic: topic.to_string(), reason: reason.to_string() };

    let rest = topic
        .strip_prefix(topic_root)
        .and_then(|s| s.strip_prefix('/'))
        .ok_or_else(|| malformed("topic does not start with the configured root"))?;
    let mut parts = rest.split('/');
    let scope = parts.next().ok_or_else(|| malformed("missing scope segment"))?;
    let id: u32 = parts
        .next()
        .ok_or_else(|| malformed("missing id segment"))?
        .parse()
        .map_err(|_| malformed("id segment is not a number"))?;
    let field_segment = parts.next().ok_or_else(|| malformed("missing field segment"))?;
    let suffix = parts.next();
    if suffix != Some("set") {
        return Err(malformed("command topic must end in /set"));
    }

    let entity_kind = match scope {
        "zone" => EntityKind::Zone,
        "client" => EntityKind::Client,
        other => return Err(malformed(&format!("unknown scope {other}"))),
    };
    let route = registry::find_by_field(entity_kind, normalize_field(field_segment))
        .ok_or_else(|| malformed(&format!("no route for field {field_segment}")))?;

    let body: Value = serde_json::from_slice(payload).map_err(|e| malformed(&e.to_string()))?;

    match (entity_kind, route.field) {
        (EntityKind::Zone, "volume") => Ok(Command::SetZoneVolume { zone_id: id, volume: json_u8(&body, "volume")? }),
        (EntityKind::Zone, "mute") => Ok(Command::SetZoneMute { zone_id: id, mute: json_bool(&body, "mute")? }),
        (EntityKind::Client, "volume") => Ok(Command::SetClientVolume { client_id: id, volume: json_u8(&body, "volume")? }),
        (EntityKind::Client, "mute") => Ok(Command::SetClientMute { client_id: id, mute: json_bool(&body, "mute")? }),
        _ => Err(malformed("route has no corresponding command")),
    }
}

fn normalize_field(field_segment: &str) -> &str {
    // MQTT field segments are lower-case (`volume`), matching `Command::debounce_key`'s field names directly.
    field_segment
}

fn json_u8(body: &Value, key: &str) -> Result<u8, AdapterError> {
    body.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| AdapterError::MalformedPayload { topic: String::new(), reason: format!("expected integer field {key}") })
}

fn json_bool(body: &Value, key: &str) -> Result<bool, AdapterError> {
    body.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| AdapterError::MalformedPayload { topic: String::new(), reason: format!("expected boolean field {key}") })
}

pub struct MqttEgress {
    client: AsyncClient,
    topic_root: String,
}

impl MqttEgress {
    pub fn new(adapter: &MqttAdapter) -> Self {
        Self { client: adapter.client.clone(), topic_root: adapter.topic_root.clone() }
    }
}

#[async_trait::async_trait]
impl Egress for MqttEgress {
    fn protocol(&self) -> SourceProtocol {
        SourceProtocol::Mqtt
    }

    async fn publish(&self, event: &StatusEvent) {
        let Some(route) = registry::find_by_field(event.entity_kind, event.field) else {
            return;
        };
        let topic = format!("{}/{}/{}/{}", self.topic_root, scope(event.entity_kind), event.entity_id, route.mqtt_field);
        let body = json!({ route.mqtt_field: status_payload_to_json(&event.payload) });
        let Ok(bytes) = serde_json::to_vec(&body) else { return };
        if let Err(e) = self.client.publish(&topic, QoS::AtLeastOnce, true, bytes).await {
            warn!(topic = %topic, error = %e, "failed to publish MQTT status");
        } else {
            debug!(topic = %topic, "published MQTT status");
        }
    }
}

fn status_payload_to_json(payload: &StatusPayload) -> Value {
    match payload {
        StatusPayload::Bool(b) => json!(b),
        StatusPayload::U8(n) => json!(n),
        StatusPayload::U32(n) => json!(n),
        StatusPayload::OptionU32(n) => json!(n),
        StatusPayload::PlaybackState(state) => json!(format!("{state:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_zone_volume_command_topic() {
        let command = decode_command_topic("snapdog/zone/1/volume/set", br#"{"volume":37}"#, "snapdog").unwrap();
        assert!(matches!(command, Command::SetZoneVolume { zone_id: 1, volume: 37 }));
    }

    #[test]
    fn rejects_a_topic_with_a_non_numeric_id() {
        let err = decode_command_topic("snapdog/zone/abc/volume/set", br#"{"volume":1}"#, "snapdog").unwrap_err();
        assert!(matches!(err, AdapterError::MalformedPayload { .. }));
    }

    #[test]
    fn rejects_malformed_json_payload() {
        let err = decode_command_topic("snapdog/zone/1/volume/set", b"not json", "snapdog").unwrap_err();
        assert!(matches!(err, AdapterError::MalformedPayload { .. }));
    }

    #[test]
    fn parses_broker_url_with_scheme() {
        assert_eq!(parse_broker_url("tcp://127.0.0.1:1883").unwrap(), ("127.0.0.1".to_string(), 1883));
    }
}
