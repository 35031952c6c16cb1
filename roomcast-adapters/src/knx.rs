//! KNX ingress/egress. Wire framing below the DPT layer is out of
//! scope: [`KnxTransport`] is the pluggable boundary a real
//! KNXnet/IP or bus-gateway crate would sit behind; this module only owns
//! group-address bookkeeping and the [`crate::dpt`] codec.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use roomcast_coordinator::{Command, EntityKind, Egress, SourceProtocol, StatusEvent, StatusPayload, TaggedCommand};

use crate::dpt::DptValue;
use crate::error::AdapterError;
use crate::registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAddress {
    pub main: u8,
    pub middle: u8,
    pub sub: u16,
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main, self.middle, self.sub)
    }
}

/// A received group-value-write: the raw DPT payload on a group address.
#[derive(Debug, Clone)]
pub struct InboundTelegram {
    pub ga: GroupAddress,
    pub raw: Vec<u8>,
}

/// The wire boundary a real bus/gateway driver implements. `send` performs
/// a group-value-write; `recv` yields inbound telegrams (typically backed
/// by a channel fed from the driver's own read loop).
#[async_trait]
pub trait KnxTransport: Send + Sync + 'static {
    async fn send(&self, ga: GroupAddress, raw: &[u8]) -> Result<(), AdapterError>;
}

pub struct KnxIngress;

impl KnxIngress {
    pub fn new() -> Self {
        Self
    }

    /// Spawns a forwarding task translating `telegrams` into `TaggedCommand`s
    /// on `out`, the same `Ingress: Stream<TaggedCommand>` capability every
    /// other adapter realizes.
    pub fn spawn(self, mut telegrams: mpsc::Receiver<InboundTelegram>, out: mpsc::Sender<TaggedCommand>) {
        tokio::spawn(async move {
            while let Some(telegram) = telegrams.recv().await {
                match decode_telegram(&telegram) {
                    Ok(command) => {
                        if out.send(TaggedCommand { source: SourceProtocol::Knx, command }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(ga = %telegram.ga, error = %e, "dropping malformed KNX telegram"),
                }
            }
        });
    }
}

fn decode_telegram(telegram: &InboundTelegram) -> Result<Command, AdapterError> {
    let (route, entity_id) = registry::find_by_command_ga(telegram.ga).ok_or_else(|| AdapterError::MalformedTelegram {
        ga: telegram.ga.to_string(),
        reason: "no route registered for this group address".into(),
    })?;
    let value = route.dpt.decode(&telegram.raw).map_err(|e| AdapterError::MalformedTelegram { ga: telegram.ga.to_string(), reason: e.to_string() })?;

    let command = match (route.entity_kind, route.field, value) {
        (EntityKind::Zone, "volume", DptValue::Percent(p)) => Command::SetZoneVolume { zone_id: entity_id, volume: p },
        (EntityKind::Zone, "mute", DptValue::Bool(b)) => Command::SetZoneMute { zone_id: entity_id, mute: b },
        (EntityKind::Client, "volume", DptValue::Percent(p)) => Command::SetClientVolume { client_id: entity_id, volume: p },
        (EntityKind::Client, "mute", DptValue::Bool(b)) => Command::SetClientMute { client_id: entity_id, mute: b },
        _ => {
            return Err(AdapterError::MalformedTelegram {
                ga: telegram.ga.to_string(),
                reason: "decoded value does not match the route's expected type".into(),
            })
        }
    };
    Ok(command)
}

pub struct KnxEgress {
    transport: Arc<dyn KnxTransport>,
}

impl KnxEgress {
    pub fn new(transport: Arc<dyn KnxTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Egress for KnxEgress {
    fn protocol(&self) -> SourceProtocol {
        SourceProtocol::Knx
    }

    async fn publish(&self, event: &StatusEvent) {
        let Some(route) = registry::find_by_field(event.entity_kind, event.field) else {
            return;
        };
        let value = match &event.payload {
            StatusPayload::Bool(b) => DptValue::Bool(*b),
            StatusPayload::U8(p) => DptValue::Percent(*p),
            _ => return,
        };
        let Ok(raw) = route.dpt.encode(&value) else { return };
        let ga = route.status_ga(event.entity_id);
        if let Err(e) = self.transport.send(ga, &raw).await {
            warn!(ga = %ga, error = %e, "failed to write KNX status telegram");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<(GroupAddress, Vec<u8>)>>,
    }

    #[async_trait]
    impl KnxTransport for RecordingTransport {
        async fn send(&self, ga: GroupAddress, raw: &[u8]) -> Result<(), AdapterError> {
            self.sent.lock().unwrap().push((ga, raw.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn zone_volume_status_write_targets_the_status_group_address() {
        let transport = Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()) });
        let egress = KnxEgress::new(transport.clone());
        egress
            .publish(&StatusEvent {
                entity_kind: EntityKind::Zone,
                entity_id: 1,
                field: "volume",
                payload: StatusPayload::U8(50),
                source: SourceProtocol::Api,
            })
            .await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.to_string(), "1/0/2");
    }

    #[tokio::test]
    async fn ingress_decodes_a_known_telegram_into_a_command() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        KnxIngress::new().spawn(rx, out_tx);

        tx.send(InboundTelegram { ga: GroupAddress { main: 1, middle: 0, sub: 1 }, raw: vec![128] }).await.unwrap();
        let tagged = out_rx.recv().await.unwrap();
        assert!(matches!(tagged.command, Command::SetZoneVolume { zone_id: 1, volume: 50 }));
        assert_eq!(tagged.source, SourceProtocol::Knx);
    }

    #[tokio::test]
    async fn ingress_drops_a_telegram_on_an_unrouted_address_without_crashing() {
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        KnxIngress::new().spawn(rx, out_tx);

        tx.send(InboundTelegram { ga: GroupAddress { main: 9, middle: 9, sub: 9 }, raw: vec![1] }).await.unwrap();
        drop(tx);
        assert!(out_rx.recv().await.is_none());
    }
}
