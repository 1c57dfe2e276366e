//! Engine event source
//!
//! A dedicated task pulls raw events from the engine session, decodes their
//! JSON payloads into typed [`Event`]s and forwards them to the coordinator.
//! The poller runs ahead of the coordinator by at most
//! [`EVENT_CHANNEL_CAPACITY`] events.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tk_core::error::EventError;
use tk_core::traits::{EngineSession, RawEvent};
use tk_core::{Cidr, Resource};

/// Channel capacity between the polling task and the coordinator.
///
/// Small on purpose: the poller only needs to fetch the next event while the
/// coordinator handles the current one. Engine events are coarse (whole
/// resource lists, whole interface configurations), so a deep buffer would
/// only hold stale state.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Typed engine event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Complete replacement of the resource list
    ResourcesUpdated(Vec<Resource>),
    /// New interface shape
    TunInterfaceUpdated {
        ipv4: Ipv4Addr,
        ipv6: Ipv6Addr,
        dns: Vec<IpAddr>,
        search_domain: Option<String>,
        ipv4_routes: Vec<Cidr>,
        ipv6_routes: Vec<Cidr>,
    },
    /// The engine ended the session
    Disconnected {
        error: Option<String>,
        authentication: bool,
    },
    /// The engine's event stream is exhausted
    StreamEnded,
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::ResourcesUpdated(_) => "ResourcesUpdated",
            Event::TunInterfaceUpdated { .. } => "TunInterfaceUpdated",
            Event::Disconnected { .. } => "Disconnected",
            Event::StreamEnded => "StreamEnded",
        }
    }
}

fn decode_json<T: DeserializeOwned>(field: &'static str, payload: &str) -> Result<T, EventError> {
    serde_json::from_str(payload).map_err(|source| EventError::MalformedPayload { field, source })
}

fn decode_addr<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, EventError> {
    value.trim().parse().map_err(|_| EventError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

impl TryFrom<RawEvent> for Event {
    type Error = EventError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        match raw {
            RawEvent::ResourcesUpdated { resources } => {
                Ok(Event::ResourcesUpdated(decode_json("resources", &resources)?))
            }
            RawEvent::TunInterfaceUpdated {
                ipv4,
                ipv6,
                dns,
                search_domain,
                ipv4_routes,
                ipv6_routes,
            } => Ok(Event::TunInterfaceUpdated {
                ipv4: decode_addr("ipv4", &ipv4)?,
                ipv6: decode_addr("ipv6", &ipv6)?,
                dns: decode_json("dns", &dns)?,
                search_domain: search_domain.filter(|d| !d.trim().is_empty()),
                ipv4_routes: decode_json("ipv4_routes", &ipv4_routes)?,
                ipv6_routes: decode_json("ipv6_routes", &ipv6_routes)?,
            }),
            RawEvent::Disconnected {
                error,
                authentication,
            } => Ok(Event::Disconnected {
                error,
                authentication,
            }),
        }
    }
}

/// Item yielded by the event source
pub type EventItem = Result<Event, EventError>;

/// Per-session sequence of decoded engine events.
///
/// Yields [`Event::StreamEnded`] exactly once when the engine's stream ends
/// (or the session is cancelled) and `None` on every poll after that.
/// Dropping the source aborts the polling task.
pub struct EventSource {
    rx: mpsc::Receiver<EventItem>,
    task: JoinHandle<()>,
    ended: bool,
}

impl EventSource {
    /// Spawn the polling task for `session`
    pub fn spawn<S>(session: Arc<S>, cancel: CancellationToken) -> Self
    where
        S: EngineSession + ?Sized,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(poll_engine(session, tx, cancel));

        Self {
            rx,
            task,
            ended: false,
        }
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<EventItem> {
        if self.ended {
            return None;
        }

        match self.rx.recv().await {
            Some(item) => Some(item),
            None => {
                self.ended = true;
                Some(Ok(Event::StreamEnded))
            }
        }
    }

    /// Whether the stream has ended
    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_engine<S>(session: Arc<S>, tx: mpsc::Sender<EventItem>, cancel: CancellationToken)
where
    S: EngineSession + ?Sized,
{
    loop {
        let raw = tokio::select! {
            raw = session.next_event() => raw,
            _ = cancel.cancelled() => {
                tracing::debug!("Event poller cancelled");
                break;
            }
        };

        let Some(raw) = raw else {
            tracing::info!("Engine event stream ended");
            break;
        };

        let item = Event::try_from(raw);
        if let Err(e) = &item {
            tracing::warn!("Dropping malformed engine event: {}", e);
        }

        if tx.send(item).await.is_err() {
            tracing::debug!("Coordinator gone, stopping event poller");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tk_core::error::EngineError;
    use tk_core::TunDescriptor;

    /// Engine session that replays a fixed list and then ends
    struct ScriptedSession {
        events: Mutex<VecDeque<RawEvent>>,
    }

    impl ScriptedSession {
        fn new(events: Vec<RawEvent>) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(events.into()),
            })
        }
    }

    #[async_trait]
    impl EngineSession for ScriptedSession {
        async fn next_event(&self) -> Option<RawEvent> {
            self.events.lock().unwrap().pop_front()
        }
        fn disconnect(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_disabled_resources(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_dns(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_log_directives(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_tun(&self, _: TunDescriptor) -> Result<(), EngineError> {
            Ok(())
        }
        fn reset(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    /// Engine session that never produces an event
    struct SilentSession;

    #[async_trait]
    impl EngineSession for SilentSession {
        async fn next_event(&self) -> Option<RawEvent> {
            std::future::pending().await
        }
        fn disconnect(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_disabled_resources(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_dns(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_log_directives(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_tun(&self, _: TunDescriptor) -> Result<(), EngineError> {
            Ok(())
        }
        fn reset(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn interface_event() -> RawEvent {
        RawEvent::TunInterfaceUpdated {
            ipv4: "100.64.0.1".to_string(),
            ipv6: "fd00:2021:1111::1".to_string(),
            dns: r#"["100.100.111.1"]"#.to_string(),
            search_domain: Some("corp.example".to_string()),
            ipv4_routes: r#"[{"address":"10.0.0.0","prefix":8}]"#.to_string(),
            ipv6_routes: r#"[{"address":"fd00:2021:1111::","prefix":107}]"#.to_string(),
        }
    }

    #[test]
    fn test_decode_interface_event() {
        let event = Event::try_from(interface_event()).unwrap();
        match event {
            Event::TunInterfaceUpdated {
                ipv4,
                dns,
                search_domain,
                ipv4_routes,
                ipv6_routes,
                ..
            } => {
                assert_eq!(ipv4, Ipv4Addr::new(100, 64, 0, 1));
                assert_eq!(dns, vec!["100.100.111.1".parse::<IpAddr>().unwrap()]);
                assert_eq!(search_domain.as_deref(), Some("corp.example"));
                assert_eq!(ipv4_routes[0].to_string(), "10.0.0.0/8");
                assert_eq!(ipv6_routes[0].prefix, 107);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_blank_search_domain_is_none() {
        let mut raw = interface_event();
        if let RawEvent::TunInterfaceUpdated { search_domain, .. } = &mut raw {
            *search_domain = Some(String::new());
        }
        match Event::try_from(raw).unwrap() {
            Event::TunInterfaceUpdated { search_domain, .. } => assert!(search_domain.is_none()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        let raw = RawEvent::ResourcesUpdated {
            resources: "{not json".to_string(),
        };
        assert!(matches!(
            Event::try_from(raw),
            Err(EventError::MalformedPayload {
                field: "resources",
                ..
            })
        ));

        let mut raw = interface_event();
        if let RawEvent::TunInterfaceUpdated { ipv4, .. } = &mut raw {
            *ipv4 = "not-an-ip".to_string();
        }
        assert!(matches!(
            Event::try_from(raw),
            Err(EventError::InvalidAddress { field: "ipv4", .. })
        ));
    }

    #[tokio::test]
    async fn test_source_yields_in_order_then_ends_once() {
        let session = ScriptedSession::new(vec![
            RawEvent::ResourcesUpdated {
                resources: "[]".to_string(),
            },
            RawEvent::ResourcesUpdated {
                resources: "oops".to_string(),
            },
            interface_event(),
        ]);
        let mut source = EventSource::spawn(session, CancellationToken::new());

        assert_eq!(
            source.next().await.unwrap().unwrap(),
            Event::ResourcesUpdated(vec![])
        );
        assert!(source.next().await.unwrap().is_err());
        assert_eq!(
            source.next().await.unwrap().unwrap().name(),
            "TunInterfaceUpdated"
        );
        assert_eq!(source.next().await.unwrap().unwrap(), Event::StreamEnded);
        assert!(source.is_ended());
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_ends_stream() {
        let cancel = CancellationToken::new();
        let mut source = EventSource::spawn(Arc::new(SilentSession), cancel.clone());

        cancel.cancel();
        assert_eq!(source.next().await.unwrap().unwrap(), Event::StreamEnded);
    }
}
