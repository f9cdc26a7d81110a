use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::remote::framed::FramedStream;
use crate::remote::value::Value;
use crate::remote::wire::{FaultKind, Message, PROTOCOL_VERSION};
use crate::remote::{RemoteService, ServiceHandle, Session};

/// Session over the robot bridge. Calls are serialized over one connection.
#[derive(Clone)]
pub struct TcpSession {
    connection: Arc<Connection>,
}

struct Connection {
    address: String,
    stream: Mutex<FramedStream<TcpStream>>,
    next_id: AtomicU32,
}

impl TcpSession {
    /// Resolves `address`, connects and performs the version handshake.
    pub async fn connect(address: &str, connect_timeout: Duration) -> Result<Self, RemoteError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| RemoteError::Timeout(connect_timeout.as_millis() as u64))??;
        stream.set_nodelay(true)?;

        let mut framed = FramedStream::new(stream);
        framed
            .send(&Message::Hello {
                version: PROTOCOL_VERSION,
            })
            .await?;
        match framed.recv().await? {
            Message::Welcome { version } if version == PROTOCOL_VERSION => {}
            Message::Welcome { version } => {
                return Err(RemoteError::Handshake(format!(
                    "bridge speaks protocol {version}, expected {PROTOCOL_VERSION}"
                )));
            }
            other => {
                return Err(RemoteError::Handshake(format!(
                    "expected a welcome, got {other:?}"
                )));
            }
        }

        info!("Connected to robot at {}", address);
        Ok(Self {
            connection: Arc::new(Connection {
                address: address.to_string(),
                stream: Mutex::new(framed),
                next_id: AtomicU32::new(1),
            }),
        })
    }

    pub fn address(&self) -> &str {
        &self.connection.address
    }
}

impl Connection {
    async fn request(&self, build: impl FnOnce(u32) -> Message) -> Result<Message, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stream = self.stream.lock().await;
        stream.send(&build(id)).await?;
        let reply = stream.recv().await?;
        let reply_id = match &reply {
            Message::Return { id, .. } | Message::Fault { id, .. } => Some(*id),
            _ => None,
        };
        if reply_id == Some(id) {
            Ok(reply)
        } else {
            Err(RemoteError::Protocol(format!(
                "unexpected reply to request {id}: {reply:?}"
            )))
        }
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn service(&self, name: &str) -> Result<ServiceHandle, RemoteError> {
        let reply = self
            .connection
            .request(|id| Message::Lookup {
                id,
                service: name.to_string(),
            })
            .await?;
        match reply {
            Message::Return { .. } => {
                debug!("Resolved remote service {}", name);
                Ok(Arc::new(ServiceProxy {
                    connection: Arc::clone(&self.connection),
                    name: name.to_string(),
                }))
            }
            Message::Fault {
                kind: FaultKind::NoSuchService,
                ..
            } => Err(RemoteError::NoSuchService(name.to_string())),
            Message::Fault { message, .. } => Err(RemoteError::Failed {
                service: name.to_string(),
                method: "lookup".to_string(),
                message,
            }),
            other => Err(RemoteError::Protocol(format!(
                "unexpected lookup reply: {other:?}"
            ))),
        }
    }
}

struct ServiceProxy {
    connection: Arc<Connection>,
    name: String,
}

#[async_trait]
impl RemoteService for ServiceProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        let reply = self
            .connection
            .request(|id| Message::Call {
                id,
                service: self.name.clone(),
                method: method.to_string(),
                args,
            })
            .await?;
        match reply {
            Message::Return { value, .. } => Ok(value),
            Message::Fault { kind, message, .. } => Err(match kind {
                FaultKind::UnsupportedMethod => RemoteError::Unsupported {
                    service: self.name.clone(),
                    method: method.to_string(),
                },
                FaultKind::NoSuchService => RemoteError::NoSuchService(self.name.clone()),
                FaultKind::Failure => RemoteError::Failed {
                    service: self.name.clone(),
                    method: method.to_string(),
                    message,
                },
            }),
            other => Err(RemoteError::Protocol(format!(
                "unexpected call reply: {other:?}"
            ))),
        }
    }
}
