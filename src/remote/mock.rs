//! Scripted stand-ins for the robot session, used by unit tests across the crate.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::RemoteError;
use crate::remote::{RemoteService, ServiceHandle, Session, Value};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Value(Value),
    Unsupported,
    Fail(String),
}

impl Reply {
    pub(crate) fn ok() -> Self {
        Reply::Value(Value::Null)
    }

    pub(crate) fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }
}

/// A service whose methods answer from per-method scripts. Methods without a
/// script behave as if the firmware does not have them.
pub(crate) struct ScriptedService {
    name: String,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    standing: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedService {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            queued: Mutex::new(HashMap::new()),
            standing: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answer every call to `method` with `reply` once the queue is drained.
    pub(crate) fn on(self: &Arc<Self>, method: &str, reply: Reply) -> Arc<Self> {
        self.standing
            .lock()
            .unwrap()
            .insert(method.to_string(), reply);
        Arc::clone(self)
    }

    /// Answer the next call to `method` with `reply`.
    pub(crate) fn then(self: &Arc<Self>, method: &str, reply: Reply) -> Arc<Self> {
        self.queued
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        Arc::clone(self)
    }

    pub(crate) fn calls_to(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    pub(crate) fn args_of(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn methods_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteService for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), args));

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        let reply = queued.or_else(|| self.standing.lock().unwrap().get(method).cloned());

        match reply {
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Fail(message)) => Err(RemoteError::Failed {
                service: self.name.clone(),
                method: method.to_string(),
                message,
            }),
            Some(Reply::Unsupported) | None => Err(RemoteError::Unsupported {
                service: self.name.clone(),
                method: method.to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct ScriptedSession {
    services: HashMap<String, Arc<ScriptedService>>,
}

impl ScriptedSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, service: Arc<ScriptedService>) -> Self {
        self.services.insert(service.name.clone(), service);
        self
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn service(&self, name: &str) -> Result<ServiceHandle, RemoteError> {
        self.services
            .get(name)
            .map(|s| Arc::clone(s) as ServiceHandle)
            .ok_or_else(|| RemoteError::NoSuchService(name.to_string()))
    }
}

/// A `getImageRemote` reply carrying a solid RGB frame.
pub(crate) fn frame_reply(width: i64, height: i64, rgb: [u8; 3]) -> Reply {
    let pixels: Vec<u8> = rgb
        .iter()
        .copied()
        .cycle()
        .take((width * height * 3) as usize)
        .collect();
    Reply::Value(Value::List(vec![
        Value::Int(width),
        Value::Int(height),
        Value::Int(3),
        Value::Int(11),
        Value::Int(0),
        Value::Int(0),
        Value::Bytes(Bytes::from(pixels)),
    ]))
}

pub(crate) fn handle_reply(handle: &str) -> Reply {
    Reply::Value(Value::Str(handle.to_string()))
}
