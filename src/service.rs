//! Worker pool that runs remote invocations against an exported object.
//!
//! Transports hand decoded requests to a [`Client`] bound to the requesting
//! instance; the request travels through the service queue and one of the
//! threads running [`Service::run_worker`] dispatches it through the
//! [`ExportTable`]. Exported operations may block (a coordinator barrier holds
//! its worker until released), so a service should run at least as many
//! workers as there may be simultaneously blocked requests.

use std::{
    any::Any,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::{
    common::InstanceId,
    latency::Latency,
    rpc::{downcast_reply, Arguments, ExportTable, Reply, RpcError},
};

// how often an idle worker checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Invocation {
    pub caller: InstanceId,
    pub method: String,
    pub args: Arguments,
    reply: Sender<Result<Reply, RpcError>>,
}

pub struct Service<T> {
    target: Arc<T>,
    exports: ExportTable<T>,
    tx: Sender<Invocation>,
    rx: Receiver<Invocation>,
    // only locked to hand out recorders
    latency: Mutex<Latency>,
}

#[derive(Clone)]
pub struct Client {
    caller: InstanceId,
    tx: Sender<Invocation>,
}

/// Reply of a submitted invocation that has not been waited on yet.
pub struct Pending {
    method: String,
    rx: Receiver<Result<Reply, RpcError>>,
}

impl<T> Service<T> {
    pub fn new(target: Arc<T>, exports: ExportTable<T>) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            target,
            exports,
            tx,
            rx,
            latency: Default::default(),
        }
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn client(&self, caller: InstanceId) -> Client {
        Client {
            caller,
            tx: self.tx.clone(),
        }
    }

    /// Dispatch queued invocations until `shutdown` returns true.
    pub fn run_worker(&self, mut shutdown: impl FnMut() -> bool) {
        let mut latency = self
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .local();
        while !shutdown() {
            let invocation = match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(invocation) => invocation,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let measure = latency.measure();
            let result = self.exports.dispatch(
                &self.target,
                invocation.caller,
                &invocation.method,
                invocation.args,
            );
            latency += measure;
            if let Err(err) = &result {
                warn!(caller = invocation.caller, "{}", err);
            }
            // requester may have stopped waiting
            let _ = invocation.reply.send(result);
        }
    }
}

impl<T> Drop for Service<T> {
    fn drop(&mut self) {
        let summary = self
            .latency
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .summary();
        if summary.samples > 0 {
            info!(
                "dispatched {} invocations, mean {:?}, p99 {:?}",
                summary.samples, summary.mean, summary.p99
            );
        }
    }
}

impl Client {
    pub fn caller(&self) -> InstanceId {
        self.caller
    }

    pub fn submit<Args: Any + Send>(&self, method: &str, args: Args) -> Result<Pending, RpcError> {
        let (reply, rx) = channel::bounded(1);
        self.tx
            .send(Invocation {
                caller: self.caller,
                method: method.to_string(),
                args: Box::new(args),
                reply,
            })
            .map_err(|_| RpcError::Disconnected)?;
        Ok(Pending {
            method: method.to_string(),
            rx,
        })
    }

    /// Submit and block until the reply arrives.
    pub fn invoke<R: Any, Args: Any + Send>(&self, method: &str, args: Args) -> Result<R, RpcError> {
        self.submit(method, args)?.wait()
    }
}

impl Pending {
    pub fn wait<R: Any>(self) -> Result<R, RpcError> {
        let reply = self.rx.recv().map_err(|_| RpcError::Disconnected)??;
        downcast_reply(&self.method, reply)
    }
}
