use std::{
    any::type_name,
    net::SocketAddr,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use async_std::channel::Sender;
use memngt_utils::{error_handle::ErrorUtils, Timer};

use crate::{
    codec::{self, CodecError},
    config::RpcConfig,
    error::{HandlerError, RpcError},
    msg::{Arguments, MsgId, RemoteFailure, RpcCleanup, RpcMsg, RpcRequest, RpcResponse},
    packetizer::calc_packet_count,
    proxy::CallOptions,
    registry::{ContractHandler, ContractRegistry},
    sender::Outbound,
};

use super::{
    cache::{CacheKey, Claim, ResponseCache},
    pending::PendingCalls,
    stats::{RpcStats, StatsCounters},
};

/// State shared by the caller threads, the receiver loop and the cache sweeper.
pub(crate) struct ServiceCore {
    config: RpcConfig,
    timer: Arc<dyn Timer>,
    shutdown: AtomicBool,
    pending: PendingCalls,
    cache: ResponseCache,
    registry: ContractRegistry,
    outbound: Sender<Outbound>,
    stats: StatsCounters,
}

impl ServiceCore {
    pub fn new(config: RpcConfig, timer: Arc<dyn Timer>, outbound: Sender<Outbound>, id_seed: u32) -> Self {
        Self {
            config,
            timer,
            shutdown: AtomicBool::new(false),
            pending: PendingCalls::new(id_seed),
            cache: Default::default(),
            registry: Default::default(),
            outbound,
            stats: Default::default(),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.timer.now_ms()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Returns false if shutdown had already begun.
    pub fn begin_shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.pending.clear();
        self.outbound.close();
        true
    }

    pub fn register_handler(&self, contract: &str, handler: Arc<dyn ContractHandler>) -> Result<(), RpcError> {
        if !self.registry.register(contract, handler) {
            log::error!("[RpcService] handler for contract {} already registered, keep the old one", contract);
            return Err(RpcError::DuplicateHandler(contract.to_string()));
        }
        log::info!("[RpcService] registered contract {}", contract);
        Ok(())
    }

    pub fn unregister_handler(&self, contract: &str) -> bool {
        self.registry.unregister(contract)
    }

    /// Sends a request and blocks until its response arrives, retransmitting it every retransmit interval.
    ///
    /// Returns the encoded return value, or the failure the remote operation raised.
    pub fn invoke(&self, remote: SocketAddr, contract: &str, operation: &str, args: Arguments, options: &CallOptions) -> Result<Vec<u8>, RpcError> {
        if self.is_shutdown() {
            return Err(RpcError::ShuttingDown);
        }
        let started = Instant::now();
        let (id, reply_rx) = self.pending.register(remote);
        let _guard = PendingGuard { pending: &self.pending, id };
        let request = RpcMsg::Request(RpcRequest::new(id, contract, operation, args));
        if let Err(err) = self.check_sendable(&request) {
            log::error!("[RpcService] cannot send {}.{} to {}: {}", contract, operation, remote, err);
            return Err(RpcError::Codec(err));
        }
        log::debug!("[RpcService] call {}.{} on {} with id {}", contract, operation, remote, id);
        self.send(remote, request.clone())?;

        let retransmit_interval = self.config.retransmit_interval();
        loop {
            let wait = match options.deadline {
                Some(deadline) => match deadline.checked_sub(started.elapsed()) {
                    Some(remain) if !remain.is_zero() => remain.min(retransmit_interval),
                    _ => return Err(RpcError::DeadlineExceeded),
                },
                None => retransmit_interval,
            };

            match async_std::task::block_on(async_std::future::timeout(wait, reply_rx.recv())) {
                Ok(Ok(response)) => {
                    // the remote keeps the response cached until it sees this
                    self.send(remote, RpcMsg::Cleanup(RpcCleanup { id })).print_error("Should send cleanup");
                    return response.result.map_err(RpcError::Remote);
                }
                Ok(Err(_)) => return Err(RpcError::ShuttingDown),
                Err(_) => {
                    if self.is_shutdown() {
                        return Err(RpcError::ShuttingDown);
                    }
                    if matches!(options.deadline, Some(deadline) if started.elapsed() >= deadline) {
                        log::warn!("[RpcService] call {}.{} id {} to {} exceeded its deadline", contract, operation, id, remote);
                        return Err(RpcError::DeadlineExceeded);
                    }
                    StatsCounters::incr(&self.stats.retransmissions);
                    log::warn!("[RpcService] no response for {} from {}, retransmit", id, remote);
                    self.send(remote, request.clone())?;
                }
            }
        }
    }

    pub fn handle_incoming_request(&self, from: SocketAddr, request: RpcRequest) {
        let key = CacheKey(from, request.id);
        match self.cache.claim(key) {
            Claim::Cached(response) => {
                StatsCounters::incr(&self.stats.responses_resent_from_cache);
                log::debug!("[RpcService] request {} from {} already executed, resend cached response", request.id, from);
                self.send(from, RpcMsg::Response(response)).print_error("Should resend cached response");
            }
            Claim::Running => {
                StatsCounters::incr(&self.stats.dropped_messages);
                log::debug!("[RpcService] request {} from {} is still running, drop duplicate", request.id, from);
            }
            Claim::Claimed => match self.execute(&request) {
                Ok(result) => {
                    StatsCounters::incr(&self.stats.requests_executed);
                    let msg = self.sendable_response(RpcMsg::Response(RpcResponse { id: request.id, result }));
                    if let RpcMsg::Response(response) = &msg {
                        self.cache.complete(key, self.timer.now_ms(), response.clone());
                    }
                    self.send(from, msg).print_error("Should send response");
                }
                Err(err) => {
                    StatsCounters::incr(&self.stats.dispatch_errors);
                    log::error!("[RpcService] cannot dispatch {}.{} id {} from {}: {}", request.contract, request.operation, request.id, from, err);
                    self.cache.release(&key);
                }
            },
        }
    }

    pub fn handle_incoming_response(&self, from: SocketAddr, response: RpcResponse) {
        let id = response.id;
        if !self.pending.resolve(from, response) {
            log::debug!("[RpcService] response {} from {} has no pending call, discard", id, from);
        }
    }

    pub fn handle_incoming_cleanup(&self, from: SocketAddr, cleanup: RpcCleanup) {
        if self.cache.remove(&CacheKey(from, cleanup.id)) {
            log::debug!("[RpcService] cleanup cached response {} of {}", cleanup.id, from);
        }
    }

    pub fn on_dropped_message(&self) {
        StatsCounters::incr(&self.stats.dropped_messages);
    }

    /// Drops cached responses older than the sweep interval. Returns how many were removed.
    pub fn sweep_cache(&self) -> usize {
        let removed = self.cache.sweep(self.timer.now_ms(), self.config.cache_sweep_interval_ms);
        if removed > 0 {
            log::info!("[RpcService] swept {} cached responses, remain {}", removed, self.cache.len());
        }
        removed
    }

    pub fn stats(&self) -> RpcStats {
        self.stats.snapshot()
    }

    /// Runs the handler, `Err` means the request could not be dispatched and gets no response.
    fn execute(&self, request: &RpcRequest) -> Result<Result<Vec<u8>, RemoteFailure>, HandlerError> {
        let handler = self
            .registry
            .get(&request.contract)
            .ok_or_else(|| HandlerError::UnknownContract(request.contract.clone()))?;
        let mut reader = request.reader();
        let res = catch_unwind(AssertUnwindSafe(|| handler.handle(&request.operation, &mut reader)));
        match res {
            Ok(Ok(value)) => Ok(Ok(value)),
            Ok(Err(HandlerError::Failed(failure))) => Ok(Err(failure)),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                log::error!("[RpcService] handler {}.{} panicked", request.contract, request.operation);
                Ok(Err(RemoteFailure::from_message("panic", &format!("{}.{} panicked", request.contract, request.operation))))
            }
        }
    }

    /// Fails if the sender loop would not be able to encode and split `msg`.
    fn check_sendable(&self, msg: &RpcMsg) -> Result<(), CodecError> {
        let len = codec::encoded_len(msg)?;
        match calc_packet_count(len as usize, self.config.max_chunk_len) {
            Some(_) => Ok(()),
            None => Err(CodecError::TooManyPackets(len)),
        }
    }

    /// Replaces a response which cannot be sent with an exception telling the caller why.
    fn sendable_response(&self, msg: RpcMsg) -> RpcMsg {
        match self.check_sendable(&msg) {
            Ok(()) => msg,
            Err(err) => {
                log::error!("[RpcService] response {} cannot be sent: {}", msg.id(), err);
                RpcMsg::Response(RpcResponse {
                    id: msg.id(),
                    result: Err(RemoteFailure::from_message(type_name::<CodecError>(), &err.to_string())),
                })
            }
        }
    }

    fn send(&self, dest: SocketAddr, msg: RpcMsg) -> Result<(), RpcError> {
        self.outbound.try_send((dest, msg)).map_err(|_| RpcError::ShuttingDown)
    }
}

struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: MsgId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
