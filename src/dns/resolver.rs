//! Stub DNS resolver over the datagram socket layer.
//!
//! Resolution walks an ordered server list: each attempt sends one
//! query and waits one attempt-timeout for a usable response. After
//! `retries_per_server` failures the resolver rotates to the next
//! server, and after `servers × retries_per_server` total attempts it
//! fails with `DnsFailure`. A malformed or empty response consumes an
//! attempt the same way a timeout does.
//!
//! Two modes share that state machine:
//!
//! - Synchronous: [`Resolver::query`] blocks the calling thread, using
//!   the socket layer's bounded waits per attempt.
//! - Asynchronous: [`Resolver::query_async`] sends the first packet,
//!   parks the query in a pending table, and re-polls from short
//!   scheduler callbacks; completion is delivered through a one-shot
//!   callback.
//!
//! # Cancel Safety
//!
//! A pending asynchronous query is completed exactly once: whichever of
//! response, budget exhaustion, or [`Resolver::query_async_cancel`]
//! removes it from the pending table first delivers the callback, and
//! the others observe the removal. Cancellation delivers
//! `Err(DeviceError)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::addr::{IpVersion, SocketAddress};
use crate::dns::cache::{CacheConfig, DnsCache};
use crate::dns::packet::{self, RecordType, MAX_PACKET_LEN};
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::socket::UdpSocket;
use crate::stack::Stack;

/// Standard DNS server port, applied when a server address carries
/// port zero.
pub const DNS_PORT: u16 = 53;

/// Upper bound on the internally held server list.
pub const SERVERS_MAX: usize = 5;

/// TTL assumed when a response carries no usable TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Identifier for an in-flight asynchronous query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(u32);

/// Completion callback for asynchronous queries; invoked exactly once.
pub type QueryCallback = Box<dyn FnOnce(Result<Vec<SocketAddress>>) + Send>;

/// Resolver tuning knobs.
#[derive(Clone)]
pub struct ResolverConfig {
    /// Attempts against one server before rotating to the next.
    pub retries_per_server: u32,
    /// Wait budget for each attempt's response.
    pub attempt_timeout: Duration,
    /// Cadence of asynchronous response polls.
    pub poll_interval: Duration,
    /// Servers used when the stack reports none and none were added.
    pub fallback_servers: Vec<SocketAddress>,
    /// Cache behavior.
    pub cache: CacheConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retries_per_server: 3,
            attempt_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            fallback_servers: vec![
                SocketAddress::v4(8, 8, 8, 8, DNS_PORT),
                SocketAddress::v4(1, 1, 1, 1, DNS_PORT),
            ],
            cache: CacheConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Preset preferring Google public DNS.
    #[must_use]
    pub fn google() -> Self {
        Self {
            fallback_servers: vec![
                SocketAddress::v4(8, 8, 8, 8, DNS_PORT),
                SocketAddress::v4(8, 8, 4, 4, DNS_PORT),
            ],
            ..Self::default()
        }
    }

    /// Preset preferring Cloudflare public DNS.
    #[must_use]
    pub fn cloudflare() -> Self {
        Self {
            fallback_servers: vec![
                SocketAddress::v4(1, 1, 1, 1, DNS_PORT),
                SocketAddress::v4(1, 0, 0, 1, DNS_PORT),
            ],
            ..Self::default()
        }
    }
}

type ServerList = SmallVec<[SocketAddress; SERVERS_MAX]>;

/// State of one in-flight asynchronous query.
struct PendingQuery {
    wire_id: u16,
    hostname: String,
    qtype: RecordType,
    query: Vec<u8>,
    socket: UdpSocket,
    servers: ServerList,
    server_index: usize,
    attempts_on_server: u32,
    total_attempts: u32,
    total_budget: u32,
    retries_per_server: u32,
    polls_left: u32,
    polls_per_attempt: u32,
    max_results: usize,
    scheduler: Arc<dyn Scheduler>,
    callback: Option<QueryCallback>,
}

impl PendingQuery {
    /// Sends (or resends) the query to the current server; the attempt
    /// is consumed even if the send itself fails.
    fn send_attempt(&mut self) {
        self.total_attempts += 1;
        self.attempts_on_server += 1;
        self.polls_left = self.polls_per_attempt;
        let server = self.servers[self.server_index];
        trace!(
            host = %self.hostname,
            server = %server,
            attempt = self.total_attempts,
            "dns attempt"
        );
        if let Err(err) = self.socket.sendto(&server, &self.query) {
            warn!(host = %self.hostname, server = %server, %err, "dns send failed");
        }
    }
}

enum Poll {
    Done(Result<Vec<SocketAddress>>),
    Again,
}

/// Hostname resolver bound to one [`Stack`].
pub struct Resolver {
    stack: Arc<dyn Stack>,
    config: ResolverConfig,
    cache: DnsCache,
    servers: Mutex<ServerList>,
    next_id: AtomicU32,
    pending: Mutex<HashMap<QueryId, PendingQuery>>,
}

impl Resolver {
    /// Creates a resolver with default configuration.
    #[must_use]
    pub fn new(stack: Arc<dyn Stack>) -> Self {
        Self::with_config(stack, ResolverConfig::default())
    }

    /// Creates a resolver with explicit configuration.
    #[must_use]
    pub fn with_config(stack: Arc<dyn Stack>, config: ResolverConfig) -> Self {
        let cache = DnsCache::new(config.cache.clone());
        Self {
            stack,
            config,
            cache,
            servers: Mutex::new(ServerList::new()),
            next_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a server to the internal list.
    ///
    /// Re-adding a present address is a no-op; an unspecified address
    /// is `Parameter`; a full list is `NoMemory`. Port zero is treated
    /// as the standard DNS port.
    pub fn add_server(&self, addr: &SocketAddress) -> Result<()> {
        if addr.is_unspecified() {
            return Err(Error::Parameter);
        }
        let mut addr = *addr;
        if addr.port() == 0 {
            addr.set_port(DNS_PORT);
        }
        let mut servers = self.servers.lock();
        if servers.iter().any(|s| *s == addr) {
            return Ok(());
        }
        if servers.len() >= SERVERS_MAX {
            return Err(Error::NoMemory);
        }
        servers.push(addr);
        Ok(())
    }

    /// Clears the cache and the internal server list and restarts id
    /// allocation. In-flight asynchronous queries are not affected.
    pub fn reset(&self) {
        self.cache.clear();
        self.servers.lock().clear();
        self.next_id.store(1, Ordering::SeqCst);
    }

    /// Resolves `hostname` to a single address, blocking the caller.
    ///
    /// `version` defaults to IPv4.
    pub fn query(&self, hostname: &str, version: Option<IpVersion>) -> Result<SocketAddress> {
        let answers = self.resolve_sync(hostname, 1, version)?;
        answers.first().copied().ok_or(Error::DnsFailure)
    }

    /// Resolves `hostname` to up to `max` addresses, blocking the
    /// caller. Answer order is preserved from the response.
    pub fn query_multiple(
        &self,
        hostname: &str,
        max: usize,
        version: Option<IpVersion>,
    ) -> Result<Vec<SocketAddress>> {
        self.resolve_sync(hostname, max, version)
    }

    /// Starts an asynchronous single-address resolution.
    ///
    /// On a cache hit the callback runs before this returns; the
    /// returned id then refers to no pending query. Otherwise the query
    /// is polled from `scheduler` callbacks until it completes, fails,
    /// or is cancelled.
    pub fn query_async(
        self: &Arc<Self>,
        hostname: &str,
        version: Option<IpVersion>,
        scheduler: &Arc<dyn Scheduler>,
        callback: QueryCallback,
    ) -> Result<QueryId> {
        self.query_multiple_async(hostname, 1, version, scheduler, callback)
    }

    /// Starts an asynchronous multi-address resolution.
    pub fn query_multiple_async(
        self: &Arc<Self>,
        hostname: &str,
        max: usize,
        version: Option<IpVersion>,
        scheduler: &Arc<dyn Scheduler>,
        callback: QueryCallback,
    ) -> Result<QueryId> {
        if hostname.is_empty() || max == 0 {
            return Err(Error::Parameter);
        }
        let version = version.unwrap_or(IpVersion::V4);
        let (id, wire_id) = self.allocate_id();

        if let Some(mut cached) = self.cache.get(hostname, version) {
            trace!(host = hostname, "dns cache hit");
            cached.truncate(max);
            callback(Ok(cached));
            return Ok(id);
        }

        let qtype = RecordType::for_version(version);
        let query = packet::encode_query(wire_id, hostname, qtype)?;
        let servers = self.select_servers()?;

        let socket = UdpSocket::new();
        socket.open(&self.stack)?;
        socket.set_timeout(Some(Duration::ZERO));

        let polls_per_attempt = Self::polls_per_attempt(&self.config);
        let mut query = PendingQuery {
            wire_id,
            hostname: hostname.to_string(),
            qtype,
            query,
            socket,
            total_budget: servers.len() as u32 * self.config.retries_per_server,
            servers,
            server_index: 0,
            attempts_on_server: 0,
            total_attempts: 0,
            retries_per_server: self.config.retries_per_server,
            polls_left: polls_per_attempt,
            polls_per_attempt,
            max_results: max,
            scheduler: Arc::clone(scheduler),
            callback: Some(callback),
        };
        query.send_attempt();
        self.pending.lock().insert(id, query);

        if let Err(err) = self.schedule_poll(scheduler, id) {
            // Caller sees the error synchronously; no callback fires.
            self.pending.lock().remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Cancels a pending asynchronous query.
    ///
    /// The callback is delivered `Err(DeviceError)` before this
    /// returns. Cancelling an id that is not pending — already
    /// completed, already cancelled, or never issued — is `Parameter`.
    pub fn query_async_cancel(&self, id: QueryId) -> Result<()> {
        let callback = self
            .pending
            .lock()
            .remove(&id)
            .and_then(|mut q| q.callback.take());
        match callback {
            Some(cb) => {
                debug!(id = id.0, "dns query cancelled");
                cb(Err(Error::DeviceError));
                Ok(())
            }
            None => Err(Error::Parameter),
        }
    }

    fn allocate_id(&self) -> (QueryId, u16) {
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
        // Wire ids avoid zero so a zeroed packet never matches.
        let wire_id = (raw % 0xFFFF) as u16 + 1;
        (QueryId(raw), wire_id)
    }

    fn polls_per_attempt(config: &ResolverConfig) -> u32 {
        let timeout = config.attempt_timeout.as_millis().max(1);
        let interval = config.poll_interval.as_millis().max(1);
        (timeout.div_ceil(interval)).max(1) as u32
    }

    /// Server list for one resolution, in preference order: the
    /// stack's own servers, then the internally added list, then the
    /// configured fallbacks.
    fn select_servers(&self) -> Result<ServerList> {
        match self.stack.dns_servers() {
            Ok(list) if !list.is_empty() => {
                let mut servers: ServerList = list.into_iter().take(SERVERS_MAX).collect();
                for server in &mut servers {
                    if server.port() == 0 {
                        server.set_port(DNS_PORT);
                    }
                }
                return Ok(servers);
            }
            Ok(_) | Err(Error::Unsupported) => {}
            Err(err) => return Err(err),
        }
        let internal = self.servers.lock();
        if !internal.is_empty() {
            return Ok(internal.clone());
        }
        let fallback: ServerList = self
            .config
            .fallback_servers
            .iter()
            .take(SERVERS_MAX)
            .copied()
            .collect();
        if fallback.is_empty() {
            return Err(Error::DnsFailure);
        }
        Ok(fallback)
    }

    fn resolve_sync(
        &self,
        hostname: &str,
        max: usize,
        version: Option<IpVersion>,
    ) -> Result<Vec<SocketAddress>> {
        if hostname.is_empty() || max == 0 {
            return Err(Error::Parameter);
        }
        let version = version.unwrap_or(IpVersion::V4);
        if let Some(mut cached) = self.cache.get(hostname, version) {
            trace!(host = hostname, "dns cache hit");
            cached.truncate(max);
            return Ok(cached);
        }

        let (_, wire_id) = self.allocate_id();
        let qtype = RecordType::for_version(version);
        let query = packet::encode_query(wire_id, hostname, qtype)?;
        let servers = self.select_servers()?;
        let budget = servers.len() as u32 * self.config.retries_per_server;

        let socket = UdpSocket::new();
        socket.open(&self.stack)?;
        socket.set_timeout(Some(self.config.attempt_timeout));

        let mut server_index = 0;
        let mut attempts_on_server = 0;
        let mut buf = [0u8; MAX_PACKET_LEN];
        for attempt in 1..=budget {
            let server = servers[server_index];
            trace!(host = hostname, server = %server, attempt, "dns attempt");
            attempts_on_server += 1;
            if let Err(err) = socket.sendto(&server, &query) {
                warn!(host = hostname, server = %server, %err, "dns send failed");
            } else {
                match socket.recvfrom(&mut buf) {
                    Ok((n, _)) => {
                        match packet::decode_response(&buf[..n], wire_id, qtype, max) {
                            Ok(answers) if !answers.is_empty() => {
                                self.store(hostname, &buf[..n], wire_id, qtype, &answers);
                                return Ok(answers);
                            }
                            // Malformed or empty: the attempt is spent.
                            Ok(_) | Err(_) => {
                                debug!(host = hostname, server = %server, "unusable dns response");
                            }
                        }
                    }
                    Err(Error::WouldBlock) => {
                        trace!(host = hostname, server = %server, "dns attempt timed out");
                    }
                    Err(err) => {
                        warn!(host = hostname, server = %server, %err, "dns recv failed");
                    }
                }
            }
            if attempts_on_server >= self.config.retries_per_server {
                server_index = (server_index + 1) % servers.len();
                attempts_on_server = 0;
                debug!(host = hostname, server = %servers[server_index], "rotating dns server");
            }
        }
        debug!(host = hostname, budget, "dns attempt budget exhausted");
        Err(Error::DnsFailure)
    }

    fn store(
        &self,
        hostname: &str,
        response: &[u8],
        wire_id: u16,
        qtype: RecordType,
        answers: &[SocketAddress],
    ) {
        let ttl = packet::response_min_ttl(response, wire_id, qtype)
            .ok()
            .flatten()
            .map_or(DEFAULT_TTL, |secs| Duration::from_secs(u64::from(secs)));
        self.cache.put(hostname, answers.to_vec(), ttl);
    }

    fn schedule_poll(self: &Arc<Self>, scheduler: &Arc<dyn Scheduler>, id: QueryId) -> Result<()> {
        let resolver = Arc::clone(self);
        scheduler.call_in(
            self.config.poll_interval,
            Box::new(move || resolver.drive(id)),
        )
    }

    /// One scheduler-driven poll of a pending query.
    fn drive(self: &Arc<Self>, id: QueryId) {
        let outcome = {
            let mut pending = self.pending.lock();
            let Some(query) = pending.get_mut(&id) else {
                // Completed or cancelled between polls.
                return;
            };
            match Self::poll_query(&self.cache, query) {
                Poll::Done(result) => pending
                    .remove(&id)
                    .and_then(|mut q| q.callback.take())
                    .map(|cb| (cb, result)),
                Poll::Again => None,
            }
        };
        match outcome {
            Some((callback, result)) => callback(result),
            None => {
                let scheduler = {
                    let pending = self.pending.lock();
                    match pending.get(&id) {
                        Some(query) => Arc::clone(&query.scheduler),
                        None => return,
                    }
                };
                if let Err(err) = self.schedule_poll(&scheduler, id) {
                    if let Some(cb) = self
                        .pending
                        .lock()
                        .remove(&id)
                        .and_then(|mut q| q.callback.take())
                    {
                        warn!(id = id.0, %err, "dns poll rescheduling failed");
                        cb(Err(err));
                    }
                }
            }
        }
    }

    fn poll_query(cache: &DnsCache, query: &mut PendingQuery) -> Poll {
        let mut buf = [0u8; MAX_PACKET_LEN];
        match query.socket.recvfrom(&mut buf) {
            Ok((n, _)) => {
                match packet::decode_response(&buf[..n], query.wire_id, query.qtype, query.max_results)
                {
                    Ok(answers) if !answers.is_empty() => {
                        let ttl = packet::response_min_ttl(&buf[..n], query.wire_id, query.qtype)
                            .ok()
                            .flatten()
                            .map_or(DEFAULT_TTL, |secs| Duration::from_secs(u64::from(secs)));
                        cache.put(&query.hostname, answers.clone(), ttl);
                        Poll::Done(Ok(answers))
                    }
                    Ok(_) | Err(_) => {
                        debug!(host = %query.hostname, "unusable dns response");
                        Self::next_attempt(query)
                    }
                }
            }
            Err(Error::WouldBlock) => {
                query.polls_left = query.polls_left.saturating_sub(1);
                if query.polls_left == 0 {
                    trace!(host = %query.hostname, "dns attempt timed out");
                    Self::next_attempt(query)
                } else {
                    Poll::Again
                }
            }
            Err(err) => {
                warn!(host = %query.hostname, %err, "dns recv failed");
                Self::next_attempt(query)
            }
        }
    }

    fn next_attempt(query: &mut PendingQuery) -> Poll {
        if query.total_attempts >= query.total_budget {
            debug!(
                host = %query.hostname,
                budget = query.total_budget,
                "dns attempt budget exhausted"
            );
            return Poll::Done(Err(Error::DnsFailure));
        }
        if query.attempts_on_server >= query.retries_per_server {
            query.server_index = (query.server_index + 1) % query.servers.len();
            query.attempts_on_server = 0;
            debug!(
                host = %query.hostname,
                server = %query.servers[query.server_index],
                "rotating dns server"
            );
        }
        query.send_attempt();
        Poll::Again
    }
}
