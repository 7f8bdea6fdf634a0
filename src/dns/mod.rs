//! Hostname resolution: wire codec, cache, and the stub resolver.

mod cache;
mod packet;
mod resolver;

pub use cache::CacheConfig;
pub use packet::{decode_response, encode_query, response_min_ttl, RecordType, MAX_PACKET_LEN};
pub use resolver::{
    QueryCallback, QueryId, Resolver, ResolverConfig, DNS_PORT, SERVERS_MAX,
};
