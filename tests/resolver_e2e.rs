//! End-to-end resolver behavior against the scripted stack.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use syncsock::dns::CacheConfig;
use syncsock::testing::{build_dns_response, ManualScheduler, MockStack};
use syncsock::{
    Error, IpVersion, Resolver, ResolverConfig, Scheduler, SocketAddress,
};

use common::init_test_logging;

fn quick_config() -> ResolverConfig {
    ResolverConfig {
        retries_per_server: 2,
        attempt_timeout: Duration::from_millis(10),
        poll_interval: Duration::from_millis(5),
        cache: CacheConfig::default(),
        ..ResolverConfig::default()
    }
}

fn answering_stack(answers: Vec<(SocketAddress, u32)>) -> Arc<MockStack> {
    let stack = MockStack::new();
    stack.set_responder(move |_server, query| Some(build_dns_response(query, &answers)));
    stack
}

#[test]
fn resolves_known_host() {
    init_test_logging();
    let answer = SocketAddress::v4(216, 58, 207, 238, 0);
    let stack = answering_stack(vec![(answer, 300)]);
    let resolver = Resolver::with_config(stack, quick_config());

    let got = resolver.query("www.google.com", None).unwrap();
    assert_eq!(got.ip_bytes(), answer.ip_bytes());
    assert_eq!(got.version(), IpVersion::V4);
}

#[test]
fn multiple_answers_preserve_order() {
    init_test_logging();
    let answers = vec![
        (SocketAddress::v4(93, 184, 216, 34, 0), 300),
        (SocketAddress::v4(93, 184, 216, 35, 0), 300),
        (SocketAddress::v4(93, 184, 216, 36, 0), 300),
    ];
    let stack = answering_stack(answers.clone());
    let resolver = Resolver::with_config(stack, quick_config());

    let got = resolver.query_multiple("example.com", 8, None).unwrap();
    assert_eq!(got.len(), 3);
    for (got, (want, _)) in got.iter().zip(&answers) {
        assert_eq!(got.ip_bytes(), want.ip_bytes());
    }

    // The cap truncates, preserving the head of the answer set.
    let capped = resolver.query_multiple("example.com", 2, None).unwrap();
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].ip_bytes(), answers[0].0.ip_bytes());
}

#[test]
fn ipv6_queries_yield_v6_addresses() {
    init_test_logging();
    let answer = SocketAddress::parse("2001:db8::1", 0).unwrap();
    let stack = answering_stack(vec![(answer, 300)]);
    let resolver = Resolver::with_config(stack, quick_config());

    let got = resolver.query("v6.example.com", Some(IpVersion::V6)).unwrap();
    assert_eq!(got.version(), IpVersion::V6);
    assert_eq!(got.ip_bytes(), answer.ip_bytes());
}

#[test]
fn cache_hit_avoids_network() {
    init_test_logging();
    let stack = answering_stack(vec![(SocketAddress::v4(192, 0, 2, 80, 0), 300)]);
    let resolver = Resolver::with_config(stack.clone(), quick_config());

    resolver.query("cached.example.com", None).unwrap();
    assert_eq!(stack.sendto_count(), 1);
    resolver.query("cached.example.com", None).unwrap();
    resolver.query_multiple("cached.example.com", 4, None).unwrap();
    assert_eq!(stack.sendto_count(), 1);
}

#[test]
fn exhausts_attempt_budget_across_servers() {
    init_test_logging();
    // No responder: every attempt times out.
    let stack = MockStack::new();
    let resolver = Resolver::with_config(stack.clone(), quick_config());
    resolver
        .add_server(&SocketAddress::v4(192, 0, 2, 1, 53))
        .unwrap();
    resolver
        .add_server(&SocketAddress::v4(192, 0, 2, 2, 53))
        .unwrap();

    assert_eq!(
        resolver.query("dead.example.com", None),
        Err(Error::DnsFailure)
    );
    // 2 servers x 2 retries, and both servers were actually tried.
    assert_eq!(stack.sendto_count(), 4);
    let handle = stack.handle_of_last_open();
    let sent = stack.sent_datagrams(handle);
    assert_eq!(sent[0].0, SocketAddress::v4(192, 0, 2, 1, 53));
    assert_eq!(sent[2].0, SocketAddress::v4(192, 0, 2, 2, 53));
}

#[test]
fn malformed_responses_consume_attempts() {
    init_test_logging();
    let stack = MockStack::new();
    stack.set_responder(|_server, _query| Some(vec![0xFF; 7]));
    let resolver = Resolver::with_config(stack.clone(), quick_config());

    assert_eq!(
        resolver.query("garbled.example.com", None),
        Err(Error::DnsFailure)
    );
    // Default fallback list: 2 servers x 2 retries.
    assert_eq!(stack.sendto_count(), 4);
}

#[test]
fn async_query_completes_via_scheduler() {
    init_test_logging();
    let answer = SocketAddress::v4(203, 0, 113, 99, 0);
    let stack = answering_stack(vec![(answer, 300)]);
    let resolver = Arc::new(Resolver::with_config(stack, quick_config()));
    let manual = ManualScheduler::new();
    let scheduler: Arc<dyn Scheduler> = manual.clone();

    let got = Arc::new(Mutex::new(None));
    let got2 = Arc::clone(&got);
    resolver
        .query_async(
            "async.example.com",
            None,
            &scheduler,
            Box::new(move |result| *got2.lock().unwrap() = Some(result)),
        )
        .unwrap();

    // Nothing delivered until the scheduler runs a poll.
    assert!(got.lock().unwrap().is_none());
    manual.advance(Duration::from_millis(5));

    let result = got.lock().unwrap().take().expect("callback fired");
    let addresses = result.unwrap();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].ip_bytes(), answer.ip_bytes());
    assert_eq!(manual.pending(), 0);
}

#[test]
fn async_query_fails_after_budget() {
    init_test_logging();
    let stack = MockStack::new();
    let resolver = Arc::new(Resolver::with_config(stack.clone(), quick_config()));
    let manual = ManualScheduler::new();
    let scheduler: Arc<dyn Scheduler> = manual.clone();

    let got = Arc::new(Mutex::new(None));
    let got2 = Arc::clone(&got);
    resolver
        .query_async(
            "dead.example.com",
            None,
            &scheduler,
            Box::new(move |result| *got2.lock().unwrap() = Some(result)),
        )
        .unwrap();

    // 2 fallback servers x 2 retries x 2 polls per attempt.
    manual.advance(Duration::from_millis(200));
    assert_eq!(
        got.lock().unwrap().take(),
        Some(Err(Error::DnsFailure))
    );
    assert_eq!(stack.sendto_count(), 4);
    assert_eq!(manual.pending(), 0);
}

#[test]
fn cancel_after_completion_is_rejected() {
    init_test_logging();
    let stack = answering_stack(vec![(SocketAddress::v4(192, 0, 2, 5, 0), 300)]);
    let resolver = Arc::new(Resolver::with_config(stack, quick_config()));
    let manual = ManualScheduler::new();
    let scheduler: Arc<dyn Scheduler> = manual.clone();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = Arc::clone(&fired);
    let id = resolver
        .query_async(
            "done.example.com",
            None,
            &scheduler,
            Box::new(move |_| {
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    manual.advance(Duration::from_millis(5));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // The query already completed: its id no longer names anything.
    assert_eq!(resolver.query_async_cancel(id), Err(Error::Parameter));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn cancelled_query_stops_polling() {
    init_test_logging();
    let stack = MockStack::new();
    let resolver = Arc::new(Resolver::with_config(stack.clone(), quick_config()));
    let manual = ManualScheduler::new();
    let scheduler: Arc<dyn Scheduler> = manual.clone();

    let got = Arc::new(Mutex::new(None));
    let got2 = Arc::clone(&got);
    let id = resolver
        .query_async(
            "slow.example.com",
            None,
            &scheduler,
            Box::new(move |result| *got2.lock().unwrap() = Some(result)),
        )
        .unwrap();

    resolver.query_async_cancel(id).unwrap();
    assert_eq!(
        got.lock().unwrap().take(),
        Some(Err(Error::DeviceError))
    );

    let sent_before = stack.sendto_count();
    manual.advance(Duration::from_millis(100));
    // The orphaned poll observes the removal and schedules nothing.
    assert_eq!(stack.sendto_count(), sent_before);
    assert_eq!(manual.pending(), 0);
}
