//! Dispatcher request routing and call correlation, end to end through
//! `flush_to` with a recording transport.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use peerlink::error::{
    CODE_ABANDONED, CODE_BAD_ARGUMENTS, CODE_METHOD_NOT_FOUND, CODE_NO_PEER_CONFIGURED,
    CODE_TIMED_OUT,
};
use peerlink::rpc::{CallState, ChannelId, Dispatcher, DispatcherConfig, RequestContext};
use peerlink::{CallError, RpcError};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::mock_links::{LinkCall, MockLinks, outcomes, record};

const PEER: &str = "tcp://10.0.0.7:1884";

fn dispatcher(peer: Option<&str>, timeout: Option<Duration>) -> Dispatcher {
    Dispatcher::new(DispatcherConfig {
        local_id: "dev-a".into(),
        default_peer: peer.map(str::to_owned),
        call_timeout: timeout,
    })
}

#[derive(Deserialize)]
struct Num {
    num: i64,
}

/// Registers `Test.Inc` and returns a counter of handler invocations.
fn register_inc(rpc: &mut Dispatcher) -> Rc<Cell<u32>> {
    let runs = Rc::new(Cell::new(0));
    let seen = Rc::clone(&runs);
    rpc.register(
        "Test.Inc",
        "{num: %d}",
        move |rpc: &mut Dispatcher, req: RequestContext, args: Num| {
            seen.set(seen.get() + 1);
            rpc.respond(req, json!({ "num": args.num + 1 }));
        },
    )
    .unwrap();
    runs
}

/// Flush, complete the pending connect, flush again. Returns the channel.
fn open_outbound(rpc: &mut Dispatcher, links: &mut MockLinks) -> ChannelId {
    rpc.flush_to(links);
    let ch = links.last_connect().expect("connect requested");
    rpc.channel_opened(ch);
    rpc.flush_to(links);
    ch
}

fn inbound(rpc: &mut Dispatcher) -> ChannelId {
    rpc.channel_connected("TCP_in", "10.0.0.9:50000", "", false, true)
}

fn request(rpc: &mut Dispatcher, ch: ChannelId, frame: Value) {
    rpc.handle_frame(ch, &serde_json::to_vec(&frame).unwrap());
}

// ── Inbound requests ──────────────────────────────────────────

#[test]
fn increment_answers_n_plus_one_exactly_once() {
    let mut rpc = dispatcher(None, None);
    let runs = register_inc(&mut rpc);
    let mut links = MockLinks::new();
    let ch = inbound(&mut rpc);

    request(&mut rpc, ch, json!({"id": 3, "src": "dev-b", "method": "Test.Inc", "args": {"num": 5}}));
    rpc.flush_to(&mut links);

    let sent = links.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, ch);
    assert_eq!(sent[0].1, json!({"id": 3, "src": "dev-a", "dst": "dev-b", "result": {"num": 6}}));
    assert_eq!(runs.get(), 1);
}

#[test]
fn unknown_method_yields_404_without_running_anything() {
    let mut rpc = dispatcher(None, None);
    let runs = register_inc(&mut rpc);
    let mut links = MockLinks::new();
    let ch = inbound(&mut rpc);

    request(&mut rpc, ch, json!({"id": 9, "method": "Foo", "args": {}}));
    rpc.flush_to(&mut links);

    let sent = links.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1["error"]["code"], CODE_METHOD_NOT_FOUND);
    assert_eq!(sent[0].1["error"]["message"], "No handler for Foo");
    assert_eq!(runs.get(), 0);
}

#[test]
fn malformed_args_yield_400_without_running_handler() {
    let mut rpc = dispatcher(None, None);
    let runs = register_inc(&mut rpc);
    let mut links = MockLinks::new();
    let ch = inbound(&mut rpc);

    request(&mut rpc, ch, json!({"id": 1, "method": "Test.Inc", "args": {"num": "five"}}));
    request(&mut rpc, ch, json!({"id": 2, "method": "Test.Inc"}));
    rpc.flush_to(&mut links);

    let codes: Vec<_> = links.sent().iter().map(|(_, f)| f["error"]["code"].clone()).collect();
    assert_eq!(codes, vec![json!(CODE_BAD_ARGUMENTS), json!(CODE_BAD_ARGUMENTS)]);
    assert_eq!(runs.get(), 0);
}

#[test]
fn non_object_args_yield_400_without_running_handler() {
    let mut rpc = dispatcher(None, None);
    let runs = register_inc(&mut rpc);
    let mut links = MockLinks::new();
    let ch = inbound(&mut rpc);

    for (id, args) in [(1, json!([5])), (2, json!(5)), (3, json!("x"))] {
        request(&mut rpc, ch, json!({"id": id, "method": "Test.Inc", "args": args}));
    }
    rpc.flush_to(&mut links);

    let sent = links.sent();
    assert_eq!(sent.len(), 3);
    for (_, frame) in &sent {
        assert_eq!(frame["error"]["code"], CODE_BAD_ARGUMENTS);
        assert!(frame.get("result").is_none());
    }
    assert_eq!(runs.get(), 0);
}

#[test]
fn response_goes_back_on_originating_channel() {
    let mut rpc = dispatcher(None, None);
    register_inc(&mut rpc);
    let mut links = MockLinks::new();
    let a = inbound(&mut rpc);
    let b = inbound(&mut rpc);

    request(&mut rpc, b, json!({"id": 1, "method": "Test.Inc", "args": {"num": 1}}));
    request(&mut rpc, a, json!({"id": 1, "method": "Test.Inc", "args": {"num": 10}}));
    rpc.flush_to(&mut links);

    let sent = links.sent();
    assert_eq!(sent[0].0, b);
    assert_eq!(sent[0].1["result"]["num"], 2);
    assert_eq!(sent[1].0, a);
    assert_eq!(sent[1].1["result"]["num"], 11);
}

#[test]
fn garbage_frames_are_dropped() {
    let mut rpc = dispatcher(None, None);
    let mut links = MockLinks::new();
    let ch = inbound(&mut rpc);

    rpc.handle_frame(ch, b"not json at all");
    rpc.handle_frame(ch, br#"{"src":"x"}"#);
    rpc.flush_to(&mut links);

    assert!(links.calls.is_empty());
    assert_eq!(rpc.describe_channels().len(), 1, "channel untouched");
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut rpc = dispatcher(None, None);
    register_inc(&mut rpc);
    let err = rpc
        .register("Test.Inc", "{}", |rpc: &mut Dispatcher, req: RequestContext, _: Value| {
            rpc.respond(req, Value::Null);
        })
        .unwrap_err();
    assert_eq!(err, RpcError::RegistrationConflict("Test.Inc".into()));
}

#[test]
fn handler_may_answer_from_a_later_callback() {
    let mut rpc = dispatcher(Some(PEER), None);
    rpc.register(
        "Test.Relay",
        "{}",
        |rpc: &mut Dispatcher, req: RequestContext, args: Value| {
            let _ = rpc.call("Test.Inc", args, None, move |rpc, result| {
                rpc.respond_with(req, result);
            });
        },
    )
    .unwrap();
    let mut links = MockLinks::new();
    let client = inbound(&mut rpc);

    request(&mut rpc, client, json!({"id": 4, "method": "Test.Relay", "args": {"num": 1}}));
    let peer = open_outbound(&mut rpc, &mut links);
    let (_, relayed) = links.sent().pop().unwrap();
    assert_eq!(relayed["method"], "Test.Inc");

    request(&mut rpc, peer, json!({"id": relayed["id"], "result": {"num": 2}}));
    rpc.flush_to(&mut links);

    let (ch, answer) = links.sent().pop().unwrap();
    assert_eq!(ch, client);
    assert_eq!(answer["id"], 4);
    assert_eq!(answer["result"]["num"], 2);
}

// ── Outbound calls ────────────────────────────────────────────

#[test]
fn call_to_peer_completes_with_reply() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("Example.Increment", json!({"num": 111}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);

    assert_eq!(links.connects(), vec![(ch, PEER.to_owned())]);
    let sent = links.sent();
    assert_eq!(sent[0].1["id"], id);
    assert_eq!(sent[0].1["dst"], PEER);
    assert_eq!(sent[0].1["args"], json!({"num": 111}));

    request(&mut rpc, ch, json!({"id": id, "src": "peer", "result": {"num": 112}}));
    assert_eq!(*got.borrow(), vec![Ok(json!({"num": 112}))]);
    assert_eq!(rpc.pending_count(), 0);
}

#[test]
fn explicit_destination_overrides_default() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    rpc.call("M", json!({}), Some("tcp://10.0.0.8:1884"), |_, _| {}).unwrap();
    rpc.flush_to(&mut links);
    assert_eq!(links.connects()[0].1, "tcp://10.0.0.8:1884");
}

#[test]
fn no_destination_fails_synchronously_without_channel() {
    let mut rpc = dispatcher(None, None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let err = rpc.call("Example.Increment", json!({"num": 1}), None, record(&got)).unwrap_err();
    assert_eq!(err, RpcError::NoPeerConfigured);
    assert_eq!(got.borrow().len(), 1, "callback ran before call returned");
    assert_eq!(got.borrow()[0].as_ref().unwrap_err().code, CODE_NO_PEER_CONFIGURED);

    rpc.flush_to(&mut links);
    assert!(links.calls.is_empty());
    assert!(rpc.describe_channels().is_empty());
    assert_eq!(rpc.pending_count(), 0);
}

#[test]
fn empty_destination_counts_as_absent() {
    let mut rpc = dispatcher(Some(""), None);
    let err = rpc.call("M", json!({}), Some(""), |_, _| {}).unwrap_err();
    assert_eq!(err, RpcError::NoPeerConfigured);
}

#[test]
fn duplicate_response_runs_callback_once() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("M", json!({}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    let reply = json!({"id": id, "result": 1});
    request(&mut rpc, ch, reply.clone());
    request(&mut rpc, ch, reply);

    assert_eq!(got.borrow().len(), 1);
}

#[test]
fn unknown_id_has_no_effect() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("M", json!({}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    links.clear();

    request(&mut rpc, ch, json!({"id": id + 1000, "result": {}}));
    rpc.flush_to(&mut links);

    assert!(got.borrow().is_empty());
    assert!(rpc.is_pending(id));
    assert!(links.calls.is_empty(), "nothing sent for an unknown id");
}

#[test]
fn error_reply_reaches_callback() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("Foo", json!({}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    request(
        &mut rpc,
        ch,
        json!({"id": id, "error": {"code": 404, "message": "No handler for Foo"}}),
    );

    assert_eq!(*got.borrow(), vec![Err(CallError::new(404, "No handler for Foo"))]);
}

#[test]
fn empty_result_is_success() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("M", json!({}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    request(&mut rpc, ch, json!({"id": id}));

    assert_eq!(*got.borrow(), vec![Ok(Value::Null)]);
}

#[test]
fn calls_queue_until_channel_opens_and_keep_order() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();

    let a = rpc.call("A", json!({}), None, |_, _| {}).unwrap();
    let b = rpc.call("B", json!({}), None, |_, _| {}).unwrap();
    rpc.flush_to(&mut links);
    assert_eq!(links.connects().len(), 1);
    assert!(links.sent().is_empty());
    assert_eq!(rpc.call_state(a), Some(CallState::Sent));

    let ch = links.last_connect().unwrap();
    rpc.channel_opened(ch);
    rpc.flush_to(&mut links);
    let ids: Vec<_> = links.sent().iter().map(|(_, f)| f["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(rpc.call_state(b), Some(CallState::AwaitingResponse));

    let c = rpc.call("C", json!({}), None, |_, _| {}).unwrap();
    rpc.flush_to(&mut links);
    assert_eq!(links.connects().len(), 1, "open channel is reused");
    assert_eq!(rpc.call_state(c), Some(CallState::AwaitingResponse));
}

#[test]
fn correlation_ids_are_unique_among_pending() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut ids: Vec<u64> = (0..50)
        .map(|_| rpc.call("M", json!({}), None, |_, _| {}).unwrap())
        .collect();
    assert!(!ids.contains(&0));
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 50);
}

// ── Channel loss and timeouts ─────────────────────────────────

#[test]
fn channel_close_abandons_pending_exactly_once() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("M", json!({}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    rpc.channel_closed(ch);
    rpc.channel_closed(ch);
    request(&mut rpc, ch, json!({"id": id, "result": {}}));

    assert_eq!(got.borrow().len(), 1);
    assert_eq!(got.borrow()[0].as_ref().unwrap_err().code, CODE_ABANDONED);
    assert!(rpc.describe_channels().is_empty(), "non-persistent channel removed");
}

#[test]
fn close_while_connecting_abandons_queued_calls() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    rpc.call("A", json!({}), None, record(&got)).unwrap();
    rpc.call("B", json!({}), None, record(&got)).unwrap();
    rpc.flush_to(&mut links);
    rpc.channel_closed(links.last_connect().unwrap());

    assert_eq!(got.borrow().len(), 2);
    assert!(got.borrow().iter().all(|r| r.as_ref().unwrap_err().code == CODE_ABANDONED));
}

#[test]
fn failed_connect_abandons_call() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks {
        fail_connect: true,
        ..MockLinks::new()
    };
    let got = outcomes();

    rpc.call("M", json!({}), None, record(&got)).unwrap();
    rpc.flush_to(&mut links);

    assert_eq!(got.borrow()[0].as_ref().unwrap_err().code, CODE_ABANDONED);
    assert_eq!(rpc.pending_count(), 0);
}

#[test]
fn failed_write_closes_channel_and_abandons() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();

    rpc.call("M", json!({}), None, record(&got)).unwrap();
    rpc.flush_to(&mut links);
    let ch = links.last_connect().unwrap();
    links.fail_send = true;
    rpc.channel_opened(ch);
    rpc.flush_to(&mut links);

    assert!(links.calls.contains(&LinkCall::Close(ch)));
    assert_eq!(got.borrow().len(), 1);
    assert_eq!(got.borrow()[0].as_ref().unwrap_err().code, CODE_ABANDONED);
}

#[test]
fn persistent_channel_survives_close_and_reconnects() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();

    rpc.call("A", json!({}), None, |_, _| {}).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    rpc.set_channel_persistent(ch, true);
    rpc.channel_closed(ch);

    let info = &rpc.describe_channels()[0];
    assert_eq!(info.id, ch);
    assert!(!info.is_open);

    links.clear();
    rpc.call("B", json!({}), None, |_, _| {}).unwrap();
    rpc.flush_to(&mut links);
    assert_eq!(links.connects(), vec![(ch, PEER.to_owned())]);
}

#[test]
fn timeout_sweep_fails_old_calls_once() {
    let timeout = Duration::from_millis(200);
    let mut rpc = dispatcher(Some(PEER), Some(timeout));
    let mut links = MockLinks::new();
    let got = outcomes();

    let id = rpc.call("M", json!({}), None, record(&got)).unwrap();
    let ch = open_outbound(&mut rpc, &mut links);

    assert_eq!(rpc.sweep_timeouts(Instant::now()), 0, "not yet due");
    let later = Instant::now() + timeout + Duration::from_millis(1);
    assert_eq!(rpc.sweep_timeouts(later), 1);
    assert_eq!(rpc.sweep_timeouts(later), 0);

    request(&mut rpc, ch, json!({"id": id, "result": {}}));
    assert_eq!(got.borrow().len(), 1);
    assert_eq!(got.borrow()[0].as_ref().unwrap_err().code, CODE_TIMED_OUT);
}

#[test]
fn callback_can_chain_without_reentrancy_issues() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let got = outcomes();
    let inner = Rc::clone(&got);

    let id = rpc
        .call("First", json!({}), None, move |rpc, _| {
            let _ = rpc.call("Second", json!({}), None, move |_, r| inner.borrow_mut().push(r));
        })
        .unwrap();
    let ch = open_outbound(&mut rpc, &mut links);
    request(&mut rpc, ch, json!({"id": id, "result": {}}));
    rpc.flush_to(&mut links);

    let (_, second) = links.sent().pop().unwrap();
    assert_eq!(second["method"], "Second");
    request(&mut rpc, ch, json!({"id": second["id"], "result": "done"}));
    assert_eq!(*got.borrow(), vec![Ok(json!("done"))]);
}

// ── Broadcast and introspection ───────────────────────────────

#[test]
fn broadcast_only_reaches_open_broadcast_channels() {
    let mut rpc = dispatcher(Some(PEER), None);
    let mut links = MockLinks::new();
    let a = inbound(&mut rpc);
    let quiet = rpc.channel_connected("TCP_in", "10.0.0.3:1", "", false, false);
    rpc.call("M", json!({}), None, |_, _| {}).unwrap();
    rpc.flush_to(&mut links);
    links.clear();

    assert_eq!(rpc.broadcast("Sys.Hello", json!({"up": true})), 1);
    rpc.flush_to(&mut links);

    let sent = links.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, a);
    assert_ne!(sent[0].0, quiet);
    assert!(sent[0].1.get("id").is_none());
}

#[test]
fn introspection_lists_registered_methods() {
    let mut rpc = dispatcher(None, None);
    register_inc(&mut rpc);
    let mut links = MockLinks::new();
    let ch = inbound(&mut rpc);

    request(&mut rpc, ch, json!({"id": 1, "method": "RPC.List"}));
    request(&mut rpc, ch, json!({"id": 2, "method": "RPC.Describe", "args": {"name": "Test.Inc"}}));
    request(&mut rpc, ch, json!({"id": 3, "method": "RPC.Ping"}));
    rpc.flush_to(&mut links);

    let sent = links.sent();
    assert!(sent[0].1["result"].as_array().unwrap().contains(&json!("Test.Inc")));
    assert_eq!(sent[1].1["result"], json!({"name": "Test.Inc", "args_fmt": "{num: %d}"}));
    assert_eq!(sent[2].1["result"], "pong");
}
