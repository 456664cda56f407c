//! Example methods and the outbound increment call.
//!
//! | Method              | Args             | Result       |
//! |---------------------|------------------|--------------|
//! | `Example.Increment` | `{num: int}`     | `{num: n+1}` |
//! | `Example.CallPeer`  | `{peer?: string}`| `null`       |
//!
//! `Example.CallPeer` answers immediately; the increment it triggers
//! reports back through [`on_increment_reply`].

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ports::LedPort;
use super::service::AppState;
use crate::error::RpcError;
use crate::rpc::{CallResult, Dispatcher, RequestContext};

pub const INCREMENT: &str = "Example.Increment";
pub const CALL_PEER: &str = "Example.CallPeer";

#[derive(Debug, Deserialize)]
pub struct IncrementArgs {
    pub num: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallPeerArgs {
    #[serde(default)]
    pub peer: Option<String>,
}

/// Register the example methods. Fails on a name conflict.
pub fn register<L: LedPort + 'static>(
    rpc: &mut Dispatcher,
    state: &Rc<RefCell<AppState<L>>>,
) -> Result<(), RpcError> {
    let st = Rc::clone(state);
    rpc.register(
        INCREMENT,
        "{num: %d}",
        move |rpc: &mut Dispatcher, req: RequestContext, args: IncrementArgs| {
            increment(rpc, req, args, &st);
        },
    )?;

    let st = Rc::clone(state);
    rpc.register(
        CALL_PEER,
        "{peer: %Q}",
        move |rpc: &mut Dispatcher, req: RequestContext, args: CallPeerArgs| {
            rpc.respond(req, Value::Null);
            if let Err(e) = call_peer(rpc, &st, args.peer.as_deref()) {
                debug!("App: {} not sent: {}", INCREMENT, e);
            }
        },
    )?;
    Ok(())
}

fn increment<L: LedPort>(
    rpc: &mut Dispatcher,
    req: RequestContext,
    args: IncrementArgs,
    state: &Rc<RefCell<AppState<L>>>,
) {
    let Some(sum) = args.num.checked_add(1) else {
        rpc.respond_error(req, &RpcError::BadArguments(format!("num {} overflows", args.num)));
        return;
    };

    {
        let mut st = state.borrow_mut();
        st.led.toggle();
        st.increments_served += 1;
    }
    info!("App: {} + 1 = {} (from {})", args.num, sum, req.src());
    rpc.respond(req, json!({ "num": sum }));
}

/// Call `Example.Increment` on `peer` (or the default peer) with the
/// last number a peer returned.
pub fn call_peer<L: LedPort + 'static>(
    rpc: &mut Dispatcher,
    state: &Rc<RefCell<AppState<L>>>,
    peer: Option<&str>,
) -> Result<u64, RpcError> {
    let num = state.borrow().peer_num;
    let st = Rc::clone(state);
    rpc.call(INCREMENT, json!({ "num": num }), peer, move |_, result| {
        on_increment_reply(&st, result);
    })
}

/// Record the peer's answer. Errors are logged and leave `peer_num` as is.
pub fn on_increment_reply<L: LedPort>(state: &Rc<RefCell<AppState<L>>>, result: CallResult) {
    match result {
        Ok(value) => match value.get("num").and_then(Value::as_i64) {
            Some(num) => {
                info!("App: peer answered {}", num);
                state.borrow_mut().peer_num = num;
            }
            None => warn!("App: peer answered without num: {}", value),
        },
        Err(e) => warn!("App: {} failed: {}", INCREMENT, e),
    }
}
