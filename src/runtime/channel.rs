//! Channels and `select` for compiled goroutines, which run on OS threads.

use crate::language::types::Type;
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Value,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Bumped on every channel state change so that a blocked `select` can
/// re-poll its cases.
static ACTIVITY: Mutex<u64> = parking_lot::const_mutex(0);
static ACTIVITY_CHANGED: Condvar = Condvar::new();

/// Upper bound on one `select` wait; the cases are polled again after it.
const SELECT_POLL: Duration = Duration::from_millis(50);

fn bump_activity() {
    *ACTIVITY.lock() += 1;
    ACTIVITY_CHANGED.notify_all();
}

#[derive(Clone)]
pub struct ChanValue {
    elem: Type,
    inner: Arc<ChanInner>,
}

struct ChanInner {
    cap: usize,
    state: Mutex<ChanState>,
    changed: Condvar,
}

/// Shared by every offer of one blocked `select`; the receiver that takes an
/// offer records the index of the case it completed.
type Claim = Arc<Mutex<Option<usize>>>;

/// Value a blocked `select` holds out on an unbuffered channel.
struct Offer {
    case: usize,
    value: Value,
    claim: Claim,
}

#[derive(Default)]
struct ChanState {
    buf: VecDeque<Value>,
    closed: bool,
    recv_waiting: usize,
    offers: Vec<Offer>,
    /// Values handed to the channel and values taken out of it, used to let an
    /// unbuffered sender wait for its receiver.
    sent: u64,
    taken: u64,
}

impl ChanValue {
    pub fn new(elem: Type, cap: usize) -> Self {
        Self {
            elem,
            inner: Arc::new(ChanInner {
                cap,
                state: Mutex::new(ChanState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn elem(&self) -> &Type {
        &self.elem
    }

    pub fn cap(&self) -> usize {
        self.inner.cap
    }

    /// Buffered values; an unbuffered channel reports zero.
    pub fn len(&self) -> usize {
        if self.inner.cap == 0 {
            return 0;
        }
        self.inner.state.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same(&self, other: &ChanValue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn slots(&self) -> usize {
        self.inner.cap.max(1)
    }

    fn notify(&self) {
        self.inner.changed.notify_all();
        bump_activity();
    }

    /// Blocks until the value is buffered or, for an unbuffered channel,
    /// taken by a receiver.
    pub fn send(&self, value: Value) -> RuntimeResult<()> {
        let mut state = self.inner.state.lock();
        while !state.closed && state.buf.len() >= self.slots() {
            self.inner.changed.wait(&mut state);
        }
        if state.closed {
            return Err(RuntimeError::ClosedChannel { op: "send" });
        }
        state.buf.push_back(value);
        state.sent += 1;
        let ticket = state.sent;
        self.notify();
        if self.inner.cap == 0 {
            while state.taken < ticket && !state.closed {
                self.inner.changed.wait(&mut state);
            }
        }
        Ok(())
    }

    /// Blocks for a value. Returns the zero value and `false` once the channel
    /// is closed and drained.
    pub fn recv(&self) -> (Value, bool) {
        let mut state = self.inner.state.lock();
        state.recv_waiting += 1;
        self.notify();
        let offered = loop {
            if !state.buf.is_empty() || state.closed {
                break None;
            }
            if let Some(value) = self.claim_offer(&mut state) {
                break Some(value);
            }
            self.inner.changed.wait(&mut state);
        };
        state.recv_waiting -= 1;
        match offered {
            Some(value) => (value, true),
            None => self.take(&mut state),
        }
    }

    /// Takes the oldest offer no other receiver has claimed yet.
    fn claim_offer(&self, state: &mut ChanState) -> Option<Value> {
        while !state.offers.is_empty() {
            let offer = state.offers.remove(0);
            let mut claim = offer.claim.lock();
            if claim.is_none() {
                *claim = Some(offer.case);
                drop(claim);
                self.notify();
                return Some(offer.value);
            }
        }
        None
    }

    fn offer(&self, case: usize, value: Value, claim: &Claim, announce: bool) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.offers.push(Offer {
            case,
            value,
            claim: claim.clone(),
        });
        self.inner.changed.notify_all();
        if announce {
            bump_activity();
        }
    }

    fn withdraw(&self, claim: &Claim) {
        self.inner
            .state
            .lock()
            .offers
            .retain(|offer| !Arc::ptr_eq(&offer.claim, claim));
    }

    fn take(&self, state: &mut ChanState) -> (Value, bool) {
        match state.buf.pop_front() {
            Some(value) => {
                state.taken += 1;
                self.notify();
                (value, true)
            }
            None => (Value::zero(&self.elem), false),
        }
    }

    /// Sends without blocking. An unbuffered send succeeds only when a
    /// receiver is already waiting.
    pub fn try_send(&self, value: &Value) -> RuntimeResult<bool> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(RuntimeError::ClosedChannel { op: "send" });
        }
        let ready = if self.inner.cap == 0 {
            state.recv_waiting > state.buf.len()
        } else {
            state.buf.len() < self.inner.cap
        };
        if ready {
            state.buf.push_back(value.clone());
            state.sent += 1;
            self.notify();
        }
        Ok(ready)
    }

    /// Receives without blocking, from the buffer or from a `select`
    /// blocked on sending here.
    pub fn try_recv(&self) -> Option<(Value, bool)> {
        let mut state = self.inner.state.lock();
        if state.buf.is_empty() && !state.closed {
            return self.claim_offer(&mut state).map(|value| (value, true));
        }
        Some(self.take(&mut state))
    }

    pub fn close(&self) -> RuntimeResult<()> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(RuntimeError::ClosedChannel { op: "close" });
        }
        state.closed = true;
        self.notify();
        Ok(())
    }
}

impl fmt::Debug for ChanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChanValue(chan {}, cap {})", self.elem, self.inner.cap)
    }
}

/// One communication of a `select`, with its operands already evaluated.
#[derive(Clone, Debug)]
pub enum SelectCase {
    Send(ChanValue, Value),
    Recv(ChanValue),
    /// Communication on a nil channel, never ready.
    Never,
}

#[derive(Debug)]
pub enum Selected {
    Case {
        index: usize,
        received: Option<(Value, bool)>,
    },
    Default,
}

/// Runs the first ready case, scanning from a rotating start so that no case
/// starves. Blocks until some case is ready unless `has_default` is set.
///
/// While blocked, sends on unbuffered channels stay on offer so that a
/// receiver, itself possibly inside a `select`, can complete them. Offers are
/// withdrawn before every poll, so at most one case completes.
pub fn select(cases: &[SelectCase], has_default: bool) -> RuntimeResult<Selected> {
    if cases.is_empty() && !has_default {
        return Err(RuntimeError::panic("select with no cases blocks forever"));
    }
    let offers: Vec<(usize, &ChanValue, &Value)> = cases
        .iter()
        .enumerate()
        .filter_map(|(index, case)| match case {
            SelectCase::Send(chan, value) if chan.cap() == 0 => Some((index, chan, value)),
            _ => None,
        })
        .collect();
    let claim: Claim = Arc::new(Mutex::new(None));
    let mut offered = false;
    let mut announced = false;
    let mut round = 0usize;
    loop {
        let generation = *ACTIVITY.lock();
        if offered {
            for (_, chan, _) in &offers {
                chan.withdraw(&claim);
            }
            offered = false;
            if let Some(index) = *claim.lock() {
                return Ok(Selected::Case {
                    index,
                    received: None,
                });
            }
        }
        for offset in 0..cases.len() {
            let index = (offset + round) % cases.len();
            match &cases[index] {
                SelectCase::Send(chan, value) => {
                    if chan.try_send(value)? {
                        return Ok(Selected::Case {
                            index,
                            received: None,
                        });
                    }
                }
                SelectCase::Recv(chan) => {
                    if let Some(received) = chan.try_recv() {
                        return Ok(Selected::Case {
                            index,
                            received: Some(received),
                        });
                    }
                }
                SelectCase::Never => {}
            }
        }
        if has_default {
            return Ok(Selected::Default);
        }
        for (index, chan, value) in &offers {
            chan.offer(*index, (*value).clone(), &claim, !announced);
            offered = true;
        }
        announced |= offered;
        let mut current = ACTIVITY.lock();
        if *current == generation {
            ACTIVITY_CHANGED.wait_for(&mut current, SELECT_POLL);
        }
        round = round.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn buffered_channel_keeps_fifo_order_after_close() {
        let chan = ChanValue::new(Type::Int, 2);
        chan.send(Value::Int(1)).unwrap();
        chan.send(Value::Int(2)).unwrap();
        chan.close().unwrap();
        assert_eq!(chan.recv().0.as_int(), Ok(1));
        assert_eq!(chan.recv().0.as_int(), Ok(2));
        let (zero, ok) = chan.recv();
        assert!(!ok);
        assert_eq!(zero.as_int(), Ok(0));
    }

    #[test]
    fn unbuffered_send_waits_for_receiver() {
        let chan = ChanValue::new(Type::String, 0);
        let sender = chan.clone();
        let handle = thread::spawn(move || sender.send(Value::from("ping")));
        let (value, ok) = chan.recv();
        assert!(ok);
        assert_eq!(value.as_str(), Ok("ping"));
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn closing_twice_fails() {
        let chan = ChanValue::new(Type::Int, 0);
        chan.close().unwrap();
        assert_eq!(
            chan.close().unwrap_err(),
            RuntimeError::ClosedChannel { op: "close" }
        );
    }

    #[test]
    fn selects_on_both_ends_of_an_unbuffered_channel_meet() {
        let chan = ChanValue::new(Type::Int, 0);
        let idle = ChanValue::new(Type::Int, 0);
        let sending = chan.clone();
        let sender = thread::spawn(move || {
            select(&[SelectCase::Recv(idle), SelectCase::Send(sending, Value::Int(1))], false)
        });
        let picked = select(&[SelectCase::Recv(chan)], false).unwrap();
        assert!(matches!(
            picked,
            Selected::Case {
                index: 0,
                received: Some((Value::Int(1), true)),
            }
        ));
        assert!(matches!(
            sender.join().unwrap().unwrap(),
            Selected::Case {
                index: 1,
                received: None,
            }
        ));
    }

    #[test]
    fn plain_receive_takes_a_select_offer() {
        let chan = ChanValue::new(Type::String, 0);
        let sending = chan.clone();
        let sender = thread::spawn(move || select(&[SelectCase::Send(sending, Value::from("hi"))], false));
        let (value, ok) = chan.recv();
        assert!(ok);
        assert_eq!(value.as_str(), Ok("hi"));
        assert!(matches!(sender.join().unwrap(), Ok(Selected::Case { index: 0, .. })));
    }

    #[test]
    fn select_takes_default_when_nothing_is_ready() {
        let chan = ChanValue::new(Type::Int, 0);
        let picked = select(&[SelectCase::Recv(chan), SelectCase::Never], true).unwrap();
        assert!(matches!(picked, Selected::Default));
    }

    #[test]
    fn select_receives_from_ready_channel() {
        let idle = ChanValue::new(Type::Int, 1);
        let ready = ChanValue::new(Type::Int, 1);
        ready.send(Value::Int(5)).unwrap();
        let picked = select(&[SelectCase::Recv(idle), SelectCase::Recv(ready)], false).unwrap();
        match picked {
            Selected::Case {
                index,
                received: Some((value, true)),
            } => {
                assert_eq!(index, 1);
                assert_eq!(value.as_int(), Ok(5));
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }
}
