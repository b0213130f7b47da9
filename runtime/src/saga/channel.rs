//! Action channel feeding sagas.
//!
//! Takers register interest with a predicate; a dispatched action is handed
//! to every waiting taker it matches. Nothing is buffered for takers that
//! register later. Closing the channel answers every pending and future
//! taker with end-of-stream.

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Predicate choosing the actions a taker wants
pub type Pattern<A> = Box<dyn Fn(&A) -> bool + Send>;

enum Reply<A> {
    /// Answered once, then dropped
    Once(oneshot::Sender<Option<A>>),
    /// Answered for every match until the receiver goes away
    Stream(mpsc::UnboundedSender<A>),
}

impl<A> Reply<A> {
    fn is_closed(&self) -> bool {
        match self {
            Self::Once(sender) => sender.is_closed(),
            Self::Stream(sender) => sender.is_closed(),
        }
    }
}

struct Taker<A> {
    pattern: Pattern<A>,
    reply: Reply<A>,
}

struct ChannelState<A> {
    takers: Vec<Taker<A>>,
    closed: bool,
}

pub(crate) struct ActionChannel<A> {
    state: Mutex<ChannelState<A>>,
}

impl<A: Clone> ActionChannel<A> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                takers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Wait for the next matching action; `None` once the channel is closed.
    pub(crate) fn take(&self, pattern: Pattern<A>) -> oneshot::Receiver<Option<A>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if state.closed {
            let _ = tx.send(None);
        } else {
            state.takers.push(Taker {
                pattern,
                reply: Reply::Once(tx),
            });
        }
        rx
    }

    /// Receive every matching action until the channel is closed.
    pub(crate) fn subscribe(&self, pattern: Pattern<A>) -> mpsc::UnboundedReceiver<A> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        // dropping `tx` on a closed channel ends the stream right away
        if !state.closed {
            state.takers.push(Taker {
                pattern,
                reply: Reply::Stream(tx),
            });
        }
        rx
    }

    /// Offer an action to the waiting takers.
    pub(crate) fn put(&self, action: &A) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }

        let takers = std::mem::take(&mut state.takers);
        for taker in takers {
            if taker.reply.is_closed() {
                continue;
            }
            if !(taker.pattern)(action) {
                state.takers.push(taker);
                continue;
            }
            match taker.reply {
                Reply::Once(sender) => {
                    let _ = sender.send(Some(action.clone()));
                },
                Reply::Stream(sender) => {
                    if sender.send(action.clone()).is_ok() {
                        state.takers.push(Taker {
                            pattern: taker.pattern,
                            reply: Reply::Stream(sender),
                        });
                    }
                },
            }
        }
    }

    /// Close the channel, returning `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;

        for taker in state.takers.drain(..) {
            if let Reply::Once(sender) = taker.reply {
                let _ = sender.send(None);
            }
        }
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn pending_takers(&self) -> usize {
        self.state.lock().takers.len()
    }
}
