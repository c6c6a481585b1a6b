//! In-memory loopback `LinkAdapter`, shared by this crate's integration
//! tests. Two instances share a pair of queues so each end's `tx` feeds
//! the other's `rx`. Backed by `Arc<Mutex<..>>` (not `Rc<RefCell<..>>`)
//! so a loopback half can be driven from a background thread, letting a
//! test interleave a device-side `drive()` loop with the client's
//! blocking transaction calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dfu_core::{LinkAdapter, Target};

type Queue = Arc<Mutex<VecDeque<Vec<u8>>>>;

pub struct LoopbackLink {
    inbox: Queue,
    outbox: Queue,
    last_rx: Vec<u8>,
}

pub fn pair() -> (LoopbackLink, LoopbackLink) {
    let a_to_b: Queue = Arc::new(Mutex::new(VecDeque::new()));
    let b_to_a: Queue = Arc::new(Mutex::new(VecDeque::new()));
    let a = LoopbackLink {
        inbox: b_to_a.clone(),
        outbox: a_to_b.clone(),
        last_rx: Vec::new(),
    };
    let b = LoopbackLink {
        inbox: a_to_b,
        outbox: b_to_a,
        last_rx: Vec::new(),
    };
    (a, b)
}

impl LinkAdapter for LoopbackLink {
    fn rx(&mut self) -> Option<(&[u8], u64)> {
        let frame = self.inbox.lock().unwrap().pop_front()?;
        self.last_rx = frame;
        Some((&self.last_rx, 0))
    }

    fn tx(&mut self, bytes: &[u8], _target: Target) -> bool {
        self.outbox.lock().unwrap().push_back(bytes.to_vec());
        true
    }
}
