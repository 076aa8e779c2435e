//! # Simulated Radio Medium
//!
//! An in-process broadcast medium shared by several [`SimRadio`] nodes.
//!
//! ## Design
//!
//! - `send` only queues a frame; nothing is delivered until the scenario
//!   calls [`SimAir::deliver`], which models the radio's asynchronous
//!   receive context
//! - Receivers are invoked without the medium's lock held, so a receiver
//!   may send replies; those land in the next delivery round
//! - Broadcast frames reach every node except the sender
//! - Every accepted frame is also appended to a transcript for assertions

use crate::fault_injection::{FrameFate, LinkFaultInjector, LinkFaultPlan};
use hal::{RadioReceiver, RadioTransport, SendError};
use link_protocol::{LinkMessage, MacAddress, MAX_PAYLOAD_LEN};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Upper bound on registered peers per node, matching the real radio.
const MAX_PEERS: usize = 20;

/// A datagram in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub src: MacAddress,
    pub dest: MacAddress,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decodes the payload, for assertions.
    pub fn message(&self) -> Option<LinkMessage> {
        LinkMessage::decode(&self.payload).ok()
    }
}

#[derive(Default)]
struct NodeState {
    peers: BTreeSet<MacAddress>,
    receiver: Option<Arc<dyn RadioReceiver>>,
}

#[derive(Default)]
struct AirState {
    nodes: BTreeMap<MacAddress, NodeState>,
    in_flight: VecDeque<Frame>,
    transcript: Vec<Frame>,
    injector: LinkFaultInjector,
}

/// The shared medium. Clones refer to the same air.
#[derive(Clone, Default)]
pub struct SimAir {
    state: Arc<Mutex<AirState>>,
}

impl SimAir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(plan: LinkFaultPlan) -> Self {
        let air = Self::new();
        air.set_fault_plan(plan);
        air
    }

    /// Replaces the fault plan. Counters of the previous plan are discarded.
    pub fn set_fault_plan(&self, plan: LinkFaultPlan) {
        self.lock().injector = LinkFaultInjector::new(plan);
    }

    /// Attaches a node with the given hardware address.
    pub fn radio(&self, address: MacAddress) -> SimRadio {
        self.lock().nodes.entry(address).or_default();
        SimRadio {
            address,
            air: self.clone(),
        }
    }

    /// Delivers every frame queued so far and returns how many receiver
    /// invocations happened. Frames sent by receivers during this round stay
    /// queued.
    pub fn deliver(&self) -> usize {
        let deliveries = {
            let mut state = self.lock();
            let mut frames: VecDeque<Frame> = state.in_flight.drain(..).collect();
            state.injector.apply_reordering(&mut frames);

            let mut deliveries = Vec::new();
            for frame in frames {
                for (address, node) in state.nodes.iter() {
                    let addressed = if frame.dest.is_broadcast() {
                        *address != frame.src
                    } else {
                        *address == frame.dest
                    };
                    if !addressed {
                        continue;
                    }
                    if let Some(receiver) = node.receiver.clone() {
                        deliveries.push((receiver, frame.clone()));
                    }
                }
            }
            deliveries
        };

        let count = deliveries.len();
        for (receiver, frame) in deliveries {
            receiver.on_receive(frame.src, &frame.payload);
        }
        count
    }

    /// Delivers rounds until the medium is quiet or `max_rounds` is reached.
    pub fn deliver_all(&self, max_rounds: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_rounds {
            if self.pending() == 0 {
                break;
            }
            total += self.deliver();
        }
        total
    }

    /// Number of frames waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Every frame accepted by the medium, in send order, including frames
    /// later lost to injected faults.
    pub fn transcript(&self) -> Vec<Frame> {
        self.lock().transcript.clone()
    }

    pub fn clear_transcript(&self) {
        self.lock().transcript.clear();
    }

    /// Decoded messages sent by `src`, in order.
    pub fn sent_by(&self, src: MacAddress) -> Vec<LinkMessage> {
        self.lock()
            .transcript
            .iter()
            .filter(|frame| frame.src == src)
            .filter_map(Frame::message)
            .collect()
    }

    pub fn dropped(&self) -> usize {
        self.lock().injector.dropped()
    }

    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One node's radio on a [`SimAir`].
#[derive(Clone)]
pub struct SimRadio {
    address: MacAddress,
    air: SimAir,
}

impl SimRadio {
    pub fn air(&self) -> &SimAir {
        &self.air
    }

    pub fn peers(&self) -> Vec<MacAddress> {
        self.air
            .lock()
            .nodes
            .get(&self.address)
            .map(|node| node.peers.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl RadioTransport for SimRadio {
    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn add_peer(&self, address: MacAddress) -> Result<(), SendError> {
        let mut state = self.air.lock();
        let node = state.nodes.entry(self.address).or_default();
        if node.peers.contains(&address) {
            return Ok(());
        }
        if node.peers.len() >= MAX_PEERS {
            return Err(SendError::PeerTableFull);
        }
        node.peers.insert(address);
        Ok(())
    }

    fn remove_peer(&self, address: MacAddress) {
        if let Some(node) = self.air.lock().nodes.get_mut(&self.address) {
            node.peers.remove(&address);
        }
    }

    fn has_peer(&self, address: MacAddress) -> bool {
        self.air
            .lock()
            .nodes
            .get(&self.address)
            .map(|node| node.peers.contains(&address))
            .unwrap_or(false)
    }

    fn send(&self, dest: MacAddress, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SendError::PayloadTooLarge(payload.len()));
        }

        let mut state = self.air.lock();
        let registered = state
            .nodes
            .get(&self.address)
            .map(|node| node.peers.contains(&dest))
            .unwrap_or(false);
        if !registered {
            return Err(SendError::UnknownPeer(dest));
        }

        let frame = Frame {
            src: self.address,
            dest,
            payload: payload.to_vec(),
        };
        match state.injector.classify(self.address, payload) {
            FrameFate::Reject => {
                return Err(SendError::Failed("injected send failure".to_string()));
            }
            FrameFate::Drop => {
                log::trace!(target: "sim_air", "dropping frame {} -> {}", frame.src, frame.dest);
                state.transcript.push(frame);
            }
            FrameFate::Deliver => {
                state.transcript.push(frame.clone());
                state.in_flight.push_back(frame);
            }
            FrameFate::Duplicate => {
                state.transcript.push(frame.clone());
                state.in_flight.push_back(frame.clone());
                state.in_flight.push_back(frame);
            }
        }
        Ok(())
    }

    fn set_receiver(&self, receiver: Arc<dyn RadioReceiver>) {
        self.air
            .lock()
            .nodes
            .entry(self.address)
            .or_default()
            .receiver = Some(receiver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_injection::LinkFault;
    use link_protocol::MessageTag;

    #[derive(Default)]
    struct Inbox(Mutex<Vec<(MacAddress, Vec<u8>)>>);

    impl RadioReceiver for Inbox {
        fn on_receive(&self, src: MacAddress, payload: &[u8]) {
            self.0.lock().unwrap().push((src, payload.to_vec()));
        }
    }

    fn a() -> MacAddress {
        MacAddress::new([0xA, 0, 0, 0, 0, 1])
    }

    fn b() -> MacAddress {
        MacAddress::new([0xB, 0, 0, 0, 0, 2])
    }

    fn c() -> MacAddress {
        MacAddress::new([0xC, 0, 0, 0, 0, 3])
    }

    fn setup(air: &SimAir) -> (SimRadio, Arc<Inbox>, Arc<Inbox>, Arc<Inbox>) {
        let radio_a = air.radio(a());
        let inbox_a = Arc::new(Inbox::default());
        radio_a.set_receiver(inbox_a.clone());
        let inbox_b = Arc::new(Inbox::default());
        air.radio(b()).set_receiver(inbox_b.clone());
        let inbox_c = Arc::new(Inbox::default());
        air.radio(c()).set_receiver(inbox_c.clone());
        (radio_a, inbox_a, inbox_b, inbox_c)
    }

    #[test]
    fn test_send_requires_registered_peer() {
        let air = SimAir::new();
        let radio = air.radio(a());
        assert_eq!(radio.send(b(), &[0x03]), Err(SendError::UnknownPeer(b())));
        radio.add_peer(b()).unwrap();
        assert!(radio.send(b(), &[0x03]).is_ok());
        assert_eq!(air.pending(), 1);
    }

    #[test]
    fn test_payload_limit() {
        let air = SimAir::new();
        let radio = air.radio(a());
        radio.add_peer(b()).unwrap();
        assert_eq!(
            radio.send(b(), &[0u8; MAX_PAYLOAD_LEN + 1]),
            Err(SendError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn test_broadcast_reaches_everyone_but_sender() {
        let air = SimAir::new();
        let (radio_a, inbox_a, inbox_b, inbox_c) = setup(&air);
        radio_a.add_peer(MacAddress::BROADCAST).unwrap();
        radio_a.send(MacAddress::BROADCAST, &[0x12]).unwrap();

        assert!(inbox_b.0.lock().unwrap().is_empty());
        assert_eq!(air.deliver(), 2);
        assert!(inbox_a.0.lock().unwrap().is_empty());
        assert_eq!(inbox_b.0.lock().unwrap()[0], (a(), vec![0x12]));
        assert_eq!(inbox_c.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unicast_reaches_only_destination() {
        let air = SimAir::new();
        let (radio_a, _, inbox_b, inbox_c) = setup(&air);
        radio_a.add_peer(b()).unwrap();
        radio_a.send(b(), &[0x03]).unwrap();
        air.deliver();
        assert_eq!(inbox_b.0.lock().unwrap().len(), 1);
        assert!(inbox_c.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_frames_stay_in_transcript() {
        let air = SimAir::with_faults(
            LinkFaultPlan::new().with_fault(LinkFault::DropMatching {
                tag: MessageTag::TransferEnd,
                count: 1,
            }),
        );
        let (radio_a, _, inbox_b, _) = setup(&air);
        radio_a.add_peer(b()).unwrap();
        radio_a.send(b(), &[0x03]).unwrap();
        radio_a.send(b(), &[0x12]).unwrap();
        air.deliver_all(4);

        assert_eq!(air.transcript().len(), 2);
        assert_eq!(air.dropped(), 1);
        assert_eq!(inbox_b.0.lock().unwrap().len(), 1);
        assert_eq!(air.sent_by(a()), vec![LinkMessage::TransferEnd, LinkMessage::Unpair]);
    }

    #[test]
    fn test_injected_send_failure() {
        let air = SimAir::with_faults(
            LinkFaultPlan::new().with_fault(LinkFault::FailSends { count: 1 }),
        );
        let radio = air.radio(a());
        radio.add_peer(b()).unwrap();
        assert!(matches!(radio.send(b(), &[0x03]), Err(SendError::Failed(_))));
        assert!(radio.send(b(), &[0x03]).is_ok());
    }

    #[test]
    fn test_remove_peer() {
        let air = SimAir::new();
        let radio = air.radio(a());
        radio.add_peer(b()).unwrap();
        radio.add_peer(b()).unwrap();
        assert_eq!(radio.peers(), vec![b()]);
        radio.remove_peer(b());
        assert!(!radio.has_peer(b()));
    }

    #[test]
    fn test_reply_from_receiver_queues_for_next_round() {
        struct Echo(SimRadio);

        impl RadioReceiver for Echo {
            fn on_receive(&self, src: MacAddress, payload: &[u8]) {
                let _ = self.0.add_peer(src);
                let _ = self.0.send(src, payload);
            }
        }

        let air = SimAir::new();
        let radio_a = air.radio(a());
        let inbox_a = Arc::new(Inbox::default());
        radio_a.set_receiver(inbox_a.clone());
        let radio_b = air.radio(b());
        radio_b.set_receiver(Arc::new(Echo(radio_b.clone())));

        radio_a.add_peer(b()).unwrap();
        radio_a.send(b(), &[0x04, 2]).unwrap();
        air.deliver();
        assert!(inbox_a.0.lock().unwrap().is_empty());
        assert_eq!(air.pending(), 1);
        air.deliver();
        assert_eq!(inbox_a.0.lock().unwrap()[0], (b(), vec![0x04, 2]));
    }
}
