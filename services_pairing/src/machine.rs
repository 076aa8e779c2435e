//! Task-side pairing state machine

use crate::feedback::PairingFeedback;
use crate::link::PairingLink;
use crate::shared::PairingShared;
use crate::{PairingConfig, PairingRole};
use hal::{Delay, PairingStore, RadioTransport, TimerDevice};
use link_protocol::{LinkMessage, MacAddress};
use services_logger::{LogEntry, LogLevel, Logger};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingEvent {
    /// Not pairing and nothing changed.
    Idle,
    /// Pairing mode was entered on this tick.
    Started,
    /// Still pairing.
    InProgress,
    /// Paired with the given peer; persisted.
    Succeeded(MacAddress),
    /// Gave up; no peer.
    TimedOut,
    /// The peer unpaired us; persisted state is now cleared.
    UnpairedByPeer(MacAddress),
}

#[derive(Debug, Clone, Copy)]
struct PairingSession {
    started_us: u64,
    last_broadcast_us: Option<u64>,
    last_log_us: u64,
}

/// Owns the peer lifecycle from task context.
pub struct PairingStateMachine {
    shared: Arc<PairingShared>,
    radio: Arc<dyn RadioTransport>,
    store: Box<dyn PairingStore>,
    clock: Arc<dyn TimerDevice>,
    delay: Arc<dyn Delay>,
    config: PairingConfig,
    role: PairingRole,
    logger: Logger,
    session: Option<PairingSession>,
}

impl PairingStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: PairingRole,
        config: PairingConfig,
        radio: Arc<dyn RadioTransport>,
        store: Box<dyn PairingStore>,
        clock: Arc<dyn TimerDevice>,
        delay: Arc<dyn Delay>,
        logger: Logger,
    ) -> Self {
        Self {
            shared: Arc::new(PairingShared::new()),
            radio,
            store,
            clock,
            delay,
            config,
            role,
            logger,
            session: None,
        }
    }

    /// Handle for the radio callback.
    pub fn link(&self) -> PairingLink {
        PairingLink::new(
            self.shared.clone(),
            self.radio.clone(),
            self.role,
            self.logger.clone(),
        )
    }

    pub fn shared(&self) -> &Arc<PairingShared> {
        &self.shared
    }

    pub fn peer(&self) -> Option<MacAddress> {
        self.shared.peer()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Restores the persisted peer and registers radio destinations.
    ///
    /// A store that cannot be read is treated as unpaired.
    pub fn startup(&mut self) -> Option<MacAddress> {
        if self.role == PairingRole::Initiator {
            self.register(MacAddress::BROADCAST);
        }

        let peer = match self.store.load() {
            Ok(peer) => peer,
            Err(err) => {
                self.logger.log(
                    LogEntry::new(LogLevel::Warn, "could not load pairing").with_field("error", err),
                );
                None
            }
        };

        match peer {
            Some(peer) => {
                self.shared.peer.set(peer);
                self.register(peer);
                self.logger
                    .log(LogEntry::new(LogLevel::Info, "paired").with_field("peer", peer));
            }
            None => self.logger.info("not paired"),
        }
        peer
    }

    /// One task tick.
    ///
    /// `pairing_requested` is a consumed trigger; it is ignored while a
    /// session is already running.
    pub fn tick(
        &mut self,
        pairing_requested: bool,
        feedback: &mut dyn PairingFeedback,
    ) -> PairingEvent {
        let now = self.clock.now_micros();
        let mut event = PairingEvent::Idle;

        if let Some(old) = self.shared.unpaired_by.take() {
            self.forget(old);
            event = PairingEvent::UnpairedByPeer(old);
        }

        if pairing_requested {
            if self.session.is_none() {
                self.begin(now);
                feedback.started(now);
                event = PairingEvent::Started;
            } else {
                self.logger.debug("pairing already in progress");
            }
        }

        if let Some(session) = self.session {
            let outcome = self.step(session, now, feedback);
            if event != PairingEvent::Started || outcome != PairingEvent::InProgress {
                event = outcome;
            }
        }

        if self.session.is_none() {
            feedback.idle(now, self.shared.is_paired());
        }
        event
    }

    /// Drops the current peer from task context, notifying it first.
    pub fn unpair(&mut self) {
        if let Some(old) = self.shared.peer() {
            self.notify_and_forget(old);
        }
    }

    fn begin(&mut self, now: u64) {
        self.shared.success.store(false, Ordering::SeqCst);
        self.shared.active.store(true, Ordering::SeqCst);
        self.session = Some(PairingSession {
            started_us: now,
            last_broadcast_us: None,
            last_log_us: now,
        });

        if let Some(old) = self.shared.peer() {
            self.notify_and_forget(old);
        }

        let mode = match self.role {
            PairingRole::Initiator => "broadcasting pair requests",
            PairingRole::Responder => "waiting for pair request",
        };
        self.logger.log(
            LogEntry::new(LogLevel::Info, "pairing mode").with_field("mode", mode),
        );
    }

    fn step(
        &mut self,
        mut session: PairingSession,
        now: u64,
        feedback: &mut dyn PairingFeedback,
    ) -> PairingEvent {
        let elapsed_ms = now.saturating_sub(session.started_us) / 1_000;

        if self.shared.success.swap(false, Ordering::SeqCst) {
            return match self.shared.peer() {
                Some(peer) => {
                    self.finish();
                    self.persist(peer);
                    feedback.succeeded(now, peer);
                    self.logger
                        .log(LogEntry::new(LogLevel::Info, "paired").with_field("peer", peer));
                    PairingEvent::Succeeded(peer)
                }
                // Success without a peer cannot be produced by the link;
                // keep waiting rather than persisting nothing.
                None => PairingEvent::InProgress,
            };
        }

        if elapsed_ms >= self.config.timeout_ms {
            self.finish();
            feedback.timed_out(now);
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "pairing timed out")
                    .with_field("elapsed_ms", elapsed_ms),
            );
            return PairingEvent::TimedOut;
        }

        if now.saturating_sub(session.last_log_us) / 1_000 >= self.config.progress_log_interval_ms
        {
            session.last_log_us = now;
            self.logger.log(
                LogEntry::new(LogLevel::Info, "pairing")
                    .with_field("elapsed_s", elapsed_ms / 1_000),
            );
        }

        if self.role == PairingRole::Initiator {
            let due = session
                .last_broadcast_us
                .map(|last| now.saturating_sub(last) / 1_000 >= self.config.broadcast_interval_ms)
                .unwrap_or(true);
            if due {
                session.last_broadcast_us = Some(now);
                self.broadcast_request();
            }
        }

        feedback.progress(now, elapsed_ms);
        self.session = Some(session);
        PairingEvent::InProgress
    }

    fn finish(&mut self) {
        self.session = None;
        self.shared.active.store(false, Ordering::SeqCst);
    }

    fn broadcast_request(&self) {
        let request = LinkMessage::PairRequest {
            address: self.radio.local_address(),
        };
        if let Err(err) = self.radio.send(MacAddress::BROADCAST, &request.encode()) {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "pair request send failed").with_field("error", err),
            );
        }
    }

    fn persist(&mut self, peer: MacAddress) {
        if let Err(err) = self.store.save(peer) {
            self.logger.log(
                LogEntry::new(LogLevel::Error, "could not save pairing").with_field("error", err),
            );
        }
        self.register(peer);
        if self.role == PairingRole::Initiator {
            self.register(MacAddress::BROADCAST);
        }
    }

    /// Best-effort unpair notice, grace delay, then local cleanup.
    fn notify_and_forget(&mut self, old: MacAddress) {
        self.register(old);
        if let Err(err) = self.radio.send(old, &LinkMessage::Unpair.encode()) {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "unpair notice send failed")
                    .with_field("peer", old)
                    .with_field("error", err),
            );
        }
        self.delay.delay_ms(self.config.unpair_grace_ms);
        self.logger
            .log(LogEntry::new(LogLevel::Info, "sent unpair notice").with_field("peer", old));
        self.shared.peer.clear_if(old);
        self.forget(old);
        self.logger.info("cleared previous pairing");
    }

    fn forget(&mut self, old: MacAddress) {
        self.radio.remove_peer(old);
        if let Err(err) = self.store.clear() {
            self.logger.log(
                LogEntry::new(LogLevel::Error, "could not clear pairing").with_field("error", err),
            );
        }
    }

    fn register(&self, address: MacAddress) {
        if let Err(err) = self.radio.add_peer(address) {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "could not register peer")
                    .with_field("peer", address)
                    .with_field("error", err),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{LedIndicator, LED_PAIRED, LED_PAIRING, LED_UNPAIRED};
    use hal::RadioReceiver;
    use services_logger::LogCapture;
    use sim_hal::{MemoryPairingStore, RecordingLed, SimAir, SimClock};

    fn board() -> MacAddress {
        MacAddress::new([0xB0, 0, 0, 0, 0, 1])
    }

    fn robo() -> MacAddress {
        MacAddress::new([0xC0, 0, 0, 0, 0, 2])
    }

    struct Node {
        machine: PairingStateMachine,
        store: MemoryPairingStore,
        capture: LogCapture,
    }

    struct Callback(PairingLink);

    impl RadioReceiver for Callback {
        fn on_receive(&self, src: MacAddress, payload: &[u8]) {
            if let Ok(message) = LinkMessage::decode(payload) {
                self.0.handle(src, &message);
            }
        }
    }

    fn node(
        air: &SimAir,
        clock: &SimClock,
        address: MacAddress,
        role: PairingRole,
        store: MemoryPairingStore,
    ) -> Node {
        let radio = Arc::new(air.radio(address));
        let capture = LogCapture::new();
        let mut machine = PairingStateMachine::new(
            role,
            PairingConfig::default(),
            radio.clone(),
            Box::new(store.clone()),
            Arc::new(clock.clone()),
            Arc::new(clock.clone()),
            Logger::new("pairing").with_capture(capture.clone()),
        );
        radio.set_receiver(Arc::new(Callback(machine.link())));
        machine.startup();
        Node {
            machine,
            store,
            capture,
        }
    }

    #[test]
    fn test_startup_restores_peer_and_registers_radio() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let n = node(
            &air,
            &clock,
            board(),
            PairingRole::Initiator,
            MemoryPairingStore::with_peer(robo()),
        );
        assert_eq!(n.machine.peer(), Some(robo()));
        let radio = air.radio(board());
        assert!(radio.has_peer(MacAddress::BROADCAST));
        assert!(radio.has_peer(robo()));
    }

    #[test]
    fn test_initiator_broadcasts_on_interval() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut n = node(&air, &clock, board(), PairingRole::Initiator, MemoryPairingStore::new());

        assert_eq!(n.machine.tick(true, &mut ()), PairingEvent::Started);
        for _ in 0..10 {
            clock.advance_ms(50);
            n.machine.tick(false, &mut ());
        }
        let requests = air
            .sent_by(board())
            .into_iter()
            .filter(|m| matches!(m, LinkMessage::PairRequest { address } if *address == board()))
            .count();
        assert_eq!(requests, 2);
    }

    #[test]
    fn test_full_handshake() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(&air, &clock, board(), PairingRole::Initiator, MemoryPairingStore::new());
        let mut r = node(&air, &clock, robo(), PairingRole::Responder, MemoryPairingStore::new());

        r.machine.tick(true, &mut ());
        b.machine.tick(true, &mut ());
        air.deliver_all(4);

        clock.advance_ms(50);
        assert_eq!(r.machine.tick(false, &mut ()), PairingEvent::Succeeded(board()));
        assert_eq!(b.machine.tick(false, &mut ()), PairingEvent::Succeeded(robo()));

        assert_eq!(r.store.peer(), Some(board()));
        assert_eq!(b.store.peer(), Some(robo()));
        assert!(!r.machine.is_active());
        assert!(!b.machine.is_active());
        let radio = air.radio(board());
        assert!(radio.has_peer(robo()));
        assert!(radio.has_peer(MacAddress::BROADCAST));
    }

    #[test]
    fn test_responder_ignores_requests_until_pairing() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(&air, &clock, board(), PairingRole::Initiator, MemoryPairingStore::new());
        let mut r = node(&air, &clock, robo(), PairingRole::Responder, MemoryPairingStore::new());

        b.machine.tick(true, &mut ());
        air.deliver_all(4);
        assert_eq!(r.machine.tick(false, &mut ()), PairingEvent::Idle);
        assert_eq!(r.machine.peer(), None);
        assert!(b.machine.is_active());
    }

    #[test]
    fn test_timeout_leaves_no_peer() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(
            &air,
            &clock,
            board(),
            PairingRole::Initiator,
            MemoryPairingStore::with_peer(robo()),
        );

        b.machine.tick(true, &mut ());
        assert_eq!(b.machine.peer(), None);
        assert_eq!(b.store.peer(), None);

        clock.advance_ms(29_000);
        assert_eq!(b.machine.tick(false, &mut ()), PairingEvent::InProgress);
        clock.advance_ms(1_000);
        assert_eq!(b.machine.tick(false, &mut ()), PairingEvent::TimedOut);
        assert!(!b.machine.is_active());
        assert_eq!(b.machine.peer(), None);
        assert_eq!(b.capture.warnings().len(), 1);
    }

    #[test]
    fn test_entering_pairing_notifies_old_peer() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(
            &air,
            &clock,
            board(),
            PairingRole::Initiator,
            MemoryPairingStore::with_peer(robo()),
        );
        let before = clock.now_ms();
        b.machine.tick(true, &mut ());

        assert_eq!(clock.now_ms() - before, 50);
        let sent = air.sent_by(board());
        assert_eq!(sent[0], LinkMessage::Unpair);
        assert!(matches!(sent[1], LinkMessage::PairRequest { .. }));
        assert!(!air.radio(board()).has_peer(robo()));
        assert!(b.capture.contains("cleared previous pairing"));
    }

    #[test]
    fn test_unpair_from_peer_clears_store_on_next_tick() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(
            &air,
            &clock,
            board(),
            PairingRole::Initiator,
            MemoryPairingStore::with_peer(robo()),
        );
        let mut r = node(
            &air,
            &clock,
            robo(),
            PairingRole::Responder,
            MemoryPairingStore::with_peer(board()),
        );

        b.machine.unpair();
        air.deliver_all(4);
        // Receive context only touched memory.
        assert_eq!(r.machine.peer(), None);
        assert_eq!(r.store.peer(), Some(board()));

        assert_eq!(
            r.machine.tick(false, &mut ()),
            PairingEvent::UnpairedByPeer(board())
        );
        assert_eq!(r.store.peer(), None);
        assert!(!air.radio(robo()).has_peer(board()));
        assert_eq!(b.store.peer(), None);
    }

    #[test]
    fn test_request_while_active_is_ignored() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(&air, &clock, board(), PairingRole::Initiator, MemoryPairingStore::new());
        b.machine.tick(true, &mut ());
        clock.advance_ms(10_000);
        assert_eq!(b.machine.tick(true, &mut ()), PairingEvent::InProgress);
        clock.advance_ms(20_000);
        assert_eq!(b.machine.tick(false, &mut ()), PairingEvent::TimedOut);
    }

    #[test]
    fn test_progress_logged_every_five_seconds() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(&air, &clock, board(), PairingRole::Initiator, MemoryPairingStore::new());
        b.capture.clear();
        b.machine.tick(true, &mut ());
        for _ in 0..120 {
            clock.advance_ms(100);
            b.machine.tick(false, &mut ());
        }
        let progress = b
            .capture
            .entries()
            .into_iter()
            .filter(|entry| entry.message == "pairing")
            .count();
        assert_eq!(progress, 2);
    }

    #[test]
    fn test_led_feedback_through_tick() {
        let air = SimAir::new();
        let clock = SimClock::new();
        let mut b = node(&air, &clock, board(), PairingRole::Initiator, MemoryPairingStore::new());
        let led = RecordingLed::new();
        let mut indicator = LedIndicator::new(led.clone(), &PairingConfig::default());

        b.machine.tick(false, &mut indicator);
        assert_eq!(led.current(), LED_UNPAIRED);
        b.machine.tick(true, &mut indicator);
        assert_eq!(led.current(), LED_PAIRING);

        b.machine.link().handle(robo(), &LinkMessage::PairAck { address: robo() });
        clock.advance_ms(50);
        b.machine.tick(false, &mut indicator);
        assert_eq!(led.current(), LED_PAIRED);
    }
}
