//! Routes client events and timer firings into the game engine
//!
//! The dispatcher is the only writer of the matchmaking queue, the session
//! registry and the connection-to-session table. It is driven from a single
//! event loop, so every inbound event and every timer firing is applied in
//! the order it was delivered, one at a time.
//!
//! Timers are fire-and-forget tokio tasks that post a [`TimerEvent`] back
//! into that loop. A timer for a session that has since been removed finds
//! nothing in the registry and does nothing.

use crate::config::GameConfig;
use crate::leaderboard::Leaderboard;
use crate::matchmaking::{MatchQueue, WaitingEntry};
use crate::registry::SessionRegistry;
use crate::session::{Outbound, SessionId};
use crate::utils::get_timestamp;
use crate::ConnectionId;
use log::{debug, error, info};
use shared::Packet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Inbound events after the transport has resolved the sending connection
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Join { name: String },
    Transmit,
    GetLeaderboard,
    Disconnect,
}

impl ClientEvent {
    /// Maps a game packet to an event; transport-level packets map to `None`
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::Join { name } => Some(ClientEvent::Join { name }),
            Packet::Transmit => Some(ClientEvent::Transmit),
            Packet::GetLeaderboard => Some(ClientEvent::GetLeaderboard),
            Packet::Disconnect => Some(ClientEvent::Disconnect),
            _ => None,
        }
    }
}

/// Posted by timer tasks once their delay has elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Propagation {
        session_id: SessionId,
        sender: ConnectionId,
    },
    Countdown {
        session_id: SessionId,
    },
    SessionEnd {
        session_id: SessionId,
    },
}

pub struct Dispatcher {
    config: GameConfig,
    queue: MatchQueue,
    registry: SessionRegistry,
    leaderboard: Arc<Leaderboard>,
    /// Session each paired connection plays in
    assignments: HashMap<ConnectionId, SessionId>,
    outbox: mpsc::UnboundedSender<Outbound>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
}

impl Dispatcher {
    pub fn new(
        config: GameConfig,
        leaderboard: Arc<Leaderboard>,
        outbox: mpsc::UnboundedSender<Outbound>,
        timer_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            config,
            queue: MatchQueue::new(),
            registry: SessionRegistry::new(),
            leaderboard,
            assignments: HashMap::new(),
            outbox,
            timer_tx,
        }
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn leaderboard(&self) -> &Arc<Leaderboard> {
        &self.leaderboard
    }

    /// Session the connection is currently assigned to
    pub fn session_of(&self, conn: ConnectionId) -> Option<SessionId> {
        self.assignments.get(&conn).copied()
    }

    pub fn handle_event(&mut self, conn: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { name } => self.join(conn, name),
            ClientEvent::Transmit => self.transmit(conn),
            ClientEvent::GetLeaderboard => {
                let entries = self.leaderboard.snapshot();
                self.emit(Outbound::new(conn, Packet::Leaderboard { entries }));
            }
            ClientEvent::Disconnect => self.connection_closed(conn),
        }
    }

    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Propagation { session_id, sender } => {
                let notification = self
                    .registry
                    .get_mut(session_id)
                    .and_then(|session| session.propagation_elapsed(sender));
                match notification {
                    Some(notification) => self.emit(notification),
                    None => debug!("Stale propagation timer for session {}", session_id),
                }
            }
            TimerEvent::Countdown { session_id } => {
                let now = Instant::now();
                let Some(session) = self.registry.get(session_id) else {
                    debug!("Stale countdown for session {}", session_id);
                    return;
                };
                let expired = session.time_left(now) == 0;
                let updates = session.countdown(now);
                self.emit_all(updates);
                if expired {
                    self.registry.stop_countdown(session_id);
                }
            }
            TimerEvent::SessionEnd { session_id } => self.finish_session(session_id),
        }
    }

    /// Cleans up after a connection that went away, queued or playing
    ///
    /// An abandoned session is torn down without a leaderboard entry; the
    /// remaining player is told once and receives nothing further.
    pub fn connection_closed(&mut self, conn: ConnectionId) {
        if self.queue.remove(conn) {
            info!("Client {} left the matchmaking queue", conn);
        }

        let Some(session_id) = self.assignments.remove(&conn) else {
            return;
        };
        let opponent = self
            .registry
            .get(session_id)
            .and_then(|session| session.opponent_of(conn));

        if let Some(opponent) = opponent {
            info!(
                "Client {} abandoned session {}, notifying client {}",
                conn, session_id, opponent
            );
            self.assignments.remove(&opponent);
            self.emit(Outbound::new(opponent, Packet::OpponentDisconnected));
        }
        self.registry.remove(session_id);
    }

    /// Tears down every live session, used when the server stops
    pub fn shutdown(&mut self) {
        let ids: Vec<SessionId> = self.assignments.values().copied().collect();
        for id in ids {
            self.registry.remove(id);
        }
        self.assignments.clear();
    }

    fn join(&mut self, conn: ConnectionId, name: String) {
        if self.queue.contains(conn) || self.assignments.contains_key(&conn) {
            debug!("Ignoring join from client {}: already queued or playing", conn);
            return;
        }

        let players_in_queue = self.queue.enqueue(WaitingEntry::new(conn, name));
        self.emit(Outbound::new(
            conn,
            Packet::Waiting {
                players_in_queue: players_in_queue as u32,
            },
        ));

        while let Some((first, second)) = self.queue.try_pair_next() {
            self.start_session(first, second);
        }
    }

    fn start_session(&mut self, first: WaitingEntry, second: WaitingEntry) {
        let (first_id, first_name) = (first.id, first.name.clone());
        let (second_id, second_name) = (second.id, second.name.clone());

        let session_id =
            self.registry
                .create(first, second, Instant::now(), self.config.game_duration);
        self.assignments.insert(first_id, session_id);
        self.assignments.insert(second_id, session_id);

        let duration = self.config.duration_secs();
        self.emit(Outbound::new(
            first_id,
            Packet::GameStart {
                opponent: second_name,
                duration,
            },
        ));
        self.emit(Outbound::new(
            second_id,
            Packet::GameStart {
                opponent: first_name,
                duration,
            },
        ));

        self.spawn_session_timers(session_id);
    }

    fn transmit(&mut self, conn: ConnectionId) {
        let Some(session_id) = self.session_of(conn) else {
            return;
        };
        let Some(session) = self.registry.get_mut(session_id) else {
            return;
        };

        let now = Instant::now();
        if !session.is_accepting(now) {
            debug!("Late transmit from client {} ignored", conn);
            return;
        }
        let Some(report) = session.transmit(conn, now) else {
            return;
        };

        self.emit_all(report.notifications);
        if !report.collision {
            self.schedule_propagation(session_id, conn);
        }
    }

    fn finish_session(&mut self, session_id: SessionId) {
        let Some(session) = self.registry.get(session_id) else {
            debug!("Stale end timer for session {}", session_id);
            return;
        };

        // The last tick may be due at the same instant as the end timer;
        // players still get their zero before the result.
        let final_tick = session.countdown(Instant::now());
        if self.registry.stop_countdown(session_id) {
            self.emit_all(final_tick);
        }

        let Some(session) = self.registry.get_mut(session_id) else {
            return;
        };

        let game_over = session.finalize(&self.leaderboard, get_timestamp());
        let players: Vec<ConnectionId> = session.participants().iter().map(|p| p.id).collect();
        info!("Session {} finished with score {}", session_id, session.score());

        for player in players {
            if self.assignments.get(&player) == Some(&session_id) {
                self.assignments.remove(&player);
            }
        }
        self.emit_all(game_over);
        self.registry.remove(session_id);
    }

    fn schedule_propagation(&mut self, session_id: SessionId, sender: ConnectionId) {
        let delay = self.config.propagation_delay;
        let timer_tx = self.timer_tx.clone();
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            let _ = timer_tx.send(TimerEvent::Propagation { session_id, sender });
        });
        self.registry.attach_timer(session_id, timer);
    }

    fn spawn_session_timers(&mut self, session_id: SessionId) {
        let tick = self.config.tick_interval;
        let timer_tx = self.timer_tx.clone();
        let countdown = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if timer_tx.send(TimerEvent::Countdown { session_id }).is_err() {
                    break;
                }
            }
        });
        self.registry.attach_countdown(session_id, countdown);

        let duration = self.config.game_duration;
        let timer_tx = self.timer_tx.clone();
        let end = tokio::spawn(async move {
            sleep(duration).await;
            let _ = timer_tx.send(TimerEvent::SessionEnd { session_id });
        });
        self.registry.attach_timer(session_id, end);
    }

    fn emit(&self, outbound: Outbound) {
        let to = outbound.to;
        if let Err(e) = self.outbox.send(outbound) {
            error!("Failed to queue packet for client {}: {}", to, e);
        }
    }

    fn emit_all(&self, outbound: Vec<Outbound>) {
        for o in outbound {
            self.emit(o);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ALICE: ConnectionId = 1;
    const BOB: ConnectionId = 2;
    const CAROL: ConnectionId = 3;

    struct Harness {
        dispatcher: Dispatcher,
        outbox_rx: mpsc::UnboundedReceiver<Outbound>,
        timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    }

    impl Harness {
        fn new(config: GameConfig) -> Self {
            let (outbox, outbox_rx) = mpsc::unbounded_channel();
            let (timer_tx, timer_rx) = mpsc::unbounded_channel();
            let leaderboard = Arc::new(Leaderboard::new(config.leaderboard_size));
            Self {
                dispatcher: Dispatcher::new(config, leaderboard, outbox, timer_tx),
                outbox_rx,
                timer_rx,
            }
        }

        fn drain(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(o) = self.outbox_rx.try_recv() {
                out.push(o);
            }
            out
        }

        fn join(&mut self, conn: ConnectionId, name: &str) {
            self.dispatcher.handle_event(
                conn,
                ClientEvent::Join {
                    name: name.to_string(),
                },
            );
        }

        fn start_alice_and_bob(&mut self) -> SessionId {
            self.join(ALICE, "Alice");
            self.join(BOB, "Bob");
            self.drain();
            self.dispatcher.session_of(ALICE).unwrap()
        }

        /// Feeds timer events into the dispatcher until `stop` matches one
        async fn pump_until(&mut self, stop: impl Fn(&TimerEvent) -> bool) -> TimerEvent {
            loop {
                let event = self.timer_rx.recv().await.unwrap();
                self.dispatcher.handle_timer(event);
                if stop(&event) {
                    return event;
                }
            }
        }
    }

    fn packets_for(outbound: &[Outbound], to: ConnectionId) -> Vec<Packet> {
        outbound
            .iter()
            .filter(|o| o.to == to)
            .map(|o| o.packet.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_join_waits() {
        let mut h = Harness::new(GameConfig::default());
        h.join(ALICE, "Alice");

        let out = h.drain();
        assert_eq!(
            out,
            vec![Outbound::new(ALICE, Packet::Waiting { players_in_queue: 1 })]
        );
        assert_eq!(h.dispatcher.queue().len(), 1);
        assert!(h.dispatcher.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_joins_start_game() {
        let mut h = Harness::new(GameConfig::default());
        h.join(ALICE, "Alice");
        h.join(BOB, "Bob");

        let out = h.drain();
        assert_eq!(
            packets_for(&out, ALICE),
            vec![
                Packet::Waiting { players_in_queue: 1 },
                Packet::GameStart {
                    opponent: "Bob".to_string(),
                    duration: 60,
                },
            ]
        );
        assert_eq!(
            packets_for(&out, BOB),
            vec![
                Packet::Waiting { players_in_queue: 2 },
                Packet::GameStart {
                    opponent: "Alice".to_string(),
                    duration: 60,
                },
            ]
        );
        assert!(h.dispatcher.queue().is_empty());
        assert_eq!(h.dispatcher.registry().len(), 1);
        assert_eq!(
            h.dispatcher.session_of(ALICE),
            h.dispatcher.session_of(BOB)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_join_ignored() {
        let mut h = Harness::new(GameConfig::default());
        h.join(ALICE, "Alice");
        h.join(ALICE, "Alice");

        assert_eq!(h.drain().len(), 1);
        assert_eq!(h.dispatcher.queue().len(), 1);
        assert!(h.dispatcher.registry().is_empty());

        h.join(BOB, "Bob");
        h.drain();
        h.join(BOB, "Bob again");
        assert!(h.drain().is_empty());
        assert!(h.dispatcher.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_without_session_ignored() {
        let mut h = Harness::new(GameConfig::default());
        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        h.join(ALICE, "Alice");
        h.drain();
        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_leaderboard_goes_to_caller_only() {
        let mut h = Harness::new(GameConfig::default());
        h.dispatcher.handle_event(CAROL, ClientEvent::GetLeaderboard);

        assert_eq!(
            h.drain(),
            vec![Outbound::new(CAROL, Packet::Leaderboard { entries: vec![] })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_transmit_clears_channel_after_delay() {
        let mut h = Harness::new(GameConfig::default());
        h.start_alice_and_bob();
        let sent_at = Instant::now();

        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        let out = h.drain();
        assert_eq!(
            packets_for(&out, ALICE),
            vec![
                Packet::PacketResult {
                    success: true,
                    your_packets: 1,
                    total_sent: 1,
                    collision: None,
                },
                Packet::ScoreUpdate { score: 0 },
            ]
        );
        assert_eq!(packets_for(&out, BOB), vec![Packet::ScoreUpdate { score: 0 }]);

        h.pump_until(|e| matches!(e, TimerEvent::Propagation { .. }))
            .await;
        let waited = sent_at.elapsed();
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(3));

        let out = h.drain();
        assert!(packets_for(&out, BOB).contains(&Packet::ChannelBusy { busy: false }));
        assert!(!out
            .iter()
            .any(|o| matches!(o.packet, Packet::ChannelBusy { .. }) && o.to == ALICE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_during_propagation_collides() {
        let mut h = Harness::new(GameConfig::default());
        h.start_alice_and_bob();

        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        h.drain();
        h.dispatcher.handle_event(BOB, ClientEvent::Transmit);

        let out = h.drain();
        assert!(packets_for(&out, BOB).contains(&Packet::PacketResult {
            success: false,
            your_packets: 0,
            total_sent: 1,
            collision: Some(true),
        }));
        assert!(packets_for(&out, ALICE).contains(&Packet::Collision {
            your_packets: 1,
            total_sent: 1,
        }));

        // Once Alice's packet lands, Bob gets through.
        h.pump_until(|e| matches!(e, TimerEvent::Propagation { .. }))
            .await;
        h.drain();
        h.dispatcher.handle_event(BOB, ClientEvent::Transmit);
        let out = h.drain();
        assert!(packets_for(&out, BOB).contains(&Packet::PacketResult {
            success: true,
            your_packets: 1,
            total_sent: 2,
            collision: None,
        }));
        assert!(packets_for(&out, ALICE).contains(&Packet::ScoreUpdate { score: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_reports_live_time_left() {
        let mut h = Harness::new(GameConfig::default());
        h.start_alice_and_bob();

        h.pump_until(|e| matches!(e, TimerEvent::Countdown { .. }))
            .await;
        let out = h.drain();
        assert_eq!(
            packets_for(&out, ALICE),
            vec![Packet::TimeUpdate { time_left: 59 }]
        );
        assert_eq!(packets_for(&out, BOB), vec![Packet::TimeUpdate { time_left: 59 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_runs_to_completion() {
        let config = GameConfig {
            game_duration: Duration::from_secs(3),
            ..GameConfig::default()
        };
        let mut h = Harness::new(config);
        let session_id = h.start_alice_and_bob();

        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        h.pump_until(|e| matches!(e, TimerEvent::Propagation { .. }))
            .await;
        h.dispatcher.handle_event(BOB, ClientEvent::Transmit);
        h.pump_until(|e| matches!(e, TimerEvent::SessionEnd { .. }))
            .await;

        let out = h.drain();
        let time_updates: Vec<&Packet> = out
            .iter()
            .filter(|o| o.to == ALICE && matches!(o.packet, Packet::TimeUpdate { .. }))
            .map(|o| &o.packet)
            .collect();
        assert!(time_updates.contains(&&Packet::TimeUpdate { time_left: 2 }));
        assert!(time_updates.contains(&&Packet::TimeUpdate { time_left: 1 }));

        for player in [ALICE, BOB] {
            let game_over = packets_for(&out, player)
                .into_iter()
                .find(|p| matches!(p, Packet::GameOver { .. }))
                .unwrap();
            match game_over {
                Packet::GameOver {
                    final_score,
                    your_packets,
                    total_sent,
                    leaderboard,
                } => {
                    assert_eq!(final_score, 1);
                    assert_eq!(your_packets, 1);
                    assert_eq!(total_sent, 1);
                    assert_eq!(leaderboard.len(), 1);
                    assert_eq!(leaderboard[0].team, "Alice & Bob");
                }
                _ => unreachable!(),
            }
        }

        assert!(!h.dispatcher.registry().contains(session_id));
        assert!(h.dispatcher.session_of(ALICE).is_none());
        assert!(h.dispatcher.session_of(BOB).is_none());
        assert_eq!(h.dispatcher.leaderboard().len(), 1);

        // Late transmits after the game are silently dropped.
        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_time_update_precedes_game_over() {
        let config = GameConfig {
            game_duration: Duration::from_secs(3),
            ..GameConfig::default()
        };
        let mut h = Harness::new(config);
        h.start_alice_and_bob();

        h.pump_until(|e| matches!(e, TimerEvent::SessionEnd { .. }))
            .await;
        // Anything the countdown task posted afterwards must stay silent
        sleep(Duration::from_secs(2)).await;
        while let Ok(event) = h.timer_rx.try_recv() {
            h.dispatcher.handle_timer(event);
        }

        let out = h.drain();
        for player in [ALICE, BOB] {
            let packets = packets_for(&out, player);
            assert_eq!(
                packets[..3],
                [
                    Packet::TimeUpdate { time_left: 2 },
                    Packet::TimeUpdate { time_left: 1 },
                    Packet::TimeUpdate { time_left: 0 },
                ]
            );
            assert!(matches!(packets[3], Packet::GameOver { .. }));
            assert_eq!(packets.len(), 4);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_after_end_time_before_finalize_ignored() {
        let config = GameConfig {
            game_duration: Duration::from_secs(3),
            ..GameConfig::default()
        };
        let mut h = Harness::new(config);
        h.start_alice_and_bob();

        sleep(Duration::from_secs(3)).await;
        h.drain();
        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_queued() {
        let mut h = Harness::new(GameConfig::default());
        h.join(ALICE, "Alice");
        h.drain();

        h.dispatcher.handle_event(ALICE, ClientEvent::Disconnect);
        assert!(h.dispatcher.queue().is_empty());
        assert!(h.drain().is_empty());

        // Bob now waits alone instead of being paired with a ghost.
        h.join(BOB, "Bob");
        assert_eq!(
            h.drain(),
            vec![Outbound::new(BOB, Packet::Waiting { players_in_queue: 1 })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_session_notifies_once() {
        let mut h = Harness::new(GameConfig::default());
        let session_id = h.start_alice_and_bob();

        h.dispatcher.handle_event(ALICE, ClientEvent::Transmit);
        h.drain();
        h.dispatcher.connection_closed(ALICE);

        assert_eq!(
            h.drain(),
            vec![Outbound::new(BOB, Packet::OpponentDisconnected)]
        );
        assert!(!h.dispatcher.registry().contains(session_id));
        assert!(h.dispatcher.leaderboard().is_empty());

        // Timers were aborted; even a stale event delivered late is a no-op.
        sleep(Duration::from_secs(120)).await;
        while let Ok(event) = h.timer_rx.try_recv() {
            h.dispatcher.handle_timer(event);
        }
        h.dispatcher.handle_timer(TimerEvent::Propagation {
            session_id,
            sender: ALICE,
        });
        h.dispatcher.handle_timer(TimerEvent::Countdown { session_id });
        h.dispatcher.handle_timer(TimerEvent::SessionEnd { session_id });
        h.dispatcher.connection_closed(BOB);
        h.dispatcher.handle_event(BOB, ClientEvent::Transmit);

        assert!(h.drain().is_empty());
        assert!(h.dispatcher.leaderboard().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_players_can_rejoin_after_abandoned_game() {
        let mut h = Harness::new(GameConfig::default());
        h.start_alice_and_bob();
        h.dispatcher.connection_closed(ALICE);
        h.drain();

        h.join(BOB, "Bob");
        h.join(CAROL, "Carol");
        let out = h.drain();
        assert!(packets_for(&out, BOB).contains(&Packet::GameStart {
            opponent: "Carol".to_string(),
            duration: 60,
        }));
    }

    #[test]
    fn test_client_event_from_packet() {
        assert_eq!(
            ClientEvent::from_packet(Packet::Join {
                name: "Alice".to_string()
            }),
            Some(ClientEvent::Join {
                name: "Alice".to_string()
            })
        );
        assert_eq!(
            ClientEvent::from_packet(Packet::Transmit),
            Some(ClientEvent::Transmit)
        );
        assert_eq!(ClientEvent::from_packet(Packet::Heartbeat), None);
        assert_eq!(
            ClientEvent::from_packet(Packet::ScoreUpdate { score: 1 }),
            None
        );
    }
}
