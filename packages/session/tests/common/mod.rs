//! Deterministic multi-participant harness.
//!
//! Every participant runs a [`SyncEngine`] on one shared [`MemoryNetwork`] and
//! one shared [`ManualClock`]. Transport and player events are queued per
//! participant and pumped until nothing moves; time only advances through
//! [`Party::advance`], which steps from deadline to deadline.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    ops::{Index, IndexMut},
    sync::{Arc, Mutex},
};

use curryparty_session::{
    adapter::{RawPlaybackEvent, SimulatedPlayer, VideoAdapter},
    config::SyncConfig,
    engine::{EngineDeps, SessionSnapshot, SyncEngine},
    notify::{Notification, RecordingNotifier},
    protocol::Command,
    session::MemoryPersistence,
    transport::{EventSink, MemoryNetwork, PeerId, PeerTransport, TransportEvent, TransportFactory},
};
use curryparty_shared::time::{Clock, ManualClock};

pub const ROOM: &str = "abcd1234";
pub const HOST_ID: &str = "curryparty-host-abcd1234";
pub const START: i64 = 1_700_000_000_000;

const PUMP_LIMIT: usize = 100_000;

enum Input {
    Transport(u64, TransportEvent),
    Playback(RawPlaybackEvent),
}

type Queue = Arc<Mutex<VecDeque<Input>>>;

pub struct Participant {
    pub engine: SyncEngine,
    pub player: SimulatedPlayer,
    pub notifier: RecordingNotifier,
    inputs: Queue,
}

impl Participant {
    fn pop(&self) -> Option<Input> {
        self.inputs.lock().unwrap().pop_front()
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Transport(generation, event) => self.engine.on_transport(generation, event),
            Input::Playback(event) => self.engine.on_playback_event(event),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.engine.snapshot()
    }

    pub fn status(&self) -> String {
        self.engine.snapshot().status
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifier
            .records()
            .into_iter()
            .filter_map(|record| match record {
                Notification::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self) -> f64 {
        self.player.current_time()
    }
}

/// A bare transport endpoint that records what it receives
pub struct Probe {
    transport: Box<dyn PeerTransport>,
    events: Arc<Mutex<Vec<TransportEvent>>>,
}

impl Probe {
    pub fn id(&self) -> PeerId {
        self.transport.local_id().clone()
    }

    pub fn connect_to_host(&mut self) {
        self.transport.connect(&PeerId::new(HOST_ID)).unwrap();
    }

    pub fn send_to_host(&mut self, payload: &str) {
        self.transport.send(&PeerId::new(HOST_ID), payload).unwrap();
    }

    /// Raw payloads received so far
    pub fn payloads(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Data(_, payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Decoded commands received so far, heartbeats excluded
    pub fn commands(&self) -> Vec<Command> {
        self.payloads()
            .iter()
            .filter_map(|payload| Command::decode(payload).ok())
            .filter(|command| !matches!(command, Command::Ping { .. } | Command::Pong { .. }))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

pub struct Party {
    pub clock: ManualClock,
    pub network: MemoryNetwork,
    config: SyncConfig,
    participants: Vec<Participant>,
}

impl Party {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            clock: ManualClock::new(START),
            network: MemoryNetwork::new(),
            config,
            participants: Vec::new(),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Add a participant on `page_url` and return its index
    pub fn add(&mut self, user_id: &str, page_url: Option<&str>) -> usize {
        let inputs: Queue = Arc::default();
        let clock = Arc::new(self.clock.clone());
        let player = SimulatedPlayer::new(clock.clone());
        let notifier = RecordingNotifier::new();

        let transport_inputs = inputs.clone();
        let sink = EventSink::new(0, move |generation, event| {
            transport_inputs
                .lock()
                .unwrap()
                .push_back(Input::Transport(generation, event));
        });
        let playback_inputs = inputs.clone();
        player.subscribe(Arc::new(move |event| {
            playback_inputs
                .lock()
                .unwrap()
                .push_back(Input::Playback(event));
        }));

        let engine = SyncEngine::new(
            self.config.clone(),
            EngineDeps {
                clock,
                factory: Arc::new(self.network.factory()),
                adapter: Arc::new(player.clone()),
                notifier: Arc::new(notifier.clone()),
                persistence: Box::new(MemoryPersistence::new()),
                page_url: page_url.map(str::to_string),
                user_id: Some(user_id.to_string()),
            },
            sink,
        );
        self.participants.push(Participant {
            engine,
            player,
            notifier,
            inputs,
        });
        self.participants.len() - 1
    }

    /// Open a raw identity on the network
    pub fn probe(&self, id: &str) -> Probe {
        let events: Arc<Mutex<Vec<TransportEvent>>> = Arc::default();
        let target = events.clone();
        let sink = EventSink::new(0, move |_, event| {
            target.lock().unwrap().push(event);
        });
        let transport = self.network.factory().open(PeerId::new(id), sink);
        Probe { transport, events }
    }

    /// Handle queued inputs until every queue is empty
    pub fn pump(&mut self) {
        for _ in 0..PUMP_LIMIT {
            let mut progressed = false;
            for participant in &mut self.participants {
                while let Some(input) = participant.pop() {
                    participant.handle(input);
                    progressed = true;
                }
            }
            if !progressed {
                return;
            }
        }
        panic!("participants never settled");
    }

    /// Move time forward by `millis`, firing every deadline on the way
    pub fn advance(&mut self, millis: i64) {
        let target = self.now() + millis;
        for _ in 0..PUMP_LIMIT {
            self.pump();
            let next = self
                .participants
                .iter()
                .filter_map(|participant| participant.engine.next_deadline())
                .min();
            match next {
                Some(at) if at <= target => {
                    self.clock.set(at.max(self.now()));
                    for participant in &mut self.participants {
                        participant.engine.on_tick();
                    }
                }
                _ => {
                    self.clock.set(target);
                    self.pump();
                    return;
                }
            }
        }
        panic!("deadlines never drained");
    }

    /// Host at index 0 on `host_url`, then every later participant joins
    pub fn host_and_join(&mut self, host_url: Option<&str>) {
        self.participants[0]
            .engine
            .create_room(ROOM, host_url)
            .unwrap();
        self.pump();
        for index in 1..self.participants.len() {
            self.participants[index].engine.join_room(ROOM).unwrap();
            self.pump();
        }
    }
}

impl Index<usize> for Party {
    type Output = Participant;

    fn index(&self, index: usize) -> &Participant {
        &self.participants[index]
    }
}

impl IndexMut<usize> for Party {
    fn index_mut(&mut self, index: usize) -> &mut Participant {
        &mut self.participants[index]
    }
}

/// A `videoEvent` payload as another extension would send it
pub fn video_event(user_id: &str, site: &str, event_type: &str, current_time: f64) -> String {
    serde_json::json!({
        "type": "videoEvent",
        "userId": user_id,
        "site": site,
        "event": {
            "eventType": event_type,
            "data": { "currentTime": current_time },
            "timestamp": START,
        },
    })
    .to_string()
}
