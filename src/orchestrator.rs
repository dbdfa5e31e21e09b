// Room orchestration: registry, lifecycle control, and the per-room turn loop

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, Subscriber, SubscriberId};
use crate::error::RoomError;
use crate::llm_client::{GenerationClient, GenerationRequest};
use crate::persona;
use crate::scheduler::{
    build_topic_card, choose_next_speaker, resolve_act, trim_history, ACTS, FINISHED_ACT,
};
use crate::settings::Settings;
use crate::types::{
    AgentSpec, ChatMessage, ConversationMode, GenerationLog, GenerationStatus, MessageRole,
    RoleType, RoleUpdate, RoomInfo,
};

const GENERATION_LOG_CAP: usize = 120;
const PAUSE_POLL_MS: u64 = 20;

pub const USER_SPEAKER: &str = "user";
pub const TOPIC_CARD_SPEAKER: &str = "topic_card";
pub const SUMMARY_SPEAKER: &str = "summary";

const CONCLUSION_MARKERS: &[&str] = &[
    "in conclusion",
    "to conclude",
    "my conclusion",
    "final recommendation",
    "we should adopt",
];

/// One independent conversation instance. Immutable identity lives on the
/// struct; everything the turn loop mutates sits behind `state`.
pub struct Room {
    pub room_id: String,
    pub persona_seed: u64,
    pub(crate) state: Mutex<RoomState>,
    // Serializes start/stop/pause/resume/config transitions from outside the
    // loop. Never held across a suspension point the loop depends on.
    pub(crate) lifecycle: Mutex<()>,
    pub(crate) stop_tx: watch::Sender<bool>,
}

pub struct RoomState {
    pub subject: String,
    pub conversation_mode: ConversationMode,
    pub global_instruction: String,
    pub turn_interval_seconds: f64,
    pub agents: Vec<AgentSpec>,
    pub messages: Vec<ChatMessage>,
    pub last_speaker_id: Option<String>,
    pub pending_priority_message: Option<ChatMessage>,
    pub running: bool,
    pub paused: bool,
    pub stop_requested: bool,
    pub stop_reason: Option<String>,
    pub end_reason: Option<String>,
    pub rounds_completed: u32,
    pub current_act: String,
    pub fail_streak: u32,
    pub topic_card_used: bool,
    pub generation_logs: VecDeque<GenerationLog>,
    pub rng: StdRng,
    pub task: Option<JoinHandle<()>>,
}

/// Why a turn loop left its main cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    MaxRounds,
    Failures,
    Conclusion,
    Repetition,
    Stopped,
}

impl LoopEnd {
    fn reason(self) -> &'static str {
        match self {
            LoopEnd::MaxRounds => "max_rounds",
            LoopEnd::Failures => "failures",
            LoopEnd::Conclusion => "conclusion",
            LoopEnd::Repetition => "repetition",
            LoopEnd::Stopped => "manual_stop",
        }
    }
}

/// Process-wide room table plus the lifecycle and pipeline operations.
/// Created once at startup and handed to the transport layer.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
    hub: Arc<BroadcastHub>,
    llm: Arc<dyn GenerationClient>,
    settings: Settings,
}

impl RoomManager {
    pub fn new(llm: Arc<dyn GenerationClient>, settings: Settings) -> Self {
        RoomManager {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            hub: Arc::new(BroadcastHub::new()),
            llm,
            settings,
        }
    }

    pub async fn create_room(
        &self,
        subject: &str,
        models: Vec<String>,
        conversation_mode: ConversationMode,
        global_instruction: &str,
        turn_interval_seconds: Option<f64>,
        seed: Option<u64>,
    ) -> Result<RoomInfo, RoomError> {
        if models.is_empty() {
            return Err(RoomError::InvalidArgument(
                "At least one model is required.".to_string(),
            ));
        }
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(RoomError::InvalidArgument(
                "Subject must not be empty.".to_string(),
            ));
        }

        let room_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let persona_seed = seed.unwrap_or_else(|| u64::from_str_radix(&room_id, 16).unwrap_or(0));
        let global_instruction = global_instruction.trim().to_string();
        let agents = persona::generate_personas(
            &models,
            subject,
            conversation_mode,
            &global_instruction,
            persona_seed,
        );

        let (stop_tx, _stop_rx) = watch::channel(false);
        let room = Arc::new(Room {
            room_id: room_id.clone(),
            persona_seed,
            state: Mutex::new(RoomState {
                subject: subject.to_string(),
                conversation_mode,
                global_instruction,
                turn_interval_seconds: turn_interval_seconds
                    .unwrap_or(self.settings.default_turn_interval_seconds)
                    .max(0.0),
                agents,
                messages: Vec::new(),
                last_speaker_id: None,
                pending_priority_message: None,
                running: false,
                paused: false,
                stop_requested: false,
                stop_reason: None,
                end_reason: None,
                rounds_completed: 0,
                current_act: ACTS[0].0.to_string(),
                fail_streak: 0,
                topic_card_used: false,
                generation_logs: VecDeque::new(),
                rng: StdRng::seed_from_u64(persona_seed),
                task: None,
            }),
            lifecycle: Mutex::new(()),
            stop_tx,
        });
        self.rooms
            .write()
            .await
            .insert(room_id.clone(), room.clone());
        eprintln!("[Room] Created room_id={room_id} seed={persona_seed}");
        Ok(self.room_info_for(&room).await)
    }

    pub async fn room_info(&self, room_id: &str) -> Result<RoomInfo, RoomError> {
        let room = self.get_room(room_id).await?;
        Ok(self.room_info_for(&room).await)
    }

    /// Idempotent: a second start on a running room is a no-op.
    pub async fn start_room(
        &self,
        room_id: &str,
        max_rounds: Option<u32>,
    ) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        {
            let _lifecycle = room.lifecycle.lock().await;
            let mut st = room.state.lock().await;
            if st.running {
                return Ok(());
            }
            st.running = true;
            st.paused = false;
            st.stop_requested = false;
            st.stop_reason = None;
            st.fail_streak = 0;
            st.rounds_completed = 0;
            st.current_act = ACTS[0].0.to_string();
            st.end_reason = None;
            st.topic_card_used = false;
            room.stop_tx.send_replace(false);

            let target_rounds = max_rounds.unwrap_or(self.settings.default_max_rounds);
            let manager = self.clone();
            let loop_room = room.clone();
            st.task = Some(tokio::spawn(async move {
                let end = manager.drive_room(&loop_room, target_rounds).await;
                manager.finish_room(&loop_room, end).await;
            }));
            eprintln!("[Room] Started room_id={room_id} max_rounds={target_rounds}");
        }
        self.broadcast_room_state(&room).await;
        Ok(())
    }

    /// Cooperatively cancels the loop and awaits its cleanup before returning.
    pub async fn stop_room(&self, room_id: &str, reason: Option<&str>) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        let task = {
            let _lifecycle = room.lifecycle.lock().await;
            let mut st = room.state.lock().await;
            st.running = false;
            st.stop_requested = true;
            st.stop_reason = Some(reason.unwrap_or("manual_stop").to_string());
            st.task.take()
        };
        room.stop_tx.send_replace(true);
        if let Some(task) = task {
            if task.await.is_err() {
                eprintln!("[Room] Turn loop task panicked for room_id={room_id}");
            }
        }
        self.broadcast_room_state(&room).await;
        Ok(())
    }

    pub async fn pause_room(&self, room_id: &str) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        {
            let _lifecycle = room.lifecycle.lock().await;
            room.state.lock().await.paused = true;
        }
        self.broadcast_room_state(&room).await;
        Ok(())
    }

    pub async fn resume_room(&self, room_id: &str) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        {
            let _lifecycle = room.lifecycle.lock().await;
            room.state.lock().await.paused = false;
        }
        self.broadcast_room_state(&room).await;
        Ok(())
    }

    /// Mode and instruction are frozen while the loop runs; the pacing
    /// interval may change at any time. Changing mode or instruction while
    /// stopped regenerates all personas from the room's original seed.
    pub async fn update_room_config(
        &self,
        room_id: &str,
        conversation_mode: Option<ConversationMode>,
        global_instruction: Option<&str>,
        turn_interval_seconds: Option<f64>,
    ) -> Result<RoomInfo, RoomError> {
        let room = self.get_room(room_id).await?;
        {
            let _lifecycle = room.lifecycle.lock().await;
            let mut guard = room.state.lock().await;
            let st = &mut *guard;
            let mut regenerate = false;

            if let Some(mode) = conversation_mode {
                if mode != st.conversation_mode {
                    if st.running {
                        return Err(RoomError::Conflict(
                            "Cannot update conversation mode while running.".to_string(),
                        ));
                    }
                    st.conversation_mode = mode;
                    regenerate = true;
                }
            }
            if let Some(instruction) = global_instruction {
                let normalized = instruction.trim();
                if normalized != st.global_instruction {
                    if st.running {
                        return Err(RoomError::Conflict(
                            "Cannot update global instruction while running.".to_string(),
                        ));
                    }
                    st.global_instruction = normalized.to_string();
                    regenerate = true;
                }
            }
            if let Some(interval) = turn_interval_seconds {
                st.turn_interval_seconds = interval.max(0.0);
            }

            if regenerate {
                let models: Vec<String> =
                    st.agents.iter().map(|agent| agent.model.clone()).collect();
                st.agents = persona::generate_personas(
                    &models,
                    &st.subject,
                    st.conversation_mode,
                    &st.global_instruction,
                    room.persona_seed,
                );
            }
        }
        Ok(self.room_info_for(&room).await)
    }

    /// Rename the subject and/or edit per-agent roles. The room is left
    /// untouched when any part of the update is invalid.
    pub async fn update_room_setup(
        &self,
        room_id: &str,
        subject: Option<&str>,
        role_updates: Option<Vec<RoleUpdate>>,
    ) -> Result<RoomInfo, RoomError> {
        let room = self.get_room(room_id).await?;
        {
            let _lifecycle = room.lifecycle.lock().await;
            let mut guard = room.state.lock().await;
            let st = &mut *guard;
            if st.running {
                return Err(RoomError::Conflict(
                    "Cannot update room setup while running.".to_string(),
                ));
            }

            let new_subject = match subject {
                Some(subject) => {
                    let trimmed = subject.trim();
                    if trimmed.is_empty() {
                        return Err(RoomError::InvalidArgument(
                            "Subject must not be empty.".to_string(),
                        ));
                    }
                    Some(trimmed.to_string())
                }
                None => None,
            };

            let mut agents = st.agents.clone();
            if let Some(updates) = role_updates {
                for update in updates {
                    let agent = agents
                        .iter_mut()
                        .find(|agent| agent.agent_id == update.agent_id)
                        .ok_or_else(|| {
                            RoomError::InvalidArgument(format!(
                                "Unknown agent id: {}",
                                update.agent_id
                            ))
                        })?;
                    if let Some(role_type) = update.role_type {
                        agent.role_type = role_type;
                    }
                    if let Some(profile) = update.character_profile {
                        agent.character_profile = profile;
                    }
                    if agent.role_type == RoleType::Facilitator {
                        agent.character_profile.clear();
                    }
                }
                let facilitators = agents
                    .iter()
                    .filter(|agent| agent.role_type == RoleType::Facilitator)
                    .count();
                if facilitators != 1 {
                    return Err(RoomError::InvalidArgument(format!(
                        "Exactly one facilitator is required, found {facilitators}."
                    )));
                }
            }

            if let Some(subject) = new_subject {
                st.subject = subject;
            }
            persona::rebuild_persona_prompts(
                &mut agents,
                &st.subject,
                st.conversation_mode,
                &st.global_instruction,
                room.persona_seed,
            );
            st.agents = agents;
        }
        Ok(self.room_info_for(&room).await)
    }

    /// Appends a user message and marks it as the pending priority message
    /// surfaced to the very next generation call. Safe at any time.
    pub async fn add_user_message(
        &self,
        room_id: &str,
        content: &str,
    ) -> Result<ChatMessage, RoomError> {
        let room = self.get_room(room_id).await?;
        let content = content.trim();
        if content.is_empty() {
            return Err(RoomError::InvalidArgument(
                "Message content must not be empty.".to_string(),
            ));
        }
        let message = ChatMessage::new(MessageRole::User, USER_SPEAKER, content);
        {
            let mut st = room.state.lock().await;
            st.messages.push(message.clone());
            st.pending_priority_message = Some(message.clone());
            self.enforce_retention(&mut st);
        }
        self.hub
            .broadcast(&room.room_id, &json!({"type": "message", "payload": message}))
            .await;
        Ok(message)
    }

    /// Registers a live observer and immediately sends it a full snapshot so
    /// it joins consistently regardless of timing.
    pub async fn register_subscriber(
        &self,
        room_id: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<SubscriberId, RoomError> {
        let room = self.get_room(room_id).await?;
        let id = self.hub.register(room_id, subscriber.clone()).await;
        let snapshot = self.build_snapshot(&room).await;
        if subscriber.send(&snapshot).await.is_err() {
            self.hub.unregister(room_id, id).await;
        }
        Ok(id)
    }

    /// Tolerant of unknown rooms and ids.
    pub async fn unregister_subscriber(&self, room_id: &str, id: SubscriberId) {
        self.hub.unregister(room_id, id).await;
    }

    pub(crate) async fn get_room(&self, room_id: &str) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))
    }

    // ---- turn loop ----

    async fn drive_room(&self, room: &Arc<Room>, max_rounds: u32) -> LoopEnd {
        let mut stop_rx = room.stop_tx.subscribe();
        let mut rounds: u32 = 0;

        while rounds < max_rounds {
            // Pause gate: suspend without consuming a round.
            loop {
                let paused = {
                    let st = room.state.lock().await;
                    if !st.running || st.stop_requested {
                        return LoopEnd::Stopped;
                    }
                    st.paused
                };
                if !paused {
                    break;
                }
                tokio::select! {
                    _ = sleep(Duration::from_millis(PAUSE_POLL_MS)) => {}
                    _ = stop_signal(&mut stop_rx) => return LoopEnd::Stopped,
                }
            }

            let (act_name, act_goal) = resolve_act(rounds, max_rounds);
            let card_event = {
                let mut guard = room.state.lock().await;
                let st = &mut *guard;
                st.current_act = act_name.to_string();
                if !st.topic_card_used && max_rounds >= 6 && rounds >= max_rounds / 2 {
                    let card = ChatMessage::new(
                        MessageRole::User,
                        TOPIC_CARD_SPEAKER,
                        build_topic_card(&st.subject, &mut st.rng),
                    );
                    st.topic_card_used = true;
                    st.messages.push(card.clone());
                    st.pending_priority_message = Some(card.clone());
                    self.enforce_retention(st);
                    Some(json!({"type": "message", "payload": card}))
                } else {
                    None
                }
            };
            if let Some(event) = card_event {
                self.hub.broadcast(&room.room_id, &event).await;
            }

            let (speaker, history, priority_message, subject, conversation_mode, global_instruction) = {
                let mut guard = room.state.lock().await;
                let st = &mut *guard;
                let speaker =
                    choose_next_speaker(&st.agents, st.last_speaker_id.as_deref(), &mut st.rng)
                        .clone();
                let history =
                    trim_history(&st.messages, self.settings.history_limit as i64).to_vec();
                let priority_message = st.pending_priority_message.take();
                (
                    speaker,
                    history,
                    priority_message,
                    st.subject.clone(),
                    st.conversation_mode,
                    st.global_instruction.clone(),
                )
            };

            self.emit_generation_log(
                room,
                rounds + 1,
                &speaker,
                act_name,
                GenerationStatus::Requesting,
                "",
            )
            .await;

            let request = GenerationRequest {
                model: speaker.model.clone(),
                display_name: speaker.display_name.clone(),
                role_type: speaker.role_type,
                subject,
                conversation_mode,
                global_instruction,
                act_name: act_name.to_string(),
                act_goal: act_goal.to_string(),
                persona_prompt: speaker.persona_prompt.clone(),
                history,
                priority_message,
            };
            let result = tokio::select! {
                result = self.llm.generate_reply(&request) => result,
                // Cancellation drops the in-flight call without committing
                // a partial message; cleanup still runs on the way out.
                _ = stop_signal(&mut stop_rx) => return LoopEnd::Stopped,
            };

            match result {
                Ok(content) => {
                    self.emit_generation_log(
                        room,
                        rounds + 1,
                        &speaker,
                        act_name,
                        GenerationStatus::Completed,
                        "",
                    )
                    .await;
                    let message = ChatMessage::new(
                        MessageRole::Agent,
                        speaker.display_name.clone(),
                        content.clone(),
                    );
                    {
                        let mut st = room.state.lock().await;
                        st.fail_streak = 0;
                        st.messages.push(message.clone());
                        st.last_speaker_id = Some(speaker.agent_id.clone());
                        rounds += 1;
                        st.rounds_completed = rounds;
                        self.enforce_retention(&mut st);
                    }
                    self.hub
                        .broadcast(&room.room_id, &json!({"type": "message", "payload": message}))
                        .await;

                    if rounds >= self.settings.min_rounds_before_conclusion
                        && has_conclusion_marker(&content)
                    {
                        return LoopEnd::Conclusion;
                    }
                    if rounds >= self.settings.min_rounds_before_repetition_stop
                        && is_repeating(&*room.state.lock().await)
                    {
                        return LoopEnd::Repetition;
                    }

                    if self.pace(room, &mut stop_rx).await {
                        return LoopEnd::Stopped;
                    }
                }
                Err(error) => {
                    let fail_streak = {
                        let mut st = room.state.lock().await;
                        st.fail_streak += 1;
                        st.fail_streak
                    };
                    let detail = format!("{error:#}");
                    eprintln!(
                        "[Room] Generation failed room_id={} round={} streak={}: {}",
                        room.room_id,
                        rounds + 1,
                        fail_streak,
                        detail
                    );
                    self.emit_generation_log(
                        room,
                        rounds + 1,
                        &speaker,
                        act_name,
                        GenerationStatus::Failed,
                        &detail,
                    )
                    .await;
                    self.hub
                        .broadcast(
                            &room.room_id,
                            &json!({
                                "type": "error",
                                "payload": {
                                    "detail": format!("LLM call failed: {detail}"),
                                    "fail_streak": fail_streak,
                                },
                            }),
                        )
                        .await;
                    if fail_streak >= self.settings.max_consecutive_failures {
                        self.hub
                            .broadcast(
                                &room.room_id,
                                &json!({
                                    "type": "error",
                                    "payload": {"detail": "Stopped after consecutive failures."},
                                }),
                            )
                            .await;
                        return LoopEnd::Failures;
                    }
                    // Retry the same round after pacing.
                    if self.pace(room, &mut stop_rx).await {
                        return LoopEnd::Stopped;
                    }
                }
            }
        }
        LoopEnd::MaxRounds
    }

    /// Runs exactly once per loop, on every exit path: closing summary
    /// (guarded against duplication), terminal state, final broadcast.
    async fn finish_room(&self, room: &Arc<Room>, loop_end: LoopEnd) {
        let summary_event = {
            let mut st = room.state.lock().await;
            let end_reason = if st.stop_requested {
                st.stop_reason
                    .clone()
                    .unwrap_or_else(|| "manual_stop".to_string())
            } else {
                loop_end.reason().to_string()
            };
            st.end_reason = Some(end_reason);

            let tail_is_summary = st
                .messages
                .last()
                .map(|message| message.speaker_id == SUMMARY_SPEAKER)
                .unwrap_or(false);
            let event = if tail_is_summary {
                None
            } else {
                let summary = ChatMessage::new(
                    MessageRole::Agent,
                    SUMMARY_SPEAKER,
                    build_final_summary(&st),
                );
                st.messages.push(summary.clone());
                Some(json!({"type": "message", "payload": summary}))
            };

            st.running = false;
            st.task = None;
            st.current_act = FINISHED_ACT.to_string();
            event
        };
        if let Some(event) = summary_event {
            self.hub.broadcast(&room.room_id, &event).await;
        }
        self.broadcast_room_state(room).await;
        let end_reason = room.state.lock().await.end_reason.clone();
        eprintln!(
            "[Room] Loop finished room_id={} end_reason={}",
            room.room_id,
            end_reason.as_deref().unwrap_or("unknown")
        );
    }

    /// Sleep out the turn interval; true means a stop arrived meanwhile.
    async fn pace(&self, room: &Arc<Room>, stop_rx: &mut watch::Receiver<bool>) -> bool {
        let interval = room.state.lock().await.turn_interval_seconds;
        tokio::select! {
            _ = sleep(Duration::from_secs_f64(interval.max(0.0))) => false,
            _ = stop_signal(stop_rx) => true,
        }
    }

    async fn emit_generation_log(
        &self,
        room: &Arc<Room>,
        round_index: u32,
        speaker: &AgentSpec,
        act: &str,
        status: GenerationStatus,
        detail: &str,
    ) {
        let log = GenerationLog {
            round_index,
            model: speaker.model.clone(),
            display_name: speaker.display_name.clone(),
            act: act.to_string(),
            status,
            detail: detail.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        {
            let mut st = room.state.lock().await;
            st.generation_logs.push_back(log.clone());
            while st.generation_logs.len() > GENERATION_LOG_CAP {
                st.generation_logs.pop_front();
            }
        }
        self.hub
            .broadcast(&room.room_id, &json!({"type": "generation_log", "payload": log}))
            .await;
    }

    fn enforce_retention(&self, st: &mut RoomState) {
        let limit = self.settings.message_retention_limit;
        if limit > 0 && st.messages.len() > limit {
            let overflow = st.messages.len() - limit;
            st.messages.drain(0..overflow);
        }
    }

    async fn room_info_for(&self, room: &Arc<Room>) -> RoomInfo {
        let st = room.state.lock().await;
        RoomInfo {
            room_id: room.room_id.clone(),
            subject: st.subject.clone(),
            conversation_mode: st.conversation_mode,
            global_instruction: st.global_instruction.clone(),
            turn_interval_seconds: st.turn_interval_seconds,
            agents: st.agents.clone(),
        }
    }

    async fn build_snapshot(&self, room: &Arc<Room>) -> Value {
        let st = room.state.lock().await;
        json!({
            "type": "room_snapshot",
            "payload": {
                "room_id": room.room_id,
                "subject": st.subject,
                "running": st.running,
                "paused": st.paused,
                "current_act": st.current_act,
                "rounds_completed": st.rounds_completed,
                "end_reason": st.end_reason,
                "conversation_mode": st.conversation_mode,
                "global_instruction": st.global_instruction,
                "turn_interval_seconds": st.turn_interval_seconds,
                "generation_logs": st.generation_logs,
                "agents": st.agents,
                "messages": st.messages,
            },
        })
    }

    async fn broadcast_room_state(&self, room: &Arc<Room>) {
        let payload = {
            let st = room.state.lock().await;
            json!({
                "room_id": room.room_id,
                "running": st.running,
                "paused": st.paused,
                "current_act": st.current_act,
                "rounds_completed": st.rounds_completed,
                "end_reason": st.end_reason,
            })
        };
        self.hub
            .broadcast(&room.room_id, &json!({"type": "room_state", "payload": payload}))
            .await;
    }
}

/// Resolves once a stop has been requested. A dropped sender counts as stop.
async fn stop_signal(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

fn has_conclusion_marker(content: &str) -> bool {
    let lowered = content.to_lowercase();
    CONCLUSION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Three consecutive, whitespace-normalized identical agent replies.
fn is_repeating(st: &RoomState) -> bool {
    let mut recent = st
        .messages
        .iter()
        .rev()
        .filter(|message| {
            message.role == MessageRole::Agent && message.speaker_id != SUMMARY_SPEAKER
        })
        .take(3);
    let reference = match recent.next() {
        Some(message) => normalize(&message.content),
        None => return false,
    };
    let mut count = 1;
    for message in recent {
        if normalize(&message.content) != reference {
            return false;
        }
        count += 1;
    }
    count == 3
}

fn normalize(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_final_summary(st: &RoomState) -> String {
    let reason_phrase = match st.end_reason.as_deref() {
        Some("max_rounds") => "The room reached its round limit.",
        Some("manual_stop") => "The room was stopped by the user.",
        Some("user_concluded") => {
            "The user judged the discussion had little room left to develop."
        }
        Some("failures") => "The room stopped after consecutive generation errors.",
        Some("conclusion") => "The participants reached an explicit conclusion.",
        Some("repetition") => "The discussion started repeating itself.",
        _ => "The conversation has ended.",
    };

    let last_meaningful = st
        .messages
        .iter()
        .rev()
        .find(|message| {
            message.role == MessageRole::Agent && message.speaker_id != SUMMARY_SPEAKER
        })
        .map(|message| message.content.trim().to_string())
        .unwrap_or_else(|| {
            "The subject looks promising and is worth a short validation experiment.".to_string()
        });
    let takeaway = truncate_chars(&last_meaningful, 120);

    let next_step = format!(
        "Pick one takeaway about \"{}\", build the smallest prototype that can be tried in five minutes, and watch the reaction.",
        st.subject
    );

    format!("[Final summary] {reason_phrase}\nToday's takeaway: {takeaway}\nNext step: {next_step}")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{cut}...")
}
