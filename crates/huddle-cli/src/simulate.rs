//! In-process room simulation over the loopback collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use huddle_common::HuddleError;
use huddle_config::HuddleConfig;
use huddle_voice::loopback::{LoopbackAudio, LoopbackConnector, LoopbackHub, LoopbackNetwork};
use huddle_voice::{
    Collaborators, DevicePreferences, Identity, JoinOutcome, LeaveReason, MemoryPreferences,
    ParticipantId, RoomId, RoomJoinCoordinator, VoiceSettings,
};
use tracing::{info, warn};

use crate::prefs::ConfigPreferences;

/// How long to wait for every link to start streaming.
const MESH_TIMEOUT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub participants: usize,
    pub room: String,
    pub speaker: Option<usize>,
    /// Config file receiving the first participant's microphone choice.
    pub persist_to: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientReport {
    pub display_name: String,
    pub participant_id: ParticipantId,
    pub links: usize,
    pub streaming: usize,
    pub speaking: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub room: RoomId,
    pub clients: Vec<ClientReport>,
    pub members_after_leave: usize,
}

impl SimulationReport {
    pub fn is_full_mesh(&self) -> bool {
        let expected = self.clients.len().saturating_sub(1);
        self.clients
            .iter()
            .all(|c| c.links == expected && c.streaming == expected)
    }

    pub fn render(&self) -> String {
        let mut out = format!("room {} ({} participants)\n", self.room, self.clients.len());
        for client in &self.clients {
            let speaking = if client.speaking.is_empty() {
                "-".to_string()
            } else {
                client.speaking.join(", ")
            };
            out.push_str(&format!(
                "  {:<16} links {:>2}  streaming {:>2}  hears speaking: {}\n",
                client.display_name, client.links, client.streaming, speaking
            ));
        }
        out.push_str(&format!(
            "mesh {}, {} registrations left after leave\n",
            if self.is_full_mesh() { "complete" } else { "INCOMPLETE" },
            self.members_after_leave
        ));
        out
    }
}

struct SimClient {
    name: String,
    coordinator: RoomJoinCoordinator,
    audio: LoopbackAudio,
}

fn device_list(config: &HuddleConfig) -> Vec<String> {
    let mut devices = vec!["default".to_string()];
    if let Some(preferred) = &config.audio.input_device {
        if !devices.contains(preferred) {
            devices.push(preferred.clone());
        }
    }
    devices
}

pub async fn run(
    config: &HuddleConfig,
    settings: VoiceSettings,
    options: SimulateOptions,
) -> Result<SimulationReport, HuddleError> {
    if options.participants == 0 {
        return Err(HuddleError::Other("at least one participant is required".into()));
    }
    let room = RoomId::from(options.room.as_str());
    let hub = Arc::new(LoopbackHub::new());
    let network = LoopbackNetwork::new();
    let devices = device_list(config);
    let device_refs: Vec<&str> = devices.iter().map(String::as_str).collect();

    let mut clients = Vec::with_capacity(options.participants);
    for index in 0..options.participants {
        let name = format!("participant-{index}");
        let audio = LoopbackAudio::with_devices(&device_refs);
        let preferences: Arc<dyn DevicePreferences> = match (&options.persist_to, index) {
            (Some(path), 0) => Arc::new(ConfigPreferences::new(path.clone(), config.clone())),
            _ => Arc::new(MemoryPreferences::new(config.audio.input_device.clone())),
        };
        let coordinator = RoomJoinCoordinator::new(
            Identity::named(format!("sim-user-{index}"), name.clone()),
            settings.clone(),
            Collaborators {
                membership: hub.clone(),
                relay: hub.clone(),
                connector: Arc::new(LoopbackConnector::new(Arc::clone(&network))),
                audio: Arc::new(audio.clone()),
                preferences,
            },
        );

        match coordinator.join(&room).await {
            Ok(JoinOutcome::Joined(id)) => {
                info!(participant = %id, name = %name, "Simulated participant joined");
            }
            Ok(JoinOutcome::AlreadyActive) => warn!(name = %name, "Join already in progress"),
            Err(e) => {
                warn!(name = %name, error = %e, "Simulated participant could not join");
                leave_all(&clients).await;
                return Err(e.into());
            }
        }
        clients.push(SimClient {
            name,
            coordinator,
            audio,
        });
    }

    if !wait_for_mesh(&clients).await {
        warn!(timeout_ms = MESH_TIMEOUT.as_millis() as u64, "Mesh did not complete in time");
    }

    if let Some(speaker) = options.speaker {
        start_speaking(&clients, speaker).await?;
        // Several detector cycles so every client observes the transition.
        tokio::time::sleep(settings.detector.interval * 10).await;
    }

    let mut reports = Vec::with_capacity(clients.len());
    for client in &clients {
        reports.push(report(client, &clients).await);
    }

    leave_all(&clients).await;

    Ok(SimulationReport {
        members_after_leave: hub.members(&room).len(),
        room,
        clients: reports,
    })
}

async fn leave_all(clients: &[SimClient]) {
    for client in clients {
        client.coordinator.leave(LeaveReason::Shutdown).await;
    }
}

async fn wait_for_mesh(clients: &[SimClient]) -> bool {
    let expected = clients.len() - 1;
    let deadline = tokio::time::Instant::now() + MESH_TIMEOUT;
    loop {
        let mut complete = true;
        for client in clients {
            let links = client.coordinator.peers().links().await;
            if links.len() != expected || links.iter().any(|l| !l.streaming) {
                complete = false;
                break;
            }
        }
        if complete {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Feeds speech-level audio into the speaker's microphone and into every
/// stream the other clients receive from them.
async fn start_speaking(clients: &[SimClient], speaker: usize) -> Result<(), HuddleError> {
    let Some(talker) = clients.get(speaker) else {
        return Err(HuddleError::Other(format!(
            "speaker index {speaker} out of range (0..{})",
            clients.len()
        )));
    };
    let Some(session) = talker.coordinator.session().await else {
        return Err(HuddleError::Other("speaker is not in the room".into()));
    };
    if let (Some(device), Some(id)) = (session.input_device, session.local_id) {
        talker
            .audio
            .set_levels(&LoopbackAudio::capture_source(&device), 0.2, 0.6);
        for listener in clients.iter().filter(|c| c.name != talker.name) {
            listener.audio.set_levels(&format!("stream-{id}"), 0.2, 0.6);
        }
        info!(participant = %id, "Simulated speech started");
    }
    Ok(())
}

async fn report(client: &SimClient, clients: &[SimClient]) -> ClientReport {
    let views = client.coordinator.participants().await;
    let mut speaking = Vec::new();
    for view in views.iter().filter(|v| v.speaking) {
        if view.is_local {
            speaking.push(client.name.clone());
            continue;
        }
        for other in clients {
            if other.coordinator.local_participant().await.as_ref() == Some(&view.participant_id) {
                speaking.push(other.name.clone());
            }
        }
    }
    let remote: Vec<_> = views.iter().filter(|v| !v.is_local).collect();
    ClientReport {
        display_name: client.name.clone(),
        participant_id: client
            .coordinator
            .local_participant()
            .await
            .unwrap_or_else(|| ParticipantId::from("-")),
        links: remote.len(),
        streaming: remote.iter().filter(|v| v.streaming).count(),
        speaking,
    }
}
