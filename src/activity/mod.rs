//! Discord rich presence driven by the client's log.
//!
//! [`Activity`] is fed one log line at a time. Recognized entries move a small
//! presence state machine; whenever the visible presence changes it is pushed
//! to the local Discord client over IPC. The reporter is off until
//! [`Activity::connect`] succeeds and turns itself off again on the first
//! transport error, after which lines are ignored without any I/O.

pub mod api;
pub mod entry;
mod ipc;

use anyhow::Result;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use api::{GameApi, GameDetail};
use entry::{Entry, RichPresence};
use ipc::IpcClient;

const CLIENT_ID: &str = "1005469189907173486";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerType {
    #[default]
    Public,
    Private,
    Reserved,
}

#[derive(Debug, Default)]
struct Presence {
    place_id: Option<u64>,
    job_id: String,
    server: ServerType,
    // Set by the join-util entries that precede a join.
    pending_server: Option<ServerType>,
    address: Option<String>,
    in_game: bool,
    teleporting: bool,
    time_start: i64,
    custom: Option<RichPresence>,
}

/// What a log entry requires of the remote presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Update {
    None,
    Refresh,
    Clear,
}

pub struct Activity {
    enabled: bool,
    client_id: String,
    sockets: Vec<PathBuf>,
    ipc: Option<IpcClient>,
    api: GameApi,
    presence: Presence,
    game: Option<(u64, Option<GameDetail>)>,
}

impl Default for Activity {
    fn default() -> Self {
        Self::with_sockets(ipc::candidate_sockets(), GameApi::default())
    }
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sockets(sockets: Vec<PathBuf>, api: GameApi) -> Self {
        Self {
            enabled: false,
            client_id: CLIENT_ID.to_string(),
            sockets,
            ipc: None,
            api,
            presence: Presence::default(),
            game: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn connect(&mut self) -> Result<()> {
        match IpcClient::connect_any(&self.sockets, &self.client_id).await {
            Ok(client) => {
                info!("Connected to Discord RPC");
                self.ipc = Some(client);
                self.enabled = true;
                Ok(())
            }
            Err(err) => {
                self.disable();
                Err(err)
            }
        }
    }

    pub async fn close(&mut self) {
        self.enabled = false;
        if let Some(client) = self.ipc.take() {
            client.close().await;
        }
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.ipc = None;
    }

    /// Feed one client log line.
    pub async fn handle_line(&mut self, line: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some(entry) = entry::parse(line)? else {
            return Ok(());
        };
        debug!(?entry, "activity entry");

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        match self.apply(entry, now) {
            Update::None => Ok(()),
            Update::Refresh => self.push().await,
            Update::Clear => self.send(None).await,
        }
    }

    pub(crate) fn apply(&mut self, entry: Entry, now: i64) -> Update {
        let p = &mut self.presence;
        match entry {
            Entry::JoiningPrivate => {
                p.pending_server = Some(ServerType::Private);
                Update::None
            }
            Entry::JoiningReserved => {
                p.pending_server = Some(ServerType::Reserved);
                Update::None
            }
            Entry::Joining {
                job_id,
                place_id,
                address,
            } => {
                p.place_id = Some(place_id);
                p.job_id = job_id;
                p.address = Some(address);
                p.server = p.pending_server.take().unwrap_or_default();
                p.in_game = false;
                Update::None
            }
            Entry::Udmux { address } => {
                p.address = Some(address);
                Update::None
            }
            Entry::Joined { address } => {
                if p.address.is_none() {
                    p.address = Some(address);
                }
                if !p.teleporting {
                    p.time_start = now;
                }
                p.teleporting = false;
                p.in_game = true;
                p.custom = None;
                Update::Refresh
            }
            Entry::Teleporting => {
                p.teleporting = true;
                Update::None
            }
            Entry::Disconnected => {
                if !p.in_game {
                    return Update::None;
                }
                p.in_game = false;
                if p.teleporting {
                    return Update::None;
                }
                *p = Presence::default();
                Update::Clear
            }
            Entry::Message(msg) => {
                if !p.in_game {
                    return Update::None;
                }
                if msg.command != "SetRichPresence" {
                    debug!(command = %msg.command, "ignoring BloxstrapRPC command");
                    return Update::None;
                }
                match msg.data {
                    None => p.custom = None,
                    Some(data) => {
                        let custom = p.custom.get_or_insert_with(RichPresence::default);
                        if data.details.is_some() {
                            custom.details = data.details;
                        }
                        if data.state.is_some() {
                            custom.state = data.state;
                        }
                        if data.time_start.is_some() {
                            custom.time_start = data.time_start;
                        }
                        if data.time_end.is_some() {
                            custom.time_end = data.time_end;
                        }
                    }
                }
                Update::Refresh
            }
        }
    }

    async fn push(&mut self) -> Result<()> {
        if let Some(place_id) = self.presence.place_id {
            if self.game.as_ref().map(|(id, _)| *id) != Some(place_id) {
                let detail = match self.api.place_game(place_id).await {
                    Ok(game) => Some(game),
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), place_id, "game lookup failed");
                        None
                    }
                };
                self.game = Some((place_id, detail));
            }
        }

        let game = self.game.as_ref().and_then(|(_, g)| g.as_ref());
        let activity = render(&self.presence, game);
        self.send(Some(activity)).await
    }

    async fn send(&mut self, activity: Option<Value>) -> Result<()> {
        let Some(client) = self.ipc.as_mut() else {
            return Ok(());
        };
        if let Err(err) = client.set_activity(activity).await {
            self.disable();
            return Err(err.context("Discord RPC connection lost"));
        }
        Ok(())
    }
}

fn render(p: &Presence, game: Option<&GameDetail>) -> Value {
    let custom = p.custom.clone().unwrap_or_default();

    let details = custom.details.unwrap_or_else(|| match game {
        Some(g) => format!("Playing {}", g.name),
        None => "Playing a game".to_string(),
    });
    let state = custom.state.or_else(|| match p.server {
        ServerType::Public => game.map(|g| format!("by {}", g.creator.name)),
        ServerType::Private => Some("In a private server".to_string()),
        ServerType::Reserved => Some("In a reserved server".to_string()),
    });

    let mut timestamps = Map::new();
    timestamps.insert(
        "start".into(),
        json!(custom.time_start.unwrap_or(p.time_start)),
    );
    if let Some(end) = custom.time_end {
        timestamps.insert("end".into(), json!(end));
    }

    let mut activity = Map::new();
    activity.insert("details".into(), json!(details));
    if let Some(state) = state {
        activity.insert("state".into(), json!(state));
    }
    activity.insert("timestamps".into(), Value::Object(timestamps));
    activity.insert(
        "assets".into(),
        json!({
            "large_image": "roblox",
            "large_text": game.map(|g| g.name.as_str()).unwrap_or("Roblox"),
        }),
    );

    if let Some(place_id) = p.place_id {
        let mut buttons = vec![json!({
            "label": "See game page",
            "url": format!("https://www.roblox.com/games/{place_id}"),
        })];
        if p.server == ServerType::Public && !p.job_id.is_empty() {
            buttons.push(json!({
                "label": "Join server",
                "url": format!(
                    "roblox://experiences/start?placeId={place_id}&gameInstanceId={}",
                    p.job_id
                ),
            }));
        }
        activity.insert("buttons".into(), Value::Array(buttons));
    }

    Value::Object(activity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, UnixListener};

    const JOINING: &str = "[FLog::Output] ! Joining game '0b9a4c1e-2c43-4f55-9b43-8e52e1ad3f10' place 1818 at 10.0.0.5";
    const JOINED: &str = "[FLog::Network] serverId: 10.0.0.5|53640";
    const DISCONNECTED: &str = "[FLog::Network] Time to disconnect replication data: {}";

    fn joining(place_id: u64) -> Entry {
        Entry::Joining {
            job_id: "0b9a4c1e-2c43-4f55-9b43-8e52e1ad3f10".into(),
            place_id,
            address: "10.0.0.5".into(),
        }
    }

    fn joined() -> Entry {
        Entry::Joined {
            address: "10.0.0.5".into(),
        }
    }

    // An API whose servers refuse connections.
    async fn dead_api() -> GameApi {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        GameApi::with_bases(&base, &base)
    }

    #[test]
    fn join_then_leave() {
        let mut a = Activity::with_sockets(vec![], GameApi::default());
        assert_eq!(a.apply(joining(1818), 100), Update::None);
        assert_eq!(a.apply(joined(), 105), Update::Refresh);
        assert!(a.presence.in_game);
        assert_eq!(a.presence.time_start, 105);
        assert_eq!(a.presence.server, ServerType::Public);

        assert_eq!(a.apply(Entry::Disconnected, 200), Update::Clear);
        assert!(a.presence.place_id.is_none());
        assert_eq!(a.apply(Entry::Disconnected, 201), Update::None);
    }

    #[test]
    fn teleport_keeps_the_start_time() {
        let mut a = Activity::with_sockets(vec![], GameApi::default());
        a.apply(joining(1), 0);
        a.apply(joined(), 10);
        assert_eq!(a.apply(Entry::Teleporting, 50), Update::None);
        assert_eq!(a.apply(Entry::Disconnected, 51), Update::None);
        a.apply(Entry::JoiningReserved, 52);
        a.apply(joining(2), 53);
        assert_eq!(a.apply(joined(), 60), Update::Refresh);
        assert_eq!(a.presence.time_start, 10);
        assert_eq!(a.presence.server, ServerType::Reserved);
        assert_eq!(a.presence.place_id, Some(2));
    }

    #[test]
    fn rpc_messages_merge_only_in_game() {
        let mut a = Activity::with_sockets(vec![], GameApi::default());
        let msg = |details: &str| {
            Entry::Message(entry::Message {
                command: "SetRichPresence".into(),
                data: Some(RichPresence {
                    details: Some(details.into()),
                    ..Default::default()
                }),
            })
        };
        assert_eq!(a.apply(msg("lobby"), 0), Update::None);

        a.apply(joining(1818), 0);
        a.apply(joined(), 1);
        assert_eq!(a.apply(msg("Round 3"), 2), Update::Refresh);

        let v = render(&a.presence, None);
        assert_eq!(v["details"], "Round 3");
        assert_eq!(v["timestamps"]["start"], 1);
        assert_eq!(
            v["buttons"][0]["url"],
            "https://www.roblox.com/games/1818"
        );
    }

    #[test]
    fn render_uses_game_details() {
        let mut a = Activity::with_sockets(vec![], GameApi::default());
        a.apply(Entry::JoiningPrivate, 0);
        a.apply(joining(1818), 0);
        a.apply(joined(), 1);
        let game = GameDetail {
            name: "Crossroads".into(),
            creator: api::Creator {
                name: "Roblox".into(),
            },
        };
        let v = render(&a.presence, Some(&game));
        assert_eq!(v["details"], "Playing Crossroads");
        assert_eq!(v["state"], "In a private server");
        // Private servers cannot be joined from a profile.
        assert_eq!(v["buttons"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_connect_disables_all_io() {
        let dir = tempfile::tempdir().unwrap();
        let api_server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", api_server.local_addr().unwrap());

        let mut a = Activity::with_sockets(
            vec![dir.path().join("discord-ipc-0")],
            GameApi::with_bases(&base, &base),
        );
        assert!(a.connect().await.is_err());
        assert!(!a.is_enabled());

        a.handle_line(JOINING).await.unwrap();
        a.handle_line(JOINED).await.unwrap();
        assert!(!a.presence.in_game, "lines are not even parsed");

        let accepted = tokio::time::timeout(Duration::from_millis(200), api_server.accept()).await;
        assert!(accepted.is_err(), "no request reached the API");
    }

    #[tokio::test]
    async fn pushes_presence_and_disables_on_transport_loss() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("discord-ipc-0");
        let listener = UnixListener::bind(&sock).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (op, hello) = ipc::read_frame(&mut stream).await.unwrap();
            assert_eq!(op, ipc::OP_HANDSHAKE);
            assert_eq!(hello["client_id"], CLIENT_ID);
            let ready = ipc::encode(ipc::OP_FRAME, &json!({"cmd": "DISPATCH", "evt": "READY"}))
                .unwrap();
            stream.write_all(&ready).await.unwrap();

            let (op, cmd) = ipc::read_frame(&mut stream).await.unwrap();
            assert_eq!(op, ipc::OP_FRAME);
            let reply = ipc::encode(
                ipc::OP_FRAME,
                &json!({"cmd": "SET_ACTIVITY", "evt": null, "nonce": cmd["nonce"]}),
            )
            .unwrap();
            stream.write_all(&reply).await.unwrap();
            cmd
        });

        let mut a = Activity::with_sockets(vec![sock], dead_api().await);
        a.connect().await.unwrap();
        assert!(a.is_enabled());

        a.handle_line(JOINING).await.unwrap();
        a.handle_line(JOINED).await.unwrap();

        let cmd = server.await.unwrap();
        assert_eq!(cmd["cmd"], "SET_ACTIVITY");
        assert_eq!(cmd["args"]["pid"], std::process::id());
        assert_eq!(cmd["args"]["activity"]["details"], "Playing a game");

        // The fake client hung up after one command.
        assert!(a.handle_line(DISCONNECTED).await.is_err());
        assert!(!a.is_enabled());
        a.handle_line(JOINED).await.unwrap();
    }
}
